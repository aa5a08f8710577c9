pub mod toml_config;

use crate::secrets::SecretString;
use crate::utils::error::Result;
use crate::utils::validation::Validate;
use serde::Deserialize;
use std::env;

/// Default object-storage endpoint (IBM COS, direct EU region).
pub const DEFAULT_STORAGE_ENDPOINT: &str = "https://s3.direct.eu-fr0.cloud-object-storage";
pub const DEFAULT_STORAGE_REGION: &str = "eu-fr0";
pub const DEFAULT_VAULT_ADDRESS: &str = "http://127.0.0.1:8200";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConnectorSettings {
    #[serde(default)]
    pub vault: VaultSettings,
    #[serde(default)]
    pub postgres: PostgresSettings,
    #[serde(default)]
    pub storage: StorageSettings,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct VaultSettings {
    pub address: String,
    pub token: Option<SecretString>,
    pub namespace: Option<String>,
    pub mount: String,
    /// KV secrets engine version of `mount` (1 or 2).
    pub kv_version: u8,
    pub timeout_seconds: u64,
}

impl Default for VaultSettings {
    fn default() -> Self {
        Self {
            address: DEFAULT_VAULT_ADDRESS.to_string(),
            token: None,
            namespace: None,
            mount: "secret".to_string(),
            kv_version: 2,
            timeout_seconds: 30,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PostgresSettings {
    pub pool_max_size: usize,
    /// Log every statement sent through a connector.
    pub echo: bool,
    pub connect_timeout_seconds: u64,
}

impl Default for PostgresSettings {
    fn default() -> Self {
        Self {
            pool_max_size: 5,
            echo: false,
            connect_timeout_seconds: 10,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageSettings {
    pub endpoint: String,
    pub region: String,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_STORAGE_ENDPOINT.to_string(),
            region: DEFAULT_STORAGE_REGION.to_string(),
        }
    }
}

impl ConnectorSettings {
    /// 從環境變數載入並驗證設定，未設定的欄位使用預設值
    pub fn from_env() -> Result<Self> {
        let mut settings = Self::default();

        if let Ok(address) = env::var("VAULT_ADDR") {
            settings.vault.address = address;
        }
        if let Ok(token) = env::var("VAULT_TOKEN") {
            settings.vault.token = Some(SecretString::new(token));
        }
        if let Ok(namespace) = env::var("VAULT_NAMESPACE") {
            settings.vault.namespace = Some(namespace);
        }
        if let Ok(mount) = env::var("PLATFORM_CONNECTOR_VAULT_MOUNT") {
            settings.vault.mount = mount;
        }
        if let Some(size) = parse_env("PLATFORM_CONNECTOR_PG_POOL_MAX_SIZE") {
            settings.postgres.pool_max_size = size;
        }
        if let Some(echo) = parse_env("PLATFORM_CONNECTOR_PG_ECHO") {
            settings.postgres.echo = echo;
        }
        if let Ok(endpoint) = env::var("PLATFORM_CONNECTOR_STORAGE_ENDPOINT") {
            settings.storage.endpoint = endpoint;
        }
        if let Ok(region) = env::var("PLATFORM_CONNECTOR_STORAGE_REGION") {
            settings.storage.region = region;
        }

        settings.validate()?;
        Ok(settings)
    }
}

fn parse_env<T: std::str::FromStr>(key: &str) -> Option<T> {
    let raw = env::var(key).ok()?;
    match raw.parse() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!("Ignoring {}: cannot parse '{}'", key, raw);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = ConnectorSettings::default();
        assert_eq!(settings.storage.endpoint, DEFAULT_STORAGE_ENDPOINT);
        assert_eq!(settings.storage.region, "eu-fr0");
        assert_eq!(settings.vault.mount, "secret");
        assert_eq!(settings.postgres.pool_max_size, 5);
        assert!(!settings.postgres.echo);
    }

    #[test]
    fn test_from_env_overrides() {
        std::env::set_var("PLATFORM_CONNECTOR_PG_POOL_MAX_SIZE", "12");
        std::env::set_var("PLATFORM_CONNECTOR_STORAGE_REGION", "us-south");

        let settings = ConnectorSettings::from_env().unwrap();
        assert_eq!(settings.postgres.pool_max_size, 12);
        assert_eq!(settings.storage.region, "us-south");

        std::env::set_var("PLATFORM_CONNECTOR_PG_POOL_MAX_SIZE", "0");
        assert!(ConnectorSettings::from_env().is_err());

        std::env::remove_var("PLATFORM_CONNECTOR_PG_POOL_MAX_SIZE");
        std::env::remove_var("PLATFORM_CONNECTOR_STORAGE_REGION");
    }
}
