use crate::config::StorageSettings;
use crate::domain::ports::SecretsResolver;
use crate::secrets::StorageCredentials;
use crate::utils::error::{ConnectorError, Result};
use aws_sdk_s3::config::{BehaviorVersion, Credentials, Region};
use aws_sdk_s3::Client as S3Client;
use std::sync::{Arc, OnceLock};
use tokio::sync::OnceCell;

/// Credentials and endpoint for the Cloud Object Storage (COS) service,
/// reached through its S3-compatible API.
#[derive(Debug, Clone)]
pub struct S3Configuration {
    vault_config: String,
    endpoint: String,
    region: String,
    credentials: StorageCredentials,
}

impl S3Configuration {
    /// 從 Vault 載入 COS 憑證
    pub async fn load(
        resolver: &dyn SecretsResolver,
        vault_config: &str,
        settings: &StorageSettings,
    ) -> Result<Self> {
        let bundle = resolver.get(vault_config).await.map_err(|e| {
            ConnectorError::configuration("Unable to get COS credentials from Vault", e)
        })?;
        let credentials = StorageCredentials::from_bundle(&bundle).map_err(|e| {
            ConnectorError::configuration("Unable to get COS credentials from Vault", e)
        })?;

        Ok(Self {
            vault_config: vault_config.to_string(),
            endpoint: settings.endpoint.clone(),
            region: settings.region.clone(),
            credentials,
        })
    }

    pub fn vault_config(&self) -> &str {
        &self.vault_config
    }

    pub fn bucket(&self) -> &str {
        &self.credentials.bucket
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    /// Builds an HMAC-signed client bound to the configured endpoint.
    pub fn get_client(&self) -> S3Client {
        let credentials = Credentials::new(
            self.credentials.hmac_access_key_id.clone(),
            self.credentials.hmac_secret_access_key.expose_secret(),
            None,
            None,
            "platform-connector-vault",
        );

        let config = aws_sdk_s3::Config::builder()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new(self.region.clone()))
            .endpoint_url(&self.endpoint)
            .credentials_provider(credentials)
            .force_path_style(true)
            .build();

        S3Client::from_conf(config)
    }
}

/// Slot holding at most one [`S3Configuration`]. The first successful load
/// wins; later loads return it whatever vault config they name, and
/// concurrent first loads run the resolver only once.
#[derive(Debug, Default)]
pub struct SharedS3Configuration {
    cell: OnceCell<Arc<S3Configuration>>,
}

impl SharedS3Configuration {
    pub const fn new() -> Self {
        Self {
            cell: OnceCell::const_new(),
        }
    }

    /// The process-wide slot.
    pub fn global() -> Arc<SharedS3Configuration> {
        static GLOBAL: OnceLock<Arc<SharedS3Configuration>> = OnceLock::new();
        GLOBAL
            .get_or_init(|| Arc::new(SharedS3Configuration::new()))
            .clone()
    }

    pub async fn get_or_load(
        &self,
        resolver: &dyn SecretsResolver,
        vault_config: &str,
        settings: &StorageSettings,
    ) -> Result<Arc<S3Configuration>> {
        let configuration = self
            .cell
            .get_or_try_init(|| async {
                tracing::debug!("Loading COS configuration from '{}'", vault_config);
                S3Configuration::load(resolver, vault_config, settings)
                    .await
                    .map(Arc::new)
            })
            .await?;

        if configuration.vault_config() != vault_config {
            tracing::debug!(
                "COS configuration already loaded from '{}', ignoring '{}'",
                configuration.vault_config(),
                vault_config
            );
        }
        Ok(configuration.clone())
    }

    pub fn get(&self) -> Option<Arc<S3Configuration>> {
        self.cell.get().cloned()
    }
}
