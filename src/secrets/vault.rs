//! HashiCorp Vault resolver.
//!
//! Reads `{mount}/data/{name}` on a KV v2 mount and `{mount}/{name}` on a KV
//! v1 mount, accepting both `data.data` and `data` payload shapes. Scalar
//! fields become bundle entries; nested objects and arrays are skipped.

use super::{CredentialBundle, SecretString, SecretsError};
use crate::config::VaultSettings;
use crate::domain::ports::SecretsResolver;
use crate::utils::error::{ConnectorError, Result};
use crate::utils::validation::{validate_range, validate_required_field, validate_url};
use async_trait::async_trait;
use std::time::Duration;
use url::Url;

#[derive(Debug, Clone)]
pub struct VaultResolver {
    http: reqwest::Client,
    base_url: Url,
    token: SecretString,
    namespace: Option<String>,
    mount: String,
    kv_version: u8,
}

impl VaultResolver {
    fn user_agent() -> String {
        format!("platform-connector/{}", env!("CARGO_PKG_VERSION"))
    }

    pub fn new(base_url: &str, token: SecretString, mount: &str) -> Result<Self> {
        Self::build(base_url, token, mount, None, Duration::from_secs(30))
    }

    pub fn from_settings(settings: &VaultSettings) -> Result<Self> {
        let token = validate_required_field("vault.token", &settings.token)?;
        validate_range("vault.kv_version", settings.kv_version, 1, 2)?;
        let resolver = Self::build(
            &settings.address,
            token.clone(),
            &settings.mount,
            settings.namespace.clone(),
            Duration::from_secs(settings.timeout_seconds),
        )?;
        Ok(resolver.with_kv_version(settings.kv_version))
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    /// Reads a KV v1 mount when `version` is 1; anything else means v2.
    pub fn with_kv_version(mut self, version: u8) -> Self {
        self.kv_version = version;
        self
    }

    fn build(
        base_url: &str,
        token: SecretString,
        mount: &str,
        namespace: Option<String>,
        timeout: Duration,
    ) -> Result<Self> {
        validate_url("vault.address", base_url)?;
        let base_url = Url::parse(base_url).map_err(|e| ConnectorError::InvalidConfigValue {
            field: "vault.address".to_string(),
            value: base_url.to_string(),
            reason: e.to_string(),
        })?;

        let http = reqwest::Client::builder()
            .user_agent(Self::user_agent())
            .timeout(timeout)
            .build()
            .map_err(|e| {
                ConnectorError::configuration(
                    "Unable to build the Vault HTTP client",
                    SecretsError::Network(e),
                )
            })?;

        Ok(Self {
            http,
            base_url,
            token,
            namespace,
            mount: mount.trim_matches('/').to_string(),
            kv_version: 2,
        })
    }

    fn secret_url(&self, config_name: &str) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().push("v1");
            segments.extend(self.mount.split('/').filter(|s| !s.is_empty()));
            if self.kv_version != 1 {
                segments.push("data");
            }
            segments.extend(config_name.trim_matches('/').split('/'));
        }
        url
    }
}

fn scalar_to_string(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::String(s) => Some(s.clone()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        serde_json::Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Builds a bundle from a KV v2 or KV v1 response body.
fn bundle_from_body(config_name: &str, body: &serde_json::Value) -> Option<CredentialBundle> {
    let data = body.get("data")?;
    let fields = match data.get("data") {
        Some(serde_json::Value::Object(v2)) => v2,
        _ => data.as_object()?,
    };

    let mut bundle = CredentialBundle::new(config_name);
    for (key, value) in fields {
        if let Some(text) = scalar_to_string(value) {
            bundle.insert(key.clone(), text);
        }
    }
    Some(bundle)
}

#[async_trait]
impl SecretsResolver for VaultResolver {
    async fn get(&self, config_name: &str) -> std::result::Result<CredentialBundle, SecretsError> {
        if config_name.trim_matches('/').is_empty() {
            return Err(SecretsError::NotFound(config_name.to_string()));
        }

        let mut request = self
            .http
            .get(self.secret_url(config_name))
            .header("X-Vault-Token", self.token.expose_secret())
            .header("Accept", "application/json");
        if let Some(namespace) = &self.namespace {
            request = request.header("X-Vault-Namespace", namespace);
        }

        let resp = request.send().await.map_err(SecretsError::Network)?;
        tracing::debug!("Vault responded {} for '{}'", resp.status(), config_name);

        match resp.status().as_u16() {
            200 => {
                let body = resp
                    .json::<serde_json::Value>()
                    .await
                    .map_err(SecretsError::Network)?;
                bundle_from_body(config_name, &body).ok_or_else(|| {
                    SecretsError::MalformedBundle {
                        name: config_name.to_string(),
                        reason: "response has no data object".to_string(),
                    }
                })
            }
            401 | 403 => Err(SecretsError::Unauthorized),
            404 => Err(SecretsError::NotFound(config_name.to_string())),
            status => Err(SecretsError::UnexpectedStatus(status)),
        }
    }
}
