//! Connector caches keyed by vault config (and database/schema for
//! PostgreSQL). A key is constructed at most once; later lookups return the
//! same `Arc`.

use crate::config::ConnectorSettings;
use crate::domain::ports::SecretsResolver;
use crate::postgres::PostgresConnector;
use crate::s3::{S3Connector, SharedS3Configuration};
use crate::utils::error::Result;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

pub struct PostgresRegistry {
    resolver: Arc<dyn SecretsResolver>,
    settings: Arc<ConnectorSettings>,
    connectors: Mutex<HashMap<String, Arc<PostgresConnector>>>,
}

impl PostgresRegistry {
    fn new(resolver: Arc<dyn SecretsResolver>, settings: Arc<ConnectorSettings>) -> Self {
        Self {
            resolver,
            settings,
            connectors: Mutex::new(HashMap::new()),
        }
    }

    pub fn cache_key(vault_config: &str, database: &str, schema: &str) -> String {
        format!("{}-{}-{}", vault_config, database, schema)
    }

    pub async fn setup_connector(
        &self,
        vault_config: &str,
        database: &str,
        schema: &str,
    ) -> Result<Arc<PostgresConnector>> {
        let key = Self::cache_key(vault_config, database, schema);
        let mut connectors = self.connectors.lock().await;
        if let Some(connector) = connectors.get(&key) {
            return Ok(connector.clone());
        }

        let connector = Arc::new(
            PostgresConnector::setup(
                self.resolver.as_ref(),
                vault_config,
                database,
                schema,
                &self.settings.postgres,
            )
            .await?,
        );
        tracing::debug!("🔌 Registered PostgreSQL connector '{}'", key);
        connectors.insert(key, connector.clone());
        Ok(connector)
    }

    pub async fn len(&self) -> usize {
        self.connectors.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.connectors.lock().await.is_empty()
    }

    pub async fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.connectors.lock().await.keys().cloned().collect();
        keys.sort();
        keys
    }
}

pub struct S3Registry {
    resolver: Arc<dyn SecretsResolver>,
    settings: Arc<ConnectorSettings>,
    configuration: Arc<SharedS3Configuration>,
    connectors: Mutex<HashMap<String, Arc<S3Connector>>>,
}

impl S3Registry {
    fn new(
        resolver: Arc<dyn SecretsResolver>,
        settings: Arc<ConnectorSettings>,
        configuration: Arc<SharedS3Configuration>,
    ) -> Self {
        Self {
            resolver,
            settings,
            configuration,
            connectors: Mutex::new(HashMap::new()),
        }
    }

    /// `database` and `schema` are accepted for symmetry with
    /// [`PostgresRegistry::setup_connector`] and ignored; the cache key is
    /// the vault config alone.
    pub async fn setup_connector(
        &self,
        vault_config: &str,
        _database: &str,
        _schema: &str,
    ) -> Result<Arc<S3Connector>> {
        let mut connectors = self.connectors.lock().await;
        if let Some(connector) = connectors.get(vault_config) {
            return Ok(connector.clone());
        }

        let connector = Arc::new(
            S3Connector::setup(
                self.resolver.as_ref(),
                vault_config,
                &self.settings.storage,
                &self.configuration,
            )
            .await?,
        );
        tracing::debug!("🔌 Registered S3 connector '{}'", vault_config);
        connectors.insert(vault_config.to_string(), connector.clone());
        Ok(connector)
    }

    pub async fn len(&self) -> usize {
        self.connectors.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.connectors.lock().await.is_empty()
    }

    pub async fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.connectors.lock().await.keys().cloned().collect();
        keys.sort();
        keys
    }
}

/// Entry point for callers: hands out cached connectors for both backends.
pub struct ConnectorRegistry {
    pub postgres: PostgresRegistry,
    pub s3: S3Registry,
}

impl ConnectorRegistry {
    /// Registry sharing the process-wide storage configuration.
    pub fn new(resolver: Arc<dyn SecretsResolver>, settings: ConnectorSettings) -> Self {
        Self::with_storage_slot(resolver, settings, SharedS3Configuration::global())
    }

    pub fn with_storage_slot(
        resolver: Arc<dyn SecretsResolver>,
        settings: ConnectorSettings,
        storage: Arc<SharedS3Configuration>,
    ) -> Self {
        let settings = Arc::new(settings);
        Self {
            postgres: PostgresRegistry::new(resolver.clone(), settings.clone()),
            s3: S3Registry::new(resolver, settings, storage),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::secrets::{CredentialBundle, StaticResolver};
    use crate::utils::error::ConnectorError;

    fn registry() -> ConnectorRegistry {
        let resolver = StaticResolver::new()
            .with_bundle(
                CredentialBundle::new("warehouse")
                    .with_field("db_host", "127.0.0.1")
                    .with_field("db_port", "5432")
                    .with_field("db_username", "etl")
                    .with_field("db_password", "pa55"),
            )
            .with_bundle(
                CredentialBundle::new("cos")
                    .with_field("hmac_access_key_id", "AKID")
                    .with_field("hmac_secret_access_key", "secret")
                    .with_field("bucket", "landing"),
            );
        ConnectorRegistry::with_storage_slot(
            Arc::new(resolver),
            ConnectorSettings::default(),
            Arc::new(SharedS3Configuration::new()),
        )
    }

    #[test]
    fn test_postgres_cache_key() {
        assert_eq!(
            PostgresRegistry::cache_key("warehouse", "analytics", "public"),
            "warehouse-analytics-public"
        );
    }

    #[tokio::test]
    async fn test_postgres_lookup_is_cached() {
        let registry = registry();
        let first = registry
            .postgres
            .setup_connector("warehouse", "analytics", "public")
            .await
            .unwrap();
        let second = registry
            .postgres
            .setup_connector("warehouse", "analytics", "public")
            .await
            .unwrap();
        let other = registry
            .postgres
            .setup_connector("warehouse", "analytics", "staging")
            .await
            .unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert!(!Arc::ptr_eq(&first, &other));
        assert_eq!(
            registry.postgres.keys().await,
            vec!["warehouse-analytics-public", "warehouse-analytics-staging"]
        );
    }

    #[tokio::test]
    async fn test_s3_key_ignores_database_and_schema() {
        let registry = registry();
        let first = registry.s3.setup_connector("cos", "a", "b").await.unwrap();
        let second = registry.s3.setup_connector("cos", "c", "d").await.unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(first.bucket(), "landing");
        assert_eq!(registry.s3.len().await, 1);
    }

    #[tokio::test]
    async fn test_failed_setup_is_not_cached() {
        let registry = registry();
        let err = registry
            .postgres
            .setup_connector("missing", "analytics", "public")
            .await
            .unwrap_err();

        assert!(matches!(err, ConnectorError::Configuration { .. }));
        assert!(registry.postgres.is_empty().await);
    }
}
