use crate::config::PostgresSettings;
use crate::domain::ports::SecretsResolver;
use crate::secrets::{DatabaseCredentials, SecretString};
use crate::utils::error::{ConnectorError, Result};
use deadpool_postgres::{Manager, ManagerConfig, Pool, RecyclingMethod};
use std::time::Duration;
use tokio_postgres::NoTls;

const DRIVERNAME: &str = "postgresql";

/// Statement run on every pooled connection before it is handed out. It
/// doubles as the liveness check and clears any transaction a dropped
/// chunk reader left open.
const PRE_PING_SQL: &str = "ROLLBACK";

/// Resolved database credentials plus the target database and schema.
#[derive(Debug, Clone)]
pub struct PostgresConfiguration {
    vault_config: String,
    credentials: DatabaseCredentials,
    database: String,
    schema: String,
    with_echo: bool,
    pool_max_size: usize,
    connect_timeout: Duration,
}

impl PostgresConfiguration {
    /// 從 Vault 載入資料庫設定
    pub async fn load(
        resolver: &dyn SecretsResolver,
        vault_config: &str,
        database: &str,
        schema: &str,
        settings: &PostgresSettings,
    ) -> Result<Self> {
        let bundle = resolver.get(vault_config).await.map_err(|e| {
            ConnectorError::configuration("Unable to get database config from Vault", e)
        })?;
        let credentials = DatabaseCredentials::from_bundle(&bundle).map_err(|e| {
            ConnectorError::configuration("Unable to get database config from Vault", e)
        })?;

        Ok(Self {
            vault_config: vault_config.to_string(),
            credentials,
            database: database.to_string(),
            schema: schema.to_string(),
            with_echo: settings.echo,
            pool_max_size: settings.pool_max_size,
            connect_timeout: Duration::from_secs(settings.connect_timeout_seconds),
        })
    }

    pub fn with_echo(mut self, with_echo: bool) -> Self {
        self.with_echo = with_echo;
        self
    }

    pub fn drivername(&self) -> &str {
        DRIVERNAME
    }

    pub fn vault_config(&self) -> &str {
        &self.vault_config
    }

    pub fn db_host(&self) -> &str {
        &self.credentials.db_host
    }

    pub fn db_port(&self) -> u16 {
        self.credentials.db_port
    }

    pub fn db_username(&self) -> &str {
        &self.credentials.db_username
    }

    pub fn db_password(&self) -> &SecretString {
        &self.credentials.db_password
    }

    pub fn database(&self) -> &str {
        &self.database
    }

    pub fn schema(&self) -> &str {
        &self.schema
    }

    pub fn echo(&self) -> bool {
        self.with_echo
    }

    /// Connection URL with the password masked, safe to log.
    pub fn connection_url(&self) -> String {
        format!(
            "{}://{}:***@{}:{}/{}",
            DRIVERNAME,
            self.credentials.db_username,
            self.credentials.db_host,
            self.credentials.db_port,
            self.database
        )
    }

    pub fn pg_config(&self) -> tokio_postgres::Config {
        let mut config = tokio_postgres::Config::new();
        config
            .host(&self.credentials.db_host)
            .port(self.credentials.db_port)
            .user(&self.credentials.db_username)
            .password(self.credentials.db_password.expose_secret())
            .dbname(&self.database)
            .application_name("platform-connector")
            .connect_timeout(self.connect_timeout);

        if !self.schema.is_empty() {
            config.options(&format!("-csearch_path={}", self.schema));
        }
        config
    }

    /// Builds the connection pool. No connection is opened until the first
    /// checkout.
    pub fn get_connection_handle(&self) -> Result<Pool> {
        let mut manager_config = ManagerConfig::default();
        manager_config.recycling_method = RecyclingMethod::Custom(PRE_PING_SQL.to_string());

        let manager = Manager::from_config(self.pg_config(), NoTls, manager_config);
        let pool = Pool::builder(manager).max_size(self.pool_max_size).build()?;

        tracing::debug!(
            "Connection pool ready for {} (schema '{}')",
            self.connection_url(),
            self.schema
        );
        Ok(pool)
    }
}
