use crate::secrets::SecretsError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConnectorError {
    #[error("Configuration error: {message}")]
    Configuration {
        message: String,
        #[source]
        source: Option<SecretsError>,
    },

    /// Any failure while fetching an object. The message carries the
    /// underlying cause text.
    #[error("Impossible to retrieve S3 object. Error: {message}")]
    Retrieval { message: String },

    #[error("Query failed: {0}")]
    Query(#[from] tokio_postgres::Error),

    #[error("Connection pool error: {0}")]
    Pool(#[from] deadpool_postgres::PoolError),

    #[error("Connection pool could not be built: {0}")]
    PoolBuild(#[from] deadpool_postgres::BuildError),

    #[error("Table '{name}' already exists")]
    TableExists { name: String },

    #[error("Unsupported column type '{type_name}' for column '{column}'")]
    UnsupportedColumnType { column: String, type_name: String },

    #[error("Data processing error: {message}")]
    Processing { message: String },

    #[error("CSV processing error: {0}")]
    Csv(#[from] csv::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Missing required configuration field: {field}")]
    MissingConfig { field: String },

    #[error("Invalid value '{value}' for '{field}': {reason}")]
    InvalidConfigValue {
        field: String,
        value: String,
        reason: String,
    },
}

impl ConnectorError {
    pub fn configuration(message: impl Into<String>, source: SecretsError) -> Self {
        Self::Configuration {
            message: message.into(),
            source: Some(source),
        }
    }

    pub fn retrieval(cause: impl std::fmt::Display) -> Self {
        Self::Retrieval {
            message: cause.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, ConnectorError>;
