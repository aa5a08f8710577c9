pub mod config;
pub mod domain;
pub mod postgres;
pub mod registry;
pub mod s3;
pub mod secrets;
pub mod utils;

pub use config::ConnectorSettings;
pub use domain::model::{DType, QueryResult, Table, Value};
pub use domain::ports::SecretsResolver;
pub use postgres::{
    IfExists, InsertMethod, PostgresConfiguration, PostgresConnector, ReadOptions, TableRead,
    WriteOptions,
};
pub use registry::ConnectorRegistry;
pub use s3::{ReadCsvOptions, S3Configuration, S3Connector, SharedS3Configuration};
pub use secrets::{CredentialBundle, SecretString, StaticResolver, VaultResolver};
pub use utils::error::{ConnectorError, Result};
