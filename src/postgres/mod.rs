//! PostgreSQL side: credential-backed configuration, pooled connector and
//! the cell codec.

pub mod configuration;
pub mod connector;
pub mod sql;
pub mod value;

pub use configuration::PostgresConfiguration;
pub use connector::{
    IfExists, InsertMethod, PostgresConnector, ReadOptions, TableChunks, TableRead, WriteOptions,
};
