//! Credential resolution for connector configurations.

pub mod bundle;
pub mod error;
pub mod secret;
pub mod static_resolver;
pub mod vault;

pub use bundle::{CredentialBundle, DatabaseCredentials, StorageCredentials};
pub use error::SecretsError;
pub use secret::SecretString;
pub use static_resolver::StaticResolver;
pub use vault::VaultResolver;
