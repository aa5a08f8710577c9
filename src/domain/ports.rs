use crate::secrets::{CredentialBundle, SecretsError};
use async_trait::async_trait;

/// Looks up a named credential bundle in a secrets-management service.
#[async_trait]
pub trait SecretsResolver: Send + Sync {
    async fn get(&self, config_name: &str) -> Result<CredentialBundle, SecretsError>;
}
