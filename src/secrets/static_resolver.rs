use super::{CredentialBundle, SecretsError};
use crate::domain::ports::SecretsResolver;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::RwLock;

/// In-memory resolver for local development and tests.
#[derive(Debug, Default)]
pub struct StaticResolver {
    bundles: RwLock<HashMap<String, CredentialBundle>>,
}

impl StaticResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_bundle(self, bundle: CredentialBundle) -> Self {
        self.register(bundle);
        self
    }

    pub fn register(&self, bundle: CredentialBundle) {
        let mut bundles = self.bundles.write().unwrap_or_else(|e| e.into_inner());
        bundles.insert(bundle.name().to_string(), bundle);
    }
}

#[async_trait]
impl SecretsResolver for StaticResolver {
    async fn get(&self, config_name: &str) -> Result<CredentialBundle, SecretsError> {
        let bundles = self.bundles.read().unwrap_or_else(|e| e.into_inner());
        bundles
            .get(config_name)
            .cloned()
            .ok_or_else(|| SecretsError::NotFound(config_name.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_registered_bundle_is_returned() {
        let resolver = StaticResolver::new()
            .with_bundle(CredentialBundle::new("cos").with_field("bucket", "raw-data"));

        let bundle = resolver.get("cos").await.unwrap();
        assert_eq!(bundle.get("bucket").unwrap().expose_secret(), "raw-data");
    }

    #[tokio::test]
    async fn test_unknown_name_is_not_found() {
        let resolver = StaticResolver::new();
        let err = resolver.get("missing").await.unwrap_err();
        assert!(matches!(err, SecretsError::NotFound(name) if name == "missing"));
    }
}
