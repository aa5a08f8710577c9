use super::{SecretString, SecretsError};
use std::collections::BTreeMap;
use std::fmt;

/// Named set of credential fields returned by a resolver.
///
/// Every value is held as a [`SecretString`]; typed views are built with
/// [`DatabaseCredentials::from_bundle`] and [`StorageCredentials::from_bundle`].
#[derive(Clone)]
pub struct CredentialBundle {
    name: String,
    fields: BTreeMap<String, SecretString>,
}

impl CredentialBundle {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: BTreeMap::new(),
        }
    }

    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.fields.insert(key.into(), SecretString::new(value));
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn get(&self, key: &str) -> Option<&SecretString> {
        self.fields.get(key)
    }

    fn require(&self, key: &str) -> Result<&SecretString, SecretsError> {
        self.get(key).ok_or_else(|| SecretsError::MalformedBundle {
            name: self.name.clone(),
            reason: format!("missing field '{}'", key),
        })
    }
}

impl fmt::Debug for CredentialBundle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // 只列出欄位名稱，不輸出任何值
        f.debug_struct("CredentialBundle")
            .field("name", &self.name)
            .field("fields", &self.fields.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct DatabaseCredentials {
    pub db_host: String,
    pub db_port: u16,
    pub db_username: String,
    pub db_password: SecretString,
}

impl DatabaseCredentials {
    pub fn from_bundle(bundle: &CredentialBundle) -> Result<Self, SecretsError> {
        let port = bundle.require("db_port")?.expose_secret().trim();
        let db_port = port.parse::<u16>().map_err(|_| SecretsError::MalformedBundle {
            name: bundle.name().to_string(),
            reason: format!("db_port '{}' is not a valid port", port),
        })?;

        Ok(Self {
            db_host: bundle.require("db_host")?.expose_secret().to_string(),
            db_port,
            db_username: bundle.require("db_username")?.expose_secret().to_string(),
            db_password: bundle.require("db_password")?.clone(),
        })
    }
}

#[derive(Debug, Clone)]
pub struct StorageCredentials {
    pub hmac_access_key_id: String,
    pub hmac_secret_access_key: SecretString,
    pub bucket: String,
}

impl StorageCredentials {
    pub fn from_bundle(bundle: &CredentialBundle) -> Result<Self, SecretsError> {
        Ok(Self {
            hmac_access_key_id: bundle
                .require("hmac_access_key_id")?
                .expose_secret()
                .to_string(),
            hmac_secret_access_key: bundle.require("hmac_secret_access_key")?.clone(),
            bucket: bundle.require("bucket")?.expose_secret().to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn database_bundle() -> CredentialBundle {
        CredentialBundle::new("analytics")
            .with_field("db_host", "db.internal")
            .with_field("db_port", "5432")
            .with_field("db_username", "reporter")
            .with_field("db_password", "s3cret")
    }

    #[test]
    fn test_database_credentials_from_bundle() {
        let creds = DatabaseCredentials::from_bundle(&database_bundle()).unwrap();
        assert_eq!(creds.db_host, "db.internal");
        assert_eq!(creds.db_port, 5432);
        assert_eq!(creds.db_username, "reporter");
        assert_eq!(creds.db_password.expose_secret(), "s3cret");
        assert!(!format!("{:?}", creds).contains("s3cret"));
    }

    #[test]
    fn test_invalid_port_is_malformed() {
        let bundle = database_bundle().with_field("db_port", "not-a-port");
        let err = DatabaseCredentials::from_bundle(&bundle).unwrap_err();
        assert!(matches!(err, SecretsError::MalformedBundle { .. }));
    }

    #[test]
    fn test_missing_storage_field_is_malformed() {
        let bundle = CredentialBundle::new("cos")
            .with_field("hmac_access_key_id", "AKID")
            .with_field("hmac_secret_access_key", "secret");
        let err = StorageCredentials::from_bundle(&bundle).unwrap_err();
        assert!(err.to_string().contains("bucket"));
    }

    #[test]
    fn test_bundle_debug_hides_values() {
        let rendered = format!("{:?}", database_bundle());
        assert!(rendered.contains("db_password"));
        assert!(!rendered.contains("s3cret"));
    }
}
