use anyhow::Result;
use httpmock::prelude::*;
use platform_connector::config::VaultSettings;
use platform_connector::secrets::{DatabaseCredentials, SecretsError};
use platform_connector::{
    ConnectorError, ConnectorSettings, PostgresConfiguration, SecretString, SecretsResolver,
    VaultResolver,
};

/// KV v2 回應解析為資料庫憑證
#[tokio::test]
async fn test_vault_kv_v2_database_bundle() -> Result<()> {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(GET)
            .path("/v1/secret/data/warehouse")
            .header("X-Vault-Token", "s.test-token");
        then.status(200).json_body(serde_json::json!({
            "data": {
                "data": {
                    "db_host": "pg.internal",
                    "db_port": 5433,
                    "db_username": "etl",
                    "db_password": "pa55"
                },
                "metadata": { "version": 3 }
            }
        }));
    });

    let resolver = VaultResolver::new(&server.base_url(), SecretString::new("s.test-token"), "secret")?;
    let bundle = resolver.get("warehouse").await?;
    let credentials = DatabaseCredentials::from_bundle(&bundle)?;

    mock.assert();
    assert_eq!(credentials.db_host, "pg.internal");
    assert_eq!(credentials.db_port, 5433);
    assert_eq!(credentials.db_password.expose_secret(), "pa55");
    assert!(!format!("{:?}", bundle).contains("pa55"));
    Ok(())
}

#[tokio::test]
async fn test_vault_namespace_header_is_sent() -> Result<()> {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(GET)
            .path("/v1/kv/data/cos")
            .header("X-Vault-Namespace", "team-data");
        then.status(200).json_body(serde_json::json!({
            "data": {
                "hmac_access_key_id": "AKID",
                "hmac_secret_access_key": "secret",
                "bucket": "landing"
            }
        }));
    });

    let mut settings = VaultSettings {
        address: server.base_url(),
        token: Some(SecretString::new("s.test-token")),
        mount: "kv".to_string(),
        ..VaultSettings::default()
    };
    settings.namespace = Some("team-data".to_string());

    let resolver = VaultResolver::from_settings(&settings)?;
    let bundle = resolver.get("cos").await?;

    mock.assert();
    assert_eq!(bundle.get("bucket").map(|s| s.expose_secret()), Some("landing"));
    Ok(())
}

#[tokio::test]
async fn test_vault_status_mapping() -> Result<()> {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path("/v1/secret/data/missing");
        then.status(404).json_body(serde_json::json!({ "errors": [] }));
    });
    server.mock(|when, then| {
        when.method(GET).path("/v1/secret/data/forbidden");
        then.status(403).json_body(serde_json::json!({ "errors": ["permission denied"] }));
    });

    let resolver = VaultResolver::new(&server.base_url(), SecretString::new("s.test-token"), "secret")?;

    assert!(matches!(resolver.get("missing").await, Err(SecretsError::NotFound(_))));
    assert!(matches!(resolver.get("forbidden").await, Err(SecretsError::Unauthorized)));
    Ok(())
}

#[tokio::test]
async fn test_vault_kv_v1_mount_path() -> Result<()> {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(GET).path("/v1/legacy/cos");
        then.status(200).json_body(serde_json::json!({
            "data": {
                "hmac_access_key_id": "AKID",
                "hmac_secret_access_key": "secret",
                "bucket": "archive"
            },
            "lease_duration": 2764800
        }));
    });

    let settings = VaultSettings {
        address: server.base_url(),
        token: Some(SecretString::new("s.test-token")),
        mount: "legacy".to_string(),
        kv_version: 1,
        ..VaultSettings::default()
    };
    let resolver = VaultResolver::from_settings(&settings)?;
    let bundle = resolver.get("cos").await?;

    mock.assert();
    assert_eq!(bundle.get("bucket").map(|s| s.expose_secret()), Some("archive"));
    Ok(())
}

/// Vault 找不到設定時，資料庫設定載入應回傳 Configuration 錯誤
#[tokio::test]
async fn test_database_configuration_surfaces_vault_failure() -> Result<()> {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path("/v1/secret/data/unknown");
        then.status(404);
    });

    let resolver = VaultResolver::new(&server.base_url(), SecretString::new("s.test-token"), "secret")?;
    let settings = ConnectorSettings::default();
    let err = PostgresConfiguration::load(&resolver, "unknown", "analytics", "public", &settings.postgres)
        .await
        .unwrap_err();

    assert!(matches!(err, ConnectorError::Configuration { .. }));
    assert!(err.to_string().contains("Unable to get database config from Vault"));
    Ok(())
}
