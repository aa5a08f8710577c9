use anyhow::Result;
use platform_connector::{
    ConnectorRegistry, ConnectorSettings, CredentialBundle, SharedS3Configuration, StaticResolver,
};
use std::sync::Arc;

fn resolver() -> Arc<StaticResolver> {
    Arc::new(
        StaticResolver::new()
            .with_bundle(
                CredentialBundle::new("warehouse")
                    .with_field("db_host", "127.0.0.1")
                    .with_field("db_port", "5432")
                    .with_field("db_username", "etl")
                    .with_field("db_password", "pa55"),
            )
            .with_bundle(
                CredentialBundle::new("cos-primary")
                    .with_field("hmac_access_key_id", "AKID-1")
                    .with_field("hmac_secret_access_key", "secret-1")
                    .with_field("bucket", "primary"),
            )
            .with_bundle(
                CredentialBundle::new("cos-secondary")
                    .with_field("hmac_access_key_id", "AKID-2")
                    .with_field("hmac_secret_access_key", "secret-2")
                    .with_field("bucket", "secondary"),
            ),
    )
}

#[tokio::test]
async fn test_concurrent_lookups_build_one_connector() -> Result<()> {
    let registry = Arc::new(ConnectorRegistry::with_storage_slot(
        resolver(),
        ConnectorSettings::default(),
        Arc::new(SharedS3Configuration::new()),
    ));

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let registry = registry.clone();
            tokio::spawn(async move {
                registry
                    .postgres
                    .setup_connector("warehouse", "analytics", "public")
                    .await
            })
        })
        .collect();

    let mut connectors = Vec::new();
    for handle in handles {
        connectors.push(handle.await??);
    }

    assert!(connectors.iter().all(|c| Arc::ptr_eq(c, &connectors[0])));
    assert_eq!(registry.postgres.len().await, 1);
    assert_eq!(connectors[0].schema(), "public");
    Ok(())
}

/// 儲存設定為單例：第二個 vault config 仍沿用第一次載入的憑證
#[tokio::test]
async fn test_storage_configuration_is_loaded_once() -> Result<()> {
    let slot = Arc::new(SharedS3Configuration::new());
    let registry =
        ConnectorRegistry::with_storage_slot(resolver(), ConnectorSettings::default(), slot.clone());

    let primary = registry.s3.setup_connector("cos-primary", "", "").await?;
    let secondary = registry.s3.setup_connector("cos-secondary", "", "").await?;

    assert_eq!(primary.bucket(), "primary");
    assert_eq!(secondary.bucket(), "primary");
    assert_eq!(registry.s3.keys().await, vec!["cos-primary", "cos-secondary"]);

    let loaded = slot.get().expect("configuration should be loaded");
    assert_eq!(loaded.vault_config(), "cos-primary");
    Ok(())
}

#[tokio::test]
async fn test_registries_share_an_injected_slot() -> Result<()> {
    let slot = Arc::new(SharedS3Configuration::new());
    let first =
        ConnectorRegistry::with_storage_slot(resolver(), ConnectorSettings::default(), slot.clone());
    let second =
        ConnectorRegistry::with_storage_slot(resolver(), ConnectorSettings::default(), slot);

    let a = first.s3.setup_connector("cos-secondary", "", "").await?;
    let b = second.s3.setup_connector("cos-primary", "", "").await?;

    assert!(!Arc::ptr_eq(&a, &b));
    assert_eq!(b.bucket(), "secondary");
    Ok(())
}
