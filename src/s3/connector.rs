use crate::config::StorageSettings;
use crate::domain::model::Table;
use crate::domain::ports::SecretsResolver;
use crate::s3::configuration::{S3Configuration, SharedS3Configuration};
use crate::s3::csv_reader::{parse_csv, GetObjectOptions, ReadCsvOptions};
use crate::utils::error::{ConnectorError, Result};
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::Client as S3Client;

/// Reads objects from a single COS bucket.
#[derive(Debug, Clone)]
pub struct S3Connector {
    client: S3Client,
    bucket: String,
}

impl S3Connector {
    pub fn new(client: S3Client, bucket: impl Into<String>) -> Self {
        Self {
            client,
            bucket: bucket.into(),
        }
    }

    /// Loads (or reuses) the shared storage configuration and builds a
    /// client from it.
    pub async fn setup(
        resolver: &dyn SecretsResolver,
        vault_config: &str,
        settings: &StorageSettings,
        shared: &SharedS3Configuration,
    ) -> Result<Self> {
        let configuration = shared.get_or_load(resolver, vault_config, settings).await?;
        Ok(Self::from_configuration(&configuration))
    }

    pub fn from_configuration(configuration: &S3Configuration) -> Self {
        tracing::debug!(
            "🪣 S3 connector for bucket '{}' at {}",
            configuration.bucket(),
            configuration.endpoint()
        );
        Self::new(configuration.get_client(), configuration.bucket())
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    pub fn client(&self) -> &S3Client {
        &self.client
    }

    /// Fetches the whole object body. Every failure, including a missing key
    /// or a body interrupted mid-stream, becomes a retrieval error.
    pub async fn get_object(&self, key: &str, options: &GetObjectOptions) -> Result<Vec<u8>> {
        let mut request = self.client.get_object().bucket(&self.bucket).key(key);
        if let Some(range) = &options.range {
            request = request.range(range);
        }
        if let Some(version_id) = &options.version_id {
            request = request.version_id(version_id);
        }
        if let Some(if_match) = &options.if_match {
            request = request.if_match(if_match);
        }
        if let Some(if_none_match) = &options.if_none_match {
            request = request.if_none_match(if_none_match);
        }
        if let Some(part_number) = options.part_number {
            request = request.part_number(part_number);
        }

        let response = request.send().await.map_err(|e| {
            tracing::debug!("Fetch failed for '{}' from '{}'", key, self.bucket);
            ConnectorError::retrieval(DisplayErrorContext(&e))
        })?;

        let body = response
            .body
            .collect()
            .await
            .map_err(|e| ConnectorError::retrieval(DisplayErrorContext(&e)))?;
        let bytes = body.into_bytes().to_vec();

        tracing::debug!("📥 Fetched '{}' ({} bytes)", key, bytes.len());
        Ok(bytes)
    }

    /// Fetches an object and parses it as CSV.
    pub async fn read_csv(&self, key: &str, options: &ReadCsvOptions) -> Result<Table> {
        let bytes = self.get_object(key, &options.object).await?;
        let table = parse_csv(&bytes, &options.csv)?;
        tracing::debug!(
            "📄 Parsed '{}' into {} rows x {} columns",
            key,
            table.len(),
            table.columns.len()
        );
        Ok(table)
    }
}
