//! [`ObjectStore`] implementation backed by the AWS S3 SDK.

use crate::error::{StoreError, TransferError};
use crate::store::{ByteRange, ListPage, ObjectBody, ObjectStore};
use crate::types::ObjectDescriptor;
use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region};
use aws_credential_types::Credentials;
use aws_sdk_s3::config::retry::RetryConfig;
use aws_sdk_s3::config::Builder as S3ConfigBuilder;
use aws_sdk_s3::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_s3::Client;
use tracing::debug;

/// Page size requested from `ListObjectsV2`.
const LIST_PAGE_SIZE: i32 = 1000;

/// Attempts the SDK makes per request before surfacing an error.
const SDK_MAX_ATTEMPTS: u32 = 3;

/// Connection parameters for an S3-compatible endpoint.
#[derive(Debug, Clone, Default)]
pub struct S3ClientConfig {
    pub region: String,
    /// Static access key; when either key is missing the default provider chain is used.
    pub access_key: Option<String>,
    pub secret_key: Option<String>,
    /// Custom endpoint for S3-compatible services (R2, MinIO, ...).
    pub endpoint_url: Option<String>,
    pub force_path_style: bool,
}

/// Builds an S3 client from explicit settings.
pub async fn create_s3_client(config: &S3ClientConfig) -> Result<Client, TransferError> {
    if config.region.trim().is_empty() {
        return Err(TransferError::InvalidInput(
            "AWS region cannot be empty".to_string(),
        ));
    }
    let region = Region::new(config.region.clone());

    let mut builder = match (&config.access_key, &config.secret_key) {
        (Some(access_key), Some(secret_key))
            if !access_key.is_empty() && !secret_key.is_empty() =>
        {
            let credentials = Credentials::new(access_key, secret_key, None, None, "s3fetch");
            S3ConfigBuilder::new()
                .behavior_version(BehaviorVersion::latest())
                .credentials_provider(credentials)
                .region(region)
        }
        _ => {
            let shared = aws_config::defaults(BehaviorVersion::latest())
                .region(region)
                .load()
                .await;
            S3ConfigBuilder::from(&shared)
        }
    };

    builder = builder.retry_config(RetryConfig::standard().with_max_attempts(SDK_MAX_ATTEMPTS));

    if let Some(endpoint_url) = &config.endpoint_url {
        builder = builder.endpoint_url(endpoint_url);
    }
    if config.force_path_style {
        builder = builder.force_path_style(true);
    }

    Ok(Client::from_conf(builder.build()))
}

/// Maps an SDK failure to a [`StoreError`], keeping the service error code when there is one.
fn map_sdk_error<E, R>(operation: &'static str, err: SdkError<E, R>) -> StoreError
where
    E: ProvideErrorMetadata + std::error::Error + Send + Sync + 'static,
    R: std::fmt::Debug,
{
    match err.as_service_error() {
        Some(service) => StoreError::Service {
            operation,
            code: service.code().unwrap_or("unknown").to_string(),
            message: service.message().unwrap_or("no message").to_string(),
        },
        None => StoreError::Transport(format!("{}: {}", operation, DisplayErrorContext(&err))),
    }
}

/// S3 storage backend.
#[derive(Clone, Debug)]
pub struct S3Store {
    client: Client,
}

impl S3Store {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    pub async fn connect(config: &S3ClientConfig) -> Result<Self, TransferError> {
        Ok(Self::new(create_s3_client(config).await?))
    }
}

#[async_trait]
impl ObjectStore for S3Store {
    async fn list_page(
        &self,
        bucket: &str,
        prefix: &str,
        continuation: Option<String>,
    ) -> Result<ListPage, StoreError> {
        let response = self
            .client
            .list_objects_v2()
            .bucket(bucket)
            .prefix(prefix)
            .set_continuation_token(continuation)
            .max_keys(LIST_PAGE_SIZE)
            .send()
            .await
            .map_err(|e| map_sdk_error("ListObjectsV2", e))?;

        let objects = response
            .contents()
            .iter()
            .filter_map(|obj| {
                let key = obj.key()?.to_string();
                let size = obj.size().unwrap_or(0).max(0) as u64;
                Some(ObjectDescriptor { key, size })
            })
            .collect::<Vec<_>>();

        let next_token = if response.is_truncated().unwrap_or(false) {
            response.next_continuation_token().map(|s| s.to_string())
        } else {
            None
        };
        debug!(
            "Listed {} objects under s3://{}/{} (more: {})",
            objects.len(),
            bucket,
            prefix,
            next_token.is_some()
        );

        Ok(ListPage {
            objects,
            next_token,
        })
    }

    async fn get_object(
        &self,
        bucket: &str,
        key: &str,
        range: Option<ByteRange>,
    ) -> Result<ObjectBody, StoreError> {
        let output = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .set_range(range.map(|r| r.header_value()))
            .send()
            .await
            .map_err(|e| map_sdk_error("GetObject", e))?;

        Ok(Box::pin(output.body.into_async_read()))
    }

    async fn head_bucket(&self, bucket: &str) -> Result<(), StoreError> {
        match self.client.head_bucket().bucket(bucket).send().await {
            Ok(_) => Ok(()),
            Err(e) if e.as_service_error().is_some_and(|se| se.is_not_found()) => {
                Err(StoreError::NoSuchBucket(bucket.to_string()))
            }
            Err(e) => Err(map_sdk_error("HeadBucket", e)),
        }
    }

    async fn list_prefixes(&self, bucket: &str, prefix: &str) -> Result<Vec<String>, StoreError> {
        let mut prefixes = Vec::new();
        let mut continuation_token: Option<String> = None;

        loop {
            let response = self
                .client
                .list_objects_v2()
                .bucket(bucket)
                .prefix(prefix)
                .delimiter("/")
                .set_continuation_token(continuation_token.take())
                .max_keys(LIST_PAGE_SIZE)
                .send()
                .await
                .map_err(|e| map_sdk_error("ListObjectsV2", e))?;

            prefixes.extend(
                response
                    .common_prefixes()
                    .iter()
                    .filter_map(|p| p.prefix().map(|s| s.to_string())),
            );

            if !response.is_truncated().unwrap_or(false) {
                break;
            }
            continuation_token = response.next_continuation_token().map(|s| s.to_string());
            if continuation_token.is_none() {
                break;
            }
        }

        Ok(prefixes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn empty_region_is_rejected() {
        let config = S3ClientConfig {
            region: "  ".to_string(),
            ..S3ClientConfig::default()
        };
        let err = create_s3_client(&config).await.unwrap_err();
        assert_eq!(err.to_string(), "AWS region cannot be empty");
    }

    #[tokio::test]
    async fn static_credentials_build_a_client() {
        let config = S3ClientConfig {
            region: "us-east-1".to_string(),
            access_key: Some("AKIDEXAMPLE".to_string()),
            secret_key: Some("secret".to_string()),
            endpoint_url: Some("http://127.0.0.1:9000".to_string()),
            force_path_style: true,
        };
        let client = create_s3_client(&config).await.unwrap();
        assert_eq!(
            client.config().region().map(|r| r.as_ref()),
            Some("us-east-1")
        );
    }
}
