//! S3-compatible object-store backend.

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_credential_types::Credentials;
use aws_sdk_s3::config::{Builder, Region};
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use tracing::{debug, info};
use vconv_models::{BlobId, ConfigError, Namespace};

use crate::config::StoreConfig;
use crate::error::{StorageError, StorageResult};
use crate::store::ContentStore;

/// Content store backed by one bucket, one key prefix per namespace.
#[derive(Clone)]
pub struct S3BlobStore {
    client: Client,
    bucket: String,
}

impl S3BlobStore {
    /// Create a new client from configuration.
    pub async fn new(config: &StoreConfig) -> StorageResult<Self> {
        let access_key_id = config
            .access_key_id
            .as_deref()
            .ok_or_else(|| ConfigError::missing("STORE_ACCESS_KEY_ID"))?;
        let secret_access_key = config
            .secret_access_key
            .as_deref()
            .ok_or_else(|| ConfigError::missing("STORE_SECRET_ACCESS_KEY"))?;

        let credentials = Credentials::new(access_key_id, secret_access_key, None, None, "vconv");

        let sdk_config = Builder::new()
            .behavior_version(BehaviorVersion::latest())
            .endpoint_url(config.endpoint_url())
            .region(Region::new(config.region.clone()))
            .credentials_provider(credentials)
            .force_path_style(true)
            .build();

        info!(
            "Content store: bucket {} at {}",
            config.bucket,
            config.endpoint_url()
        );

        Ok(Self {
            client: Client::from_conf(sdk_config),
            bucket: config.bucket.clone(),
        })
    }

    fn key(namespace: Namespace, id: &BlobId) -> String {
        format!("{}/{}", namespace.prefix(), id)
    }
}

#[async_trait]
impl ContentStore for S3BlobStore {
    async fn put(&self, namespace: Namespace, data: Vec<u8>) -> StorageResult<BlobId> {
        let id = BlobId::new();
        let key = Self::key(namespace, &id);
        debug!("Uploading {} bytes to {}", data.len(), key);

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(&key)
            .body(ByteStream::from(data))
            .content_type("application/octet-stream")
            .send()
            .await
            .map_err(|e| StorageError::upload_failed(e.to_string()))?;

        Ok(id)
    }

    async fn get(&self, namespace: Namespace, id: &BlobId) -> StorageResult<Vec<u8>> {
        let key = Self::key(namespace, id);
        debug!("Downloading {}", key);

        let response = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(&key)
            .send()
            .await
            .map_err(|e| {
                let err = e.into_service_error();
                if err.is_no_such_key() {
                    StorageError::not_found(namespace, id)
                } else {
                    StorageError::download_failed(err.to_string())
                }
            })?;

        let bytes = response
            .body
            .collect()
            .await
            .map_err(|e| StorageError::download_failed(e.to_string()))?
            .into_bytes()
            .to_vec();

        Ok(bytes)
    }

    async fn delete(&self, namespace: Namespace, id: &BlobId) -> StorageResult<()> {
        let key = Self::key(namespace, id);
        debug!("Deleting {}", key);

        // DeleteObject succeeds for missing keys.
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(&key)
            .send()
            .await
            .map_err(|e| StorageError::delete_failed(e.to_string()))?;

        Ok(())
    }

    async fn check_connectivity(&self) -> StorageResult<()> {
        self.client
            .head_bucket()
            .bucket(&self.bucket)
            .send()
            .await
            .map_err(|e| StorageError::Unreachable(format!("bucket {}: {}", self.bucket, e)))?;
        Ok(())
    }
}
