//! The content-store contract.

use std::sync::Arc;

use async_trait::async_trait;
use vconv_models::{BlobId, Namespace};

use crate::config::{StoreBackend, StoreConfig};
use crate::error::StorageResult;
use crate::memory::MemoryBlobStore;
use crate::s3::S3BlobStore;

/// Immutable blob store with two isolated namespaces.
///
/// Blobs are addressed only by the identifier returned from [`put`]; an id
/// issued in one namespace is never valid in the other. There is no update in
/// place.
///
/// [`put`]: ContentStore::put
#[async_trait]
pub trait ContentStore: Send + Sync {
    /// Store bytes and return their freshly generated identifier.
    async fn put(&self, namespace: Namespace, data: Vec<u8>) -> StorageResult<BlobId>;

    /// Fetch a blob. Missing blobs yield `StorageError::NotFound`.
    async fn get(&self, namespace: Namespace, id: &BlobId) -> StorageResult<Vec<u8>>;

    /// Delete a blob. Deleting a missing blob succeeds.
    async fn delete(&self, namespace: Namespace, id: &BlobId) -> StorageResult<()>;

    /// Verify the backend is reachable.
    async fn check_connectivity(&self) -> StorageResult<()>;
}

/// Build the store selected by configuration.
pub async fn connect_store(config: &StoreConfig) -> StorageResult<Arc<dyn ContentStore>> {
    match config.backend {
        StoreBackend::S3 => Ok(Arc::new(S3BlobStore::new(config).await?)),
        StoreBackend::Memory => Ok(Arc::new(MemoryBlobStore::new())),
    }
}
