//! Storage error types.

use thiserror::Error;
use vconv_models::{BlobId, ConfigError, Namespace};

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Storage configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Blob not found: {namespace}/{id}")]
    NotFound { namespace: Namespace, id: BlobId },

    #[error("Upload failed: {0}")]
    UploadFailed(String),

    #[error("Download failed: {0}")]
    DownloadFailed(String),

    #[error("Delete failed: {0}")]
    DeleteFailed(String),

    #[error("Store unreachable: {0}")]
    Unreachable(String),
}

impl StorageError {
    pub fn not_found(namespace: Namespace, id: &BlobId) -> Self {
        Self::NotFound {
            namespace,
            id: id.clone(),
        }
    }

    pub fn upload_failed(msg: impl Into<String>) -> Self {
        Self::UploadFailed(msg.into())
    }

    pub fn download_failed(msg: impl Into<String>) -> Self {
        Self::DownloadFailed(msg.into())
    }

    pub fn delete_failed(msg: impl Into<String>) -> Self {
        Self::DeleteFailed(msg.into())
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, StorageError::NotFound { .. })
    }
}
