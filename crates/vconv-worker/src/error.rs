//! Worker error types.

use thiserror::Error;
use vconv_models::ConfigError;

pub type WorkerResult<T> = Result<T, WorkerError>;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Storage error: {0}")]
    Storage(#[from] vconv_storage::StorageError),

    #[error("Media error: {0}")]
    Media(#[from] vconv_media::MediaError),

    #[error("Queue error: {0}")]
    Queue(#[from] vconv_queue::QueueError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Content store unreachable after {attempts} attempts: {last_error}")]
    StoreUnreachable { attempts: u32, last_error: String },

    #[error("Metrics setup failed: {0}")]
    Metrics(String),
}

impl WorkerError {
    pub fn metrics(msg: impl Into<String>) -> Self {
        Self::Metrics(msg.into())
    }

    /// Whether the broker connection needs to be replaced.
    pub fn is_connection_failure(&self) -> bool {
        matches!(self, WorkerError::Queue(e) if e.is_connection_failure())
    }
}
