//! Queue error types.

use thiserror::Error;
use vconv_models::ConfigError;
use vconv_storage::StorageError;

pub type QueueResult<T> = Result<T, QueueError>;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("Broker configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Broker unreachable after {attempts} connect attempts: {last_error}")]
    ConnectAttemptsExhausted { attempts: u32, last_error: String },

    #[error("Publish to '{queue}' failed: {reason}")]
    PublishFailed { queue: String, reason: String },

    #[error("Settlement of delivery {tag} failed: {reason}")]
    SettlementFailed { tag: String, reason: String },

    #[error("Unknown delivery tag: {0}")]
    UnknownDelivery(String),

    #[error("Prefetch window full: delivery {0} is not settled")]
    PrefetchExceeded(String),

    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl QueueError {
    pub fn connection_failed(msg: impl Into<String>) -> Self {
        Self::ConnectionFailed(msg.into())
    }

    pub fn publish_failed(queue: &str, reason: impl Into<String>) -> Self {
        Self::PublishFailed {
            queue: queue.to_string(),
            reason: reason.into(),
        }
    }

    pub fn settlement_failed(tag: &str, reason: impl Into<String>) -> Self {
        Self::SettlementFailed {
            tag: tag.to_string(),
            reason: reason.into(),
        }
    }

    /// Whether the owning process should re-establish the connection.
    pub fn is_connection_failure(&self) -> bool {
        match self {
            QueueError::ConnectionFailed(_) => true,
            QueueError::Redis(e) => {
                e.is_io_error()
                    || e.is_connection_dropped()
                    || e.is_connection_refusal()
                    || e.is_timeout()
            }
            _ => false,
        }
    }
}

/// Failure to accept an upload for conversion.
#[derive(Debug, Error)]
pub enum ProduceError {
    #[error("Failed to store upload: {0}")]
    Store(#[source] StorageError),

    #[error("Failed to enqueue conversion job: {0}")]
    Enqueue(#[source] QueueError),
}
