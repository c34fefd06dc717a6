//! Content store for source media and derived audio.
//!
//! This crate provides:
//! - The [`ContentStore`] contract (put/get/delete by generated id)
//! - An S3-compatible backend with namespace-prefixed keys
//! - An in-memory backend for tests and single-host runs

pub mod config;
pub mod error;
pub mod memory;
pub mod s3;
pub mod store;

pub use config::{StoreBackend, StoreConfig};
pub use error::{StorageError, StorageResult};
pub use memory::MemoryBlobStore;
pub use s3::S3BlobStore;
pub use store::{connect_store, ContentStore};
