//! Shared data models for the vconv pipeline.
//!
//! This crate provides:
//! - Blob identifiers and content-store namespaces
//! - The job/completion message schema carried on the queues
//! - Strict environment parsing shared by every process

pub mod blob;
pub mod env;
pub mod job;

pub use blob::{BlobId, Namespace};
pub use env::{ConfigError, ConfigResult};
pub use job::JobMessage;
