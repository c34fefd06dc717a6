//! Video to audio conversion worker.
//!
//! This crate provides:
//! - The per-delivery attempt state machine and its settlement rules
//! - The job executor: prefetch=1 consume loop with reconnect handling
//! - Structured job logging
//! - Graceful shutdown between jobs

pub mod attempt;
pub mod config;
pub mod error;
pub mod executor;
pub mod logging;
pub mod processor;

pub use attempt::{Attempt, Outcome, Settlement, SharedAttempt, Stage};
pub use config::WorkerConfig;
pub use error::{WorkerError, WorkerResult};
pub use executor::JobExecutor;
pub use logging::JobLogger;
pub use processor::JobProcessor;
