//! Durable job queue on Redis Streams.
//!
//! This crate provides:
//! - The [`MessageBroker`] contract (declare/publish/fetch/ack/nack)
//! - A Redis Streams broker with connect backoff and pending-entry reclaim
//! - An in-memory broker with the same settlement semantics
//! - A prefetch=1 consumer window and a connection liveness supervisor
//! - The job producer that stores an upload and enqueues its conversion

pub mod backoff;
pub mod broker;
pub mod config;
pub mod consumer;
pub mod context;
pub mod error;
pub mod memory;
pub mod producer;
pub mod redis_broker;
pub mod supervisor;

pub use backoff::{retry_linear, FailureTracker, LinearBackoff, RetryResult};
pub use broker::{dead_letter_queue, Delivery, MessageBroker};
pub use config::{BrokerConfig, QueueNames};
pub use consumer::JobConsumer;
pub use context::PipelineContext;
pub use error::{ProduceError, QueueError, QueueResult};
pub use memory::MemoryBroker;
pub use producer::JobProducer;
pub use redis_broker::RedisBroker;
pub use supervisor::{LivenessSupervisor, ReconnectSignal};
