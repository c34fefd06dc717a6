//! Shared handles for the producer and the worker.

use std::sync::Arc;

use vconv_storage::ContentStore;

use crate::broker::MessageBroker;
use crate::config::QueueNames;
use crate::error::QueueResult;

/// Content store, broker and queue names, passed explicitly instead of
/// living in process-wide globals.
#[derive(Clone)]
pub struct PipelineContext {
    pub store: Arc<dyn ContentStore>,
    pub broker: Arc<dyn MessageBroker>,
    pub queues: QueueNames,
}

impl PipelineContext {
    pub fn new(store: Arc<dyn ContentStore>, broker: Arc<dyn MessageBroker>, queues: QueueNames) -> Self {
        Self {
            store,
            broker,
            queues,
        }
    }

    /// Declare both durable queues.
    pub async fn declare_queues(&self) -> QueueResult<()> {
        self.broker.declare_durable_queue(&self.queues.jobs).await?;
        self.broker
            .declare_durable_queue(&self.queues.completions)
            .await?;
        Ok(())
    }
}

impl std::fmt::Debug for PipelineContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineContext")
            .field("queues", &self.queues)
            .finish_non_exhaustive()
    }
}
