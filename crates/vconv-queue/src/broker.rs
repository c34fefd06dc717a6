//! The broker contract.

use async_trait::async_trait;

use crate::error::QueueResult;

/// One message handed to a consumer, together with its settlement handle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    /// Queue the message was consumed from
    pub queue: String,
    /// Broker-assigned handle used to ack/nack
    pub tag: String,
    /// Raw message body
    pub payload: Vec<u8>,
    /// 1 on first delivery, incremented on every requeue
    pub attempt: u32,
}

/// Name of the stream that receives messages rejected without requeue.
pub fn dead_letter_queue(queue: &str) -> String {
    format!("{queue}.dead")
}

/// Durable queue service.
///
/// Every publish is persistent. A delivery stays unacknowledged until it is
/// settled with [`ack`](MessageBroker::ack) or [`nack`](MessageBroker::nack);
/// unsettled deliveries of a consumer that disappears are redelivered.
#[async_trait]
pub trait MessageBroker: Send + Sync {
    /// Create the queue if needed. Idempotent.
    async fn declare_durable_queue(&self, queue: &str) -> QueueResult<()>;

    /// Append a message. Fails only on transport errors.
    async fn publish(&self, queue: &str, payload: &[u8]) -> QueueResult<()>;

    /// Hand out at most one message, waiting up to the poll interval.
    async fn fetch(&self, queue: &str) -> QueueResult<Option<Delivery>>;

    /// Settle a delivery as done.
    async fn ack(&self, delivery: &Delivery) -> QueueResult<()>;

    /// Settle a delivery as not done. `requeue = true` makes it available
    /// again; `requeue = false` dead-letters it.
    async fn nack(&self, delivery: &Delivery, requeue: bool) -> QueueResult<()>;

    /// Renew the claim on an unsettled delivery. A delivery that is not
    /// touched for the broker's reclaim window may be handed to another
    /// consumer.
    async fn touch(&self, delivery: &Delivery) -> QueueResult<()>;

    /// Number of messages waiting in a queue.
    async fn queue_len(&self, queue: &str) -> QueueResult<u64>;

    /// Cheap round trip used by the liveness check. Must not mutate the
    /// connection.
    async fn ping(&self) -> QueueResult<()>;

    /// Replace the connection. Only the owner of the connection calls this.
    async fn reconnect(&self) -> QueueResult<()>;
}
