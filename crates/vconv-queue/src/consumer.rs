//! Single-delivery consumer window.

use std::sync::Arc;

use tracing::debug;

use crate::broker::{Delivery, MessageBroker};
use crate::error::{QueueError, QueueResult};

/// Consumes one queue with a prefetch of exactly one.
///
/// A second delivery is never handed out while the previous one is
/// unsettled, so a worker holds at most one job at a time.
pub struct JobConsumer {
    broker: Arc<dyn MessageBroker>,
    queue: String,
    in_flight: Option<String>,
}

impl JobConsumer {
    pub fn new(broker: Arc<dyn MessageBroker>, queue: impl Into<String>) -> Self {
        Self {
            broker,
            queue: queue.into(),
            in_flight: None,
        }
    }

    pub fn queue(&self) -> &str {
        &self.queue
    }

    /// Tag of the unsettled delivery, if any.
    pub fn in_flight(&self) -> Option<&str> {
        self.in_flight.as_deref()
    }

    /// Wait for the next delivery. Returns `Ok(None)` when the poll interval
    /// elapses without a message.
    pub async fn next(&mut self) -> QueueResult<Option<Delivery>> {
        if let Some(tag) = &self.in_flight {
            return Err(QueueError::PrefetchExceeded(tag.clone()));
        }

        let delivery = self.broker.fetch(&self.queue).await?;
        if let Some(ref d) = delivery {
            self.in_flight = Some(d.tag.clone());
        }
        Ok(delivery)
    }

    pub async fn ack(&mut self, delivery: &Delivery) -> QueueResult<()> {
        self.release(delivery)?;
        self.broker.ack(delivery).await
    }

    pub async fn nack(&mut self, delivery: &Delivery, requeue: bool) -> QueueResult<()> {
        self.release(delivery)?;
        self.broker.nack(delivery, requeue).await
    }

    /// Renew the claim on the unsettled delivery while it is processed.
    pub async fn touch(&self, delivery: &Delivery) -> QueueResult<()> {
        match self.in_flight.as_deref() {
            Some(tag) if tag == delivery.tag => self.broker.touch(delivery).await,
            _ => Err(QueueError::UnknownDelivery(delivery.tag.clone())),
        }
    }

    /// Forget the unsettled delivery without settling it. Used after the
    /// connection is replaced; the broker redelivers it.
    pub fn abandon(&mut self) -> Option<String> {
        let tag = self.in_flight.take();
        if let Some(ref t) = tag {
            debug!(queue = %self.queue, tag = %t, "Abandoned unsettled delivery");
        }
        tag
    }

    // The window is cleared before the broker call, so a failed settlement
    // does not wedge the consumer.
    fn release(&mut self, delivery: &Delivery) -> QueueResult<()> {
        match self.in_flight.as_deref() {
            Some(tag) if tag == delivery.tag => {
                self.in_flight = None;
                Ok(())
            }
            _ => Err(QueueError::UnknownDelivery(delivery.tag.clone())),
        }
    }
}
