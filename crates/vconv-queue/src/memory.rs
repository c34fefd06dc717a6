//! In-process broker.
//!
//! Follows the Redis broker's settlement rules: requeued messages go to the
//! back of the queue with their attempt counter bumped, rejected ones move to
//! `<queue>.dead`. Reachability can be toggled to exercise reconnect paths.
//! With a reclaim window set, a delivery nobody touched for that long is
//! handed out again, like a Redis entry claimed from a stalled consumer.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Mutex, Notify};
use tokio::time::Instant;

use crate::broker::{dead_letter_queue, Delivery, MessageBroker};
use crate::error::{QueueError, QueueResult};

#[derive(Debug)]
struct Unacked {
    delivery: Delivery,
    touched: Instant,
}

#[derive(Debug, Default)]
struct QueueState {
    ready: VecDeque<Delivery>,
    unacked: HashMap<String, Unacked>,
}

impl QueueState {
    fn hand_out(&mut self, delivery: Delivery) -> Delivery {
        self.unacked.insert(
            delivery.tag.clone(),
            Unacked {
                delivery: delivery.clone(),
                touched: Instant::now(),
            },
        );
        delivery
    }

    /// Oldest-touched delivery idle for at least `min_idle`, renewed for
    /// the new holder.
    fn reclaim(&mut self, min_idle: Duration) -> Option<Delivery> {
        let stale = self
            .unacked
            .values_mut()
            .filter(|u| u.touched.elapsed() >= min_idle)
            .min_by_key(|u| u.touched)?;
        stale.touched = Instant::now();
        Some(stale.delivery.clone())
    }
}

/// Broker that keeps all queues in memory.
pub struct MemoryBroker {
    queues: Mutex<HashMap<String, QueueState>>,
    failing_publishes: Mutex<HashSet<String>>,
    notify: Notify,
    next_tag: AtomicU64,
    reachable: AtomicBool,
    reconnects: AtomicU32,
    poll_interval: Duration,
    claim_min_idle: Option<Duration>,
}

impl Default for MemoryBroker {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBroker {
    pub fn new() -> Self {
        Self {
            queues: Mutex::new(HashMap::new()),
            failing_publishes: Mutex::new(HashSet::new()),
            notify: Notify::new(),
            next_tag: AtomicU64::new(1),
            reachable: AtomicBool::new(true),
            reconnects: AtomicU32::new(0),
            poll_interval: Duration::from_secs(1),
            claim_min_idle: None,
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Hand out again any delivery left untouched for `min_idle`.
    pub fn with_claim_min_idle(mut self, min_idle: Duration) -> Self {
        self.claim_min_idle = Some(min_idle);
        self
    }

    /// Simulate losing or regaining the connection. While unreachable every
    /// operation fails with a connection error and `reconnect` keeps failing.
    pub fn set_reachable(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::SeqCst);
    }

    /// Make publishes to `queue` fail (or succeed again).
    pub async fn fail_publishes_to(&self, queue: &str, fail: bool) {
        let mut failing = self.failing_publishes.lock().await;
        if fail {
            failing.insert(queue.to_string());
        } else {
            failing.remove(queue);
        }
    }

    /// Messages waiting in `queue`, oldest first.
    pub async fn ready(&self, queue: &str) -> Vec<Delivery> {
        let queues = self.queues.lock().await;
        queues
            .get(queue)
            .map(|q| q.ready.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Number of handed-out, unsettled deliveries of `queue`.
    pub async fn unacked_len(&self, queue: &str) -> usize {
        let queues = self.queues.lock().await;
        queues.get(queue).map(|q| q.unacked.len()).unwrap_or(0)
    }

    pub async fn is_declared(&self, queue: &str) -> bool {
        self.queues.lock().await.contains_key(queue)
    }

    pub fn reconnect_count(&self) -> u32 {
        self.reconnects.load(Ordering::SeqCst)
    }

    fn check_reachable(&self) -> QueueResult<()> {
        if self.reachable.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(QueueError::connection_failed("broker unreachable"))
        }
    }

    fn next_tag(&self) -> String {
        format!("mem-{}", self.next_tag.fetch_add(1, Ordering::SeqCst))
    }

    async fn append(&self, queue: &str, payload: Vec<u8>, attempt: u32) {
        let delivery = Delivery {
            queue: queue.to_string(),
            tag: self.next_tag(),
            payload,
            attempt,
        };
        self.queues
            .lock()
            .await
            .entry(queue.to_string())
            .or_default()
            .ready
            .push_back(delivery);
        self.notify.notify_waiters();
    }

    async fn take_unacked(&self, delivery: &Delivery) -> QueueResult<Delivery> {
        let mut queues = self.queues.lock().await;
        queues
            .get_mut(&delivery.queue)
            .and_then(|q| q.unacked.remove(&delivery.tag))
            .map(|u| u.delivery)
            .ok_or_else(|| QueueError::UnknownDelivery(delivery.tag.clone()))
    }
}

#[async_trait]
impl MessageBroker for MemoryBroker {
    async fn declare_durable_queue(&self, queue: &str) -> QueueResult<()> {
        self.check_reachable()?;
        self.queues
            .lock()
            .await
            .entry(queue.to_string())
            .or_default();
        Ok(())
    }

    async fn publish(&self, queue: &str, payload: &[u8]) -> QueueResult<()> {
        self.check_reachable()?;
        if self.failing_publishes.lock().await.contains(queue) {
            return Err(QueueError::publish_failed(queue, "publish rejected"));
        }
        self.append(queue, payload.to_vec(), 1).await;
        Ok(())
    }

    async fn fetch(&self, queue: &str) -> QueueResult<Option<Delivery>> {
        let deadline = Instant::now() + self.poll_interval;

        loop {
            self.check_reachable()?;

            // Register interest before looking so a concurrent publish is
            // not missed.
            let notified = self.notify.notified();
            {
                let mut queues = self.queues.lock().await;
                let state = queues.entry(queue.to_string()).or_default();
                if let Some(delivery) = self.claim_min_idle.and_then(|idle| state.reclaim(idle)) {
                    return Ok(Some(delivery));
                }
                if let Some(delivery) = state.ready.pop_front() {
                    return Ok(Some(state.hand_out(delivery)));
                }
            }

            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return Ok(None);
            }
        }
    }

    async fn ack(&self, delivery: &Delivery) -> QueueResult<()> {
        self.check_reachable()?;
        self.take_unacked(delivery).await?;
        Ok(())
    }

    async fn nack(&self, delivery: &Delivery, requeue: bool) -> QueueResult<()> {
        self.check_reachable()?;
        let original = self.take_unacked(delivery).await?;
        if requeue {
            self.append(
                &original.queue,
                original.payload,
                original.attempt.saturating_add(1),
            )
            .await;
        } else {
            self.append(&dead_letter_queue(&original.queue), original.payload, original.attempt)
                .await;
        }
        Ok(())
    }

    async fn touch(&self, delivery: &Delivery) -> QueueResult<()> {
        self.check_reachable()?;
        let mut queues = self.queues.lock().await;
        let unacked = queues
            .get_mut(&delivery.queue)
            .and_then(|q| q.unacked.get_mut(&delivery.tag))
            .ok_or_else(|| QueueError::UnknownDelivery(delivery.tag.clone()))?;
        unacked.touched = Instant::now();
        Ok(())
    }

    async fn queue_len(&self, queue: &str) -> QueueResult<u64> {
        self.check_reachable()?;
        let queues = self.queues.lock().await;
        Ok(queues.get(queue).map(|q| q.ready.len() as u64).unwrap_or(0))
    }

    async fn ping(&self) -> QueueResult<()> {
        self.check_reachable()
    }

    async fn reconnect(&self) -> QueueResult<()> {
        self.check_reachable()?;
        self.reconnects.fetch_add(1, Ordering::SeqCst);

        // Deliveries of the dropped connection become available again.
        let mut queues = self.queues.lock().await;
        for state in queues.values_mut() {
            for (_, unacked) in state.unacked.drain() {
                state.ready.push_front(unacked.delivery);
            }
        }
        drop(queues);
        self.notify.notify_waiters();
        Ok(())
    }
}
