//! Redis Streams broker.
//!
//! A durable queue is a stream plus a consumer group. Entries carry the raw
//! message under `job` and the delivery counter under `attempt`. Settling an
//! entry removes it from the stream, so `XLEN` counts outstanding work.

use std::time::Duration;

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::streams::{
    StreamClaimReply, StreamId, StreamPendingCountReply, StreamReadOptions, StreamReadReply,
};
use redis::{AsyncCommands, AsyncConnectionConfig, Client};
use tokio::sync::{Mutex, RwLock};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::backoff::{retry_linear, RetryResult};
use crate::broker::{dead_letter_queue, Delivery, MessageBroker};
use crate::config::BrokerConfig;
use crate::error::{QueueError, QueueResult};

const PAYLOAD_FIELD: &str = "job";
const ATTEMPT_FIELD: &str = "attempt";

/// How often a fetch looks for entries abandoned by crashed consumers.
const CLAIM_SCAN_INTERVAL: Duration = Duration::from_secs(30);

/// Broker client for Redis Streams.
pub struct RedisBroker {
    client: Client,
    conn: RwLock<MultiplexedConnection>,
    config: BrokerConfig,
    declared: Mutex<Vec<String>>,
    last_claim_scan: Mutex<Option<Instant>>,
}

impl RedisBroker {
    /// Connect with linear backoff. Exhausting the attempts returns
    /// [`QueueError::ConnectAttemptsExhausted`].
    pub async fn connect(config: BrokerConfig) -> QueueResult<Self> {
        let client = Client::open(config.url())?;
        let conn = Self::open_with_backoff(&client, &config).await?;

        info!(
            "Connected to broker {}:{} as '{}' in group '{}'",
            config.host, config.port, config.consumer_name, config.consumer_group
        );

        Ok(Self {
            client,
            conn: RwLock::new(conn),
            config,
            declared: Mutex::new(Vec::new()),
            last_claim_scan: Mutex::new(None),
        })
    }

    async fn open(client: &Client, config: &BrokerConfig) -> QueueResult<MultiplexedConnection> {
        let conn_config = AsyncConnectionConfig::new()
            .set_connection_timeout(config.socket_timeout)
            .set_response_timeout(config.blocked_connection_timeout);

        let mut conn = client
            .get_multiplexed_async_connection_with_config(&conn_config)
            .await?;
        redis::cmd("PING").query_async::<()>(&mut conn).await?;
        Ok(conn)
    }

    async fn open_with_backoff(client: &Client, config: &BrokerConfig) -> QueueResult<MultiplexedConnection> {
        match retry_linear(&config.backoff(), || Self::open(client, config)).await {
            RetryResult::Success(conn) => Ok(conn),
            RetryResult::Failed { error, attempts } => Err(QueueError::ConnectAttemptsExhausted {
                attempts,
                last_error: error.to_string(),
            }),
        }
    }

    async fn connection(&self) -> MultiplexedConnection {
        self.conn.read().await.clone()
    }

    fn to_delivery(queue: &str, entry: &StreamId) -> Delivery {
        Delivery {
            queue: queue.to_string(),
            tag: entry.id.clone(),
            // A foreign entry without a body is handed out empty and ends up
            // dead-lettered as unparseable.
            payload: entry.get::<Vec<u8>>(PAYLOAD_FIELD).unwrap_or_default(),
            attempt: entry.get::<u32>(ATTEMPT_FIELD).unwrap_or(1),
        }
    }

    /// Take over one entry another consumer left unsettled for longer than
    /// `claim_min_idle`.
    async fn claim_stale(&self, queue: &str) -> QueueResult<Option<Delivery>> {
        {
            let mut last = self.last_claim_scan.lock().await;
            if matches!(*last, Some(t) if t.elapsed() < CLAIM_SCAN_INTERVAL) {
                return Ok(None);
            }
            *last = Some(Instant::now());
        }

        let mut conn = self.connection().await;
        let min_idle_ms = self.config.claim_min_idle.as_millis() as u64;

        let pending: StreamPendingCountReply = redis::cmd("XPENDING")
            .arg(queue)
            .arg(&self.config.consumer_group)
            .arg("IDLE")
            .arg(min_idle_ms)
            .arg("-")
            .arg("+")
            .arg(1)
            .query_async(&mut conn)
            .await?;

        let Some(stale) = pending.ids.into_iter().next() else {
            return Ok(None);
        };

        let claimed: StreamClaimReply = redis::cmd("XCLAIM")
            .arg(queue)
            .arg(&self.config.consumer_group)
            .arg(&self.config.consumer_name)
            .arg(min_idle_ms)
            .arg(&stale.id)
            .query_async(&mut conn)
            .await?;

        // Another consumer may have claimed it first.
        let Some(entry) = claimed.ids.into_iter().next() else {
            return Ok(None);
        };

        warn!(
            queue = %queue,
            tag = %entry.id,
            previous_consumer = %stale.consumer,
            "Reclaimed delivery left unsettled for {}ms",
            stale.last_delivered_ms
        );
        Ok(Some(Self::to_delivery(queue, &entry)))
    }

}

#[async_trait]
impl MessageBroker for RedisBroker {
    async fn declare_durable_queue(&self, queue: &str) -> QueueResult<()> {
        let mut conn = self.connection().await;

        // Start the group at 0 so entries published before the first
        // consumer started are still delivered.
        let result: redis::RedisResult<()> = redis::cmd("XGROUP")
            .arg("CREATE")
            .arg(queue)
            .arg(&self.config.consumer_group)
            .arg("0")
            .arg("MKSTREAM")
            .query_async(&mut conn)
            .await;

        match result {
            Ok(()) => info!("Declared queue '{}' for group '{}'", queue, self.config.consumer_group),
            Err(e) if e.code() == Some("BUSYGROUP") => {
                debug!("Queue '{}' already declared", queue);
            }
            Err(e) => return Err(QueueError::Redis(e)),
        }

        let mut declared = self.declared.lock().await;
        if !declared.iter().any(|q| q == queue) {
            declared.push(queue.to_string());
        }
        Ok(())
    }

    async fn publish(&self, queue: &str, payload: &[u8]) -> QueueResult<()> {
        let mut conn = self.connection().await;

        let message_id: String = redis::cmd("XADD")
            .arg(queue)
            .arg("*")
            .arg(PAYLOAD_FIELD)
            .arg(payload)
            .arg(ATTEMPT_FIELD)
            .arg(1u32)
            .query_async(&mut conn)
            .await?;

        debug!(queue = %queue, tag = %message_id, "Published message");
        Ok(())
    }

    async fn fetch(&self, queue: &str) -> QueueResult<Option<Delivery>> {
        if let Some(delivery) = self.claim_stale(queue).await? {
            return Ok(Some(delivery));
        }

        let mut conn = self.connection().await;
        let options = StreamReadOptions::default()
            .group(&self.config.consumer_group, &self.config.consumer_name)
            .count(1)
            .block(self.config.poll_interval.as_millis() as usize);

        let reply: Option<StreamReadReply> = conn.xread_options(&[queue], &[">"], &options).await?;

        let delivery = reply
            .into_iter()
            .flat_map(|r| r.keys)
            .flat_map(|k| k.ids)
            .next()
            .map(|entry| Self::to_delivery(queue, &entry));

        if let Some(ref d) = delivery {
            debug!(queue = %queue, tag = %d.tag, attempt = d.attempt, "Fetched delivery");
        }
        Ok(delivery)
    }

    async fn ack(&self, delivery: &Delivery) -> QueueResult<()> {
        let mut conn = self.connection().await;

        let (acked,): (u64,) = redis::pipe()
            .atomic()
            .cmd("XACK")
            .arg(&delivery.queue)
            .arg(&self.config.consumer_group)
            .arg(&delivery.tag)
            .cmd("XDEL")
            .arg(&delivery.queue)
            .arg(&delivery.tag)
            .ignore()
            .query_async(&mut conn)
            .await?;

        if acked == 0 {
            return Err(QueueError::UnknownDelivery(delivery.tag.clone()));
        }

        debug!(queue = %delivery.queue, tag = %delivery.tag, "Acknowledged delivery");
        Ok(())
    }

    async fn nack(&self, delivery: &Delivery, requeue: bool) -> QueueResult<()> {
        let mut conn = self.connection().await;

        let (target, attempt) = if requeue {
            (delivery.queue.clone(), delivery.attempt.saturating_add(1))
        } else {
            (dead_letter_queue(&delivery.queue), delivery.attempt)
        };

        // Re-append and settle the original in one transaction so the
        // message is never lost or duplicated by a crash in between.
        let (acked,): (u64,) = redis::pipe()
            .atomic()
            .cmd("XADD")
            .arg(&target)
            .arg("*")
            .arg(PAYLOAD_FIELD)
            .arg(&delivery.payload)
            .arg(ATTEMPT_FIELD)
            .arg(attempt)
            .arg("original_id")
            .arg(&delivery.tag)
            .ignore()
            .cmd("XACK")
            .arg(&delivery.queue)
            .arg(&self.config.consumer_group)
            .arg(&delivery.tag)
            .cmd("XDEL")
            .arg(&delivery.queue)
            .arg(&delivery.tag)
            .ignore()
            .query_async(&mut conn)
            .await?;

        if acked == 0 {
            warn!(
                queue = %delivery.queue,
                tag = %delivery.tag,
                "Nack for a delivery that was no longer pending"
            );
        }

        if requeue {
            debug!(queue = %delivery.queue, tag = %delivery.tag, attempt, "Requeued delivery");
        } else {
            warn!(queue = %delivery.queue, tag = %delivery.tag, dead_letter = %target, "Dead-lettered delivery");
        }
        Ok(())
    }

    async fn touch(&self, delivery: &Delivery) -> QueueResult<()> {
        let mut conn = self.connection().await;

        // Only renew an entry this consumer still owns; one that was
        // reclaimed meanwhile belongs to someone else now.
        let owned: StreamPendingCountReply = redis::cmd("XPENDING")
            .arg(&delivery.queue)
            .arg(&self.config.consumer_group)
            .arg(&delivery.tag)
            .arg(&delivery.tag)
            .arg(1)
            .arg(&self.config.consumer_name)
            .query_async(&mut conn)
            .await?;

        if owned.ids.is_empty() {
            return Err(QueueError::UnknownDelivery(delivery.tag.clone()));
        }

        // Claiming with min-idle 0 resets the entry's idle time.
        let renewed: Vec<String> = redis::cmd("XCLAIM")
            .arg(&delivery.queue)
            .arg(&self.config.consumer_group)
            .arg(&self.config.consumer_name)
            .arg(0)
            .arg(&delivery.tag)
            .arg("JUSTID")
            .query_async(&mut conn)
            .await?;

        if renewed.is_empty() {
            return Err(QueueError::UnknownDelivery(delivery.tag.clone()));
        }

        debug!(queue = %delivery.queue, tag = %delivery.tag, "Renewed delivery lease");
        Ok(())
    }

    async fn queue_len(&self, queue: &str) -> QueueResult<u64> {
        let mut conn = self.connection().await;
        let len: u64 = conn.xlen(queue).await?;
        Ok(len)
    }

    async fn ping(&self) -> QueueResult<()> {
        let mut conn = self.connection().await;
        redis::cmd("PING").query_async::<()>(&mut conn).await?;
        Ok(())
    }

    async fn reconnect(&self) -> QueueResult<()> {
        warn!("Reconnecting to broker {}:{}", self.config.host, self.config.port);
        let conn = Self::open_with_backoff(&self.client, &self.config).await?;
        *self.conn.write().await = conn;

        let queues = self.declared.lock().await.clone();
        for queue in queues {
            self.declare_durable_queue(&queue).await?;
        }

        info!("Broker connection re-established");
        Ok(())
    }
}
