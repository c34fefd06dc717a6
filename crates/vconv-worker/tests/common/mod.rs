//! Worker test harness: the executor wired to in-memory backends.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use vconv_media::{MediaError, MediaResult, TranscodeOutcome, Transcoder};
use vconv_models::{BlobId, JobMessage, Namespace};
use vconv_queue::{
    Delivery, JobProducer, MemoryBroker, MessageBroker, PipelineContext, QueueNames, QueueResult,
    ReconnectSignal,
};
use vconv_storage::{ContentStore, MemoryBlobStore, StorageError, StorageResult};
use vconv_worker::{JobExecutor, WorkerConfig, WorkerResult};

/// Poll an async condition until it holds, failing the test after 10s.
macro_rules! eventually {
    ($cond:expr) => {
        tokio::time::timeout(std::time::Duration::from_secs(10), async {
            loop {
                if $cond {
                    break;
                }
                tokio::time::sleep(std::time::Duration::from_millis(10)).await;
            }
        })
        .await
        .expect(concat!("timed out waiting for: ", stringify!($cond)))
    };
}

/// Memory store whose audio writes can be made to fail, or to panic right
/// after the blob was written.
#[derive(Default)]
pub struct FlakyStore {
    pub inner: MemoryBlobStore,
    fail_audio_puts: AtomicBool,
    pub audio_put_failures: AtomicU32,
    panics_after_audio_put: AtomicU32,
}

impl FlakyStore {
    pub fn fail_audio_puts(&self, fail: bool) {
        self.fail_audio_puts.store(fail, Ordering::SeqCst);
    }

    pub fn panic_after_audio_puts(&self, times: u32) {
        self.panics_after_audio_put.store(times, Ordering::SeqCst);
    }
}

#[async_trait]
impl ContentStore for FlakyStore {
    async fn put(&self, namespace: Namespace, data: Vec<u8>) -> StorageResult<BlobId> {
        if namespace == Namespace::Mp3s && self.fail_audio_puts.load(Ordering::SeqCst) {
            self.audio_put_failures.fetch_add(1, Ordering::SeqCst);
            return Err(StorageError::upload_failed("injected write failure"));
        }
        let id = self.inner.put(namespace, data).await?;
        if namespace == Namespace::Mp3s && take_one(&self.panics_after_audio_put) {
            panic!("store blew up after writing {id}");
        }
        Ok(id)
    }

    async fn get(&self, namespace: Namespace, id: &BlobId) -> StorageResult<Vec<u8>> {
        self.inner.get(namespace, id).await
    }

    async fn delete(&self, namespace: Namespace, id: &BlobId) -> StorageResult<()> {
        self.inner.delete(namespace, id).await
    }

    async fn check_connectivity(&self) -> StorageResult<()> {
        Ok(())
    }
}

/// Transcoder double. Sources starting with `silent` have no audio; any
/// other source becomes `mp3:` followed by the source bytes.
#[derive(Default)]
pub struct FakeTranscoder {
    failures_left: AtomicU32,
    panics_left: AtomicU32,
    delay: Duration,
    pub calls: AtomicU32,
}

impl FakeTranscoder {
    pub fn failing(times: u32) -> Self {
        let t = Self::default();
        t.failures_left.store(times, Ordering::SeqCst);
        t
    }

    pub fn panicking(times: u32) -> Self {
        let t = Self::default();
        t.panics_left.store(times, Ordering::SeqCst);
        t
    }

    /// Every transcode takes `delay`.
    pub fn slow(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::default()
        }
    }
}

fn take_one(counter: &AtomicU32) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

#[async_trait]
impl Transcoder for FakeTranscoder {
    async fn transcode(&self, source: &[u8]) -> MediaResult<TranscodeOutcome> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        if source.starts_with(b"silent") {
            return Ok(TranscodeOutcome::NoAudioTrack);
        }
        if take_one(&self.panics_left) {
            panic!("transcoder blew up");
        }
        if take_one(&self.failures_left) {
            return Err(MediaError::ffmpeg_failed("injected failure", None, Some(1)));
        }
        Ok(TranscodeOutcome::Audio([b"mp3:".as_slice(), source].concat()))
    }
}

/// Broker whose fetch replies arrive `reply_delay` after the entry was
/// handed out.
pub struct SlowReplyBroker {
    pub inner: Arc<MemoryBroker>,
    pub reply_delay: Duration,
}

#[async_trait]
impl MessageBroker for SlowReplyBroker {
    async fn declare_durable_queue(&self, queue: &str) -> QueueResult<()> {
        self.inner.declare_durable_queue(queue).await
    }

    async fn publish(&self, queue: &str, payload: &[u8]) -> QueueResult<()> {
        self.inner.publish(queue, payload).await
    }

    async fn fetch(&self, queue: &str) -> QueueResult<Option<Delivery>> {
        let delivery = self.inner.fetch(queue).await?;
        if delivery.is_some() {
            tokio::time::sleep(self.reply_delay).await;
        }
        Ok(delivery)
    }

    async fn ack(&self, delivery: &Delivery) -> QueueResult<()> {
        self.inner.ack(delivery).await
    }

    async fn nack(&self, delivery: &Delivery, requeue: bool) -> QueueResult<()> {
        self.inner.nack(delivery, requeue).await
    }

    async fn touch(&self, delivery: &Delivery) -> QueueResult<()> {
        self.inner.touch(delivery).await
    }

    async fn queue_len(&self, queue: &str) -> QueueResult<u64> {
        self.inner.queue_len(queue).await
    }

    async fn ping(&self) -> QueueResult<()> {
        self.inner.ping().await
    }

    async fn reconnect(&self) -> QueueResult<()> {
        self.inner.reconnect().await
    }
}

pub fn memory_broker() -> Arc<MemoryBroker> {
    Arc::new(MemoryBroker::new().with_poll_interval(Duration::from_millis(20)))
}

pub fn test_config() -> WorkerConfig {
    WorkerConfig {
        requeue_backoff: Duration::from_millis(1),
        max_requeue_backoff: Duration::from_millis(5),
        lease_renewal: Duration::from_millis(20),
        metrics_addr: None,
    }
}

/// An executor running on its own task.
pub struct RunningExecutor {
    shutdown: watch::Sender<bool>,
    pub reconnect: watch::Sender<ReconnectSignal>,
    handle: JoinHandle<WorkerResult<()>>,
}

impl RunningExecutor {
    fn spawn(context: PipelineContext, transcoder: Arc<dyn Transcoder>) -> Self {
        let executor = JobExecutor::new(context, transcoder, test_config());
        let shutdown = executor.shutdown_sender();
        let (reconnect, reconnect_rx) = watch::channel(ReconnectSignal::default());
        let handle = tokio::spawn(async move { executor.run(reconnect_rx).await });

        Self {
            shutdown,
            reconnect,
            handle,
        }
    }

    pub fn request_shutdown(&self) {
        let _ = self.shutdown.send(true);
    }

    pub async fn stop(self) -> WorkerResult<()> {
        self.request_shutdown();
        self.join().await
    }

    pub async fn join(self) -> WorkerResult<()> {
        tokio::time::timeout(Duration::from_secs(5), self.handle)
            .await
            .expect("executor did not exit")
            .expect("executor task panicked")
    }
}

/// A running executor plus handles on everything around it.
pub struct Pipeline {
    pub store: Arc<FlakyStore>,
    pub broker: Arc<MemoryBroker>,
    pub producer: JobProducer,
    pub queues: QueueNames,
    pub executor: RunningExecutor,
    context: PipelineContext,
}

impl Pipeline {
    pub fn start(transcoder: Arc<dyn Transcoder>) -> Self {
        let broker = memory_broker();
        Self::start_with(transcoder, broker.clone(), broker)
    }

    /// `broker` is inspected by the test; the executor talks to `wire`,
    /// which may wrap it.
    pub fn start_with(
        transcoder: Arc<dyn Transcoder>,
        broker: Arc<MemoryBroker>,
        wire: Arc<dyn MessageBroker>,
    ) -> Self {
        let store = Arc::new(FlakyStore::default());
        let queues = QueueNames::default();
        let context = PipelineContext::new(store.clone(), wire, queues.clone());

        let producer = JobProducer::new(context.clone());
        let executor = RunningExecutor::spawn(context.clone(), transcoder);

        Self {
            store,
            broker,
            producer,
            queues,
            executor,
            context,
        }
    }

    /// Another executor on the same store and broker.
    pub fn spawn_executor(&self, transcoder: Arc<dyn Transcoder>) -> RunningExecutor {
        RunningExecutor::spawn(self.context.clone(), transcoder)
    }

    pub async fn submit(&self, video: &[u8]) -> JobMessage {
        self.producer
            .enqueue(video.to_vec(), "alice@example.com")
            .await
            .expect("enqueue failed")
    }

    pub async fn completions(&self) -> Vec<JobMessage> {
        self.broker
            .ready(&self.queues.completions)
            .await
            .iter()
            .map(|d| JobMessage::from_slice(&d.payload).expect("bad completion message"))
            .collect()
    }

    /// No job waiting and none in flight.
    pub async fn is_idle(&self) -> bool {
        self.broker.queue_len(&self.queues.jobs).await.unwrap_or(1) == 0
            && self.broker.unacked_len(&self.queues.jobs).await == 0
    }

    pub async fn audio_blobs(&self) -> Vec<BlobId> {
        self.store.inner.ids(Namespace::Mp3s).await
    }

    pub async fn stop(self) -> WorkerResult<()> {
        self.executor.stop().await
    }

    pub async fn join(self) -> WorkerResult<()> {
        self.executor.join().await
    }
}
