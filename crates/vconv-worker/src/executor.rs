//! Job executor.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use vconv_media::Transcoder;
use vconv_queue::{Delivery, JobConsumer, PipelineContext, QueueError, ReconnectSignal};

use crate::attempt::{Outcome, Settlement, SharedAttempt};
use crate::config::WorkerConfig;
use crate::error::{WorkerError, WorkerResult};
use crate::processor::JobProcessor;

/// Pause after an unexpected consume error.
const ERROR_BACKOFF: Duration = Duration::from_secs(1);

/// Consumes the job queue one delivery at a time.
///
/// Owns the broker connection: reconnects happen here, either when the
/// liveness supervisor asks for one or when a broker call fails with a
/// connection error. Shutdown and reconnect requests are only observed
/// between fetches.
pub struct JobExecutor {
    context: PipelineContext,
    processor: Arc<JobProcessor>,
    config: WorkerConfig,
    shutdown: watch::Sender<bool>,
}

impl JobExecutor {
    pub fn new(context: PipelineContext, transcoder: Arc<dyn Transcoder>, config: WorkerConfig) -> Self {
        let (shutdown, _) = watch::channel(false);
        let processor = Arc::new(JobProcessor::new(context.clone(), transcoder));

        Self {
            context,
            processor,
            config,
            shutdown,
        }
    }

    /// Sender that stops the executor when `true` is sent.
    pub fn shutdown_sender(&self) -> watch::Sender<bool> {
        self.shutdown.clone()
    }

    pub fn subscribe_shutdown(&self) -> watch::Receiver<bool> {
        self.shutdown.subscribe()
    }

    /// Run until shutdown. Returns an error only when the broker cannot be
    /// reached again; the process should exit.
    pub async fn run(&self, mut reconnect: watch::Receiver<ReconnectSignal>) -> WorkerResult<()> {
        self.context.declare_queues().await?;

        let mut consumer = JobConsumer::new(Arc::clone(&self.context.broker), self.context.queues.jobs.as_str());
        let shutdown_rx = self.shutdown.subscribe();
        let mut supervised = true;

        info!(
            "Consuming '{}', publishing completions to '{}'",
            self.context.queues.jobs, self.context.queues.completions
        );

        // Signals are checked between fetches, never raced against one: a
        // fetch dropped after the broker handed out an entry strands it until
        // the reclaim window passes. A fetch returns within the poll interval.
        while !*shutdown_rx.borrow() {
            if supervised {
                match reconnect.has_changed() {
                    Ok(true) => {
                        let generation = reconnect.borrow_and_update().generation;
                        warn!(generation, "Liveness supervisor requested reconnect");
                        self.reconnect(&mut consumer).await?;
                        continue;
                    }
                    Ok(false) => {}
                    Err(_) => {
                        warn!("Liveness supervisor stopped, continuing unsupervised");
                        supervised = false;
                    }
                }
            }

            match consumer.next().await {
                Ok(Some(delivery)) => {
                    if let Some(delay) = self.handle(&mut consumer, delivery).await? {
                        debug!("Pausing {:?} after requeue", delay);
                        tokio::time::sleep(delay).await;
                    }
                }
                Ok(None) => {}
                Err(e) if e.is_connection_failure() => {
                    warn!("Lost broker connection while fetching: {}", e);
                    self.reconnect(&mut consumer).await?;
                }
                Err(e) => {
                    error!("Error consuming jobs: {}", e);
                    tokio::time::sleep(ERROR_BACKOFF).await;
                }
            }
        }

        info!("Job executor stopped");
        Ok(())
    }

    /// Process and settle one delivery. Returns the pause to take before the
    /// next fetch when the delivery was requeued.
    async fn handle(&self, consumer: &mut JobConsumer, delivery: Delivery) -> WorkerResult<Option<Duration>> {
        let outcome = self.execute(consumer, &delivery).await;
        let settlement = outcome.settlement();

        metrics::counter!("vconv_jobs_total", "outcome" => outcome.label()).increment(1);
        match &outcome {
            Outcome::Failed { stage, error } => warn!(
                tag = %delivery.tag,
                attempt = delivery.attempt,
                "Requeueing after failure while {}: {}", stage, error
            ),
            Outcome::Panicked { error } => error!(
                tag = %delivery.tag,
                "Requeueing after processing panic: {}", error
            ),
            _ => {}
        }

        let settled = match settlement {
            Settlement::Ack => consumer.ack(&delivery).await,
            Settlement::Nack { requeue } => consumer.nack(&delivery, requeue).await,
        };

        if let Err(e) = settled {
            self.settlement_failed(consumer, &delivery, e).await?;
        }

        Ok(match settlement {
            Settlement::Nack { requeue: true } => Some(self.config.requeue_delay(delivery.attempt)),
            _ => None,
        })
    }

    /// Run the processor in its own task so a panic becomes an outcome
    /// instead of taking the consume loop down. The claim on the delivery is
    /// renewed every `lease_renewal` while the task runs.
    async fn execute(&self, consumer: &JobConsumer, delivery: &Delivery) -> Outcome {
        let attempt = SharedAttempt::received(delivery);
        let mut task = {
            let processor = Arc::clone(&self.processor);
            let delivery = delivery.clone();
            let attempt = attempt.clone();
            tokio::spawn(async move { processor.process(&delivery, &attempt).await })
        };

        let period = self.config.lease_renewal;
        let mut lease = tokio::time::interval_at(Instant::now() + period, period);
        lease.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let joined = loop {
            tokio::select! {
                joined = &mut task => break joined,
                _ = lease.tick() => {
                    if let Err(e) = consumer.touch(delivery).await {
                        warn!(tag = %delivery.tag, "Failed to renew delivery lease: {}", e);
                    }
                }
            }
        };

        match joined {
            Ok(outcome) => outcome,
            Err(e) => {
                // The task died before it could compensate.
                self.processor.compensate(&attempt.snapshot()).await;
                Outcome::Panicked {
                    error: e.to_string(),
                }
            }
        }
    }

    async fn settlement_failed(
        &self,
        consumer: &mut JobConsumer,
        delivery: &Delivery,
        e: QueueError,
    ) -> WorkerResult<()> {
        if e.is_connection_failure() {
            // The entry stays pending and is redelivered after reconnect.
            warn!(tag = %delivery.tag, "Lost broker connection while settling: {}", e);
            self.reconnect(consumer).await
        } else {
            error!(tag = %delivery.tag, "Failed to settle delivery: {}", e);
            Ok(())
        }
    }

    async fn reconnect(&self, consumer: &mut JobConsumer) -> WorkerResult<()> {
        consumer.abandon();
        self.context.broker.reconnect().await.map_err(|e| {
            error!("Broker reconnect failed: {}", e);
            WorkerError::from(e)
        })
    }
}
