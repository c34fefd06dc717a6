//! Runs one delivery through the attempt state machine.

use std::sync::Arc;

use tracing::{error, info, warn, Instrument};
use vconv_media::{TranscodeOutcome, Transcoder};
use vconv_models::{JobMessage, Namespace};
use vconv_queue::{Delivery, PipelineContext};

use crate::attempt::{Attempt, Outcome, SharedAttempt, Stage};
use crate::error::WorkerResult;
use crate::logging::JobLogger;

/// Turns a delivered job into an [`Outcome`]. Never settles the delivery
/// itself; the executor does that from the outcome.
pub struct JobProcessor {
    context: PipelineContext,
    transcoder: Arc<dyn Transcoder>,
}

impl JobProcessor {
    pub fn new(context: PipelineContext, transcoder: Arc<dyn Transcoder>) -> Self {
        Self {
            context,
            transcoder,
        }
    }

    /// Process `delivery`, recording progress in `attempt`. A failed
    /// attempt is compensated before returning.
    pub async fn process(&self, delivery: &Delivery, attempt: &SharedAttempt) -> Outcome {
        let job = match JobMessage::from_slice(&delivery.payload) {
            Ok(job) => job,
            Err(e) => {
                warn!(
                    queue = %delivery.queue,
                    tag = %delivery.tag,
                    "Discarding unparseable job message: {}", e
                );
                return Outcome::Poison {
                    reason: e.to_string(),
                };
            }
        };

        let logger = JobLogger::new(&job.video_fid, delivery.attempt);
        let span = logger.create_span();

        async {
            logger.log_start(&format!("converting for {}", job.username));

            match self.run(&job, attempt, &logger).await {
                Ok(outcome) => {
                    match &outcome {
                        Outcome::Completed { mp3_fid } => {
                            logger.log_completion(&format!("mp3_fid={mp3_fid}"))
                        }
                        Outcome::NoAudio => logger.log_completion("source has no audio track"),
                        _ => {}
                    }
                    outcome
                }
                Err(e) => {
                    let failed = attempt.snapshot();
                    logger.log_error(&format!("failed while {}: {}", failed.stage, e));
                    self.compensate(&failed).await;
                    Outcome::Failed {
                        stage: failed.stage,
                        error: e.to_string(),
                    }
                }
            }
        }
        .instrument(span)
        .await
    }

    async fn run(&self, job: &JobMessage, attempt: &SharedAttempt, logger: &JobLogger) -> WorkerResult<Outcome> {
        // The source is fetched fresh on every delivery.
        attempt.enter(Stage::FetchingSource);
        let source = self
            .context
            .store
            .get(Namespace::Videos, &job.video_fid)
            .await?;

        attempt.enter(Stage::Transcoding);
        let audio = match self.transcoder.transcode(&source).await? {
            TranscodeOutcome::Audio(audio) => audio,
            TranscodeOutcome::NoAudioTrack => return Ok(Outcome::NoAudio),
        };
        logger.log_progress(&format!("extracted {} bytes of audio", audio.len()));

        attempt.enter(Stage::StoringAudio);
        let mp3_fid = self.context.store.put(Namespace::Mp3s, audio).await?;
        attempt.stored(mp3_fid.clone());

        attempt.enter(Stage::Publishing);
        let completion = job.completed(mp3_fid.clone());
        self.context
            .broker
            .publish(&self.context.queues.completions, &completion.to_vec()?)
            .await?;

        Ok(Outcome::Completed { mp3_fid })
    }

    /// Undo the side effects of an attempt that did not complete: a derived
    /// blob stored without its completion message is deleted.
    pub async fn compensate(&self, attempt: &Attempt) {
        let Some(mp3_fid) = &attempt.mp3_fid else {
            return;
        };

        match self.context.store.delete(Namespace::Mp3s, mp3_fid).await {
            Ok(()) => info!(tag = %attempt.tag, "Removed unpublished audio {}", mp3_fid),
            Err(e) => error!(
                tag = %attempt.tag,
                "Failed to remove unpublished audio {}, blob is orphaned: {}", mp3_fid, e
            ),
        }
    }
}
