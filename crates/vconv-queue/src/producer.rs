//! Job producer: store the upload, then enqueue its conversion.

use tracing::{error, info, warn};
use vconv_models::{JobMessage, Namespace};

use crate::context::PipelineContext;
use crate::error::{ProduceError, QueueError};

/// Accepts uploads on behalf of the API.
///
/// The source is always written before the job is published, so a consumer
/// can never see a job whose video does not exist. If the publish fails the
/// stored source is deleted again.
#[derive(Debug, Clone)]
pub struct JobProducer {
    context: PipelineContext,
}

impl JobProducer {
    pub fn new(context: PipelineContext) -> Self {
        Self { context }
    }

    /// Store `upload` in the videos namespace and publish a conversion job
    /// for `requester`. Returns the published job.
    pub async fn enqueue(&self, upload: Vec<u8>, requester: &str) -> Result<JobMessage, ProduceError> {
        let size = upload.len();
        let video_fid = self
            .context
            .store
            .put(Namespace::Videos, upload)
            .await
            .map_err(ProduceError::Store)?;

        let job = JobMessage::new(video_fid.clone(), requester);
        let published = match job.to_vec() {
            Ok(payload) => {
                self.context
                    .broker
                    .publish(&self.context.queues.jobs, &payload)
                    .await
            }
            Err(e) => Err(QueueError::from(e)),
        };

        if let Err(e) = published {
            warn!(
                video_fid = %video_fid,
                "Enqueue failed, removing stored upload: {}", e
            );
            if let Err(delete_err) = self.context.store.delete(Namespace::Videos, &video_fid).await {
                error!(
                    video_fid = %video_fid,
                    "Failed to remove upload after enqueue failure, blob is orphaned: {}",
                    delete_err
                );
            }
            return Err(ProduceError::Enqueue(e));
        }

        info!(
            video_fid = %video_fid,
            username = %requester,
            size_bytes = size,
            queue = %self.context.queues.jobs,
            "Enqueued conversion job"
        );
        Ok(job)
    }

    pub fn context(&self) -> &PipelineContext {
        &self.context
    }
}
