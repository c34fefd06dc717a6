//! Per-job log lines.

use tracing::{error, info, Span};
use vconv_models::BlobId;

/// Tags every event of one conversion with its `video_fid` and delivery
/// counter, so a job can be followed across redeliveries.
#[derive(Debug, Clone)]
pub struct JobLogger {
    video_fid: String,
    attempt: u32,
}

impl JobLogger {
    pub fn new(video_fid: &BlobId, attempt: u32) -> Self {
        Self {
            video_fid: video_fid.to_string(),
            attempt,
        }
    }

    pub fn log_start(&self, message: &str) {
        info!(video_fid = %self.video_fid, attempt = self.attempt, "Job started: {}", message);
    }

    pub fn log_progress(&self, message: &str) {
        info!(video_fid = %self.video_fid, attempt = self.attempt, "Job progress: {}", message);
    }

    pub fn log_error(&self, message: &str) {
        error!(video_fid = %self.video_fid, attempt = self.attempt, "Job failed: {}", message);
    }

    pub fn log_completion(&self, message: &str) {
        info!(video_fid = %self.video_fid, attempt = self.attempt, "Job completed: {}", message);
    }

    pub fn create_span(&self) -> Span {
        tracing::info_span!("job", video_fid = %self.video_fid, attempt = self.attempt)
    }
}
