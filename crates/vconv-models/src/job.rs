//! Job and completion message schema.

use serde::{Deserialize, Serialize};

use crate::blob::BlobId;

/// Message carried on the job queue and, with `mp3_fid` populated, on the
/// completion queue.
///
/// A job is identified by its `video_fid` for the lifetime of one conversion
/// attempt; redeliveries carry the same body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct JobMessage {
    /// Source blob in the videos namespace.
    pub video_fid: BlobId,
    /// Derived blob in the mp3s namespace; `None` until completion.
    pub mp3_fid: Option<BlobId>,
    /// Requester identity as validated by the auth collaborator.
    pub username: String,
}

impl JobMessage {
    /// Create a job for a freshly stored source blob.
    pub fn new(video_fid: BlobId, username: impl Into<String>) -> Self {
        Self {
            video_fid,
            mp3_fid: None,
            username: username.into(),
        }
    }

    /// Build the completion message for this job. The original is left
    /// untouched.
    pub fn completed(&self, mp3_fid: BlobId) -> Self {
        Self {
            video_fid: self.video_fid.clone(),
            mp3_fid: Some(mp3_fid),
            username: self.username.clone(),
        }
    }

    /// Parse a queue payload.
    pub fn from_slice(payload: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(payload)
    }

    /// Serialize for publishing.
    pub fn to_vec(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(self)
    }
}
