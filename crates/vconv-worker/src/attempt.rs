//! One processing attempt of one delivery.
//!
//! ```text
//! Received -> FetchingSource -> Transcoding -> StoringAudio -> Publishing
//!     |             |                |               |             |
//!   Poison        Failed     NoAudio | Failed      Failed    Completed | Failed
//! ```
//!
//! The [`Outcome`] of an attempt fully determines how its delivery is
//! settled; see [`Outcome::settlement`].

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

use vconv_models::BlobId;
use vconv_queue::Delivery;

/// How far an attempt got.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Received,
    FetchingSource,
    Transcoding,
    StoringAudio,
    Publishing,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Received => "received",
            Stage::FetchingSource => "fetching_source",
            Stage::Transcoding => "transcoding",
            Stage::StoringAudio => "storing_audio",
            Stage::Publishing => "publishing",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Progress record carried through the state machine. Compensation reads
/// `mp3_fid` to undo a stored-but-unpublished derived blob.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attempt {
    pub tag: String,
    /// Delivery counter of the message being processed
    pub delivery_attempt: u32,
    pub stage: Stage,
    pub mp3_fid: Option<BlobId>,
}

impl Attempt {
    pub fn received(delivery: &Delivery) -> Self {
        Self {
            tag: delivery.tag.clone(),
            delivery_attempt: delivery.attempt,
            stage: Stage::Received,
            mp3_fid: None,
        }
    }

    pub fn enter(&mut self, stage: Stage) {
        self.stage = stage;
    }
}

/// An [`Attempt`] shared between the processing task and the executor.
///
/// The executor keeps a handle, so the record of a stored derived blob is
/// still readable after the processing task panicked.
#[derive(Debug, Clone)]
pub struct SharedAttempt(Arc<Mutex<Attempt>>);

impl SharedAttempt {
    pub fn received(delivery: &Delivery) -> Self {
        Self(Arc::new(Mutex::new(Attempt::received(delivery))))
    }

    pub fn enter(&self, stage: Stage) {
        self.lock().enter(stage);
    }

    pub fn stored(&self, mp3_fid: BlobId) {
        self.lock().mp3_fid = Some(mp3_fid);
    }

    pub fn snapshot(&self) -> Attempt {
        self.lock().clone()
    }

    // Never held across an await or a call that can panic, so a poisoned
    // lock still holds a consistent record.
    fn lock(&self) -> MutexGuard<'_, Attempt> {
        self.0.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Terminal state of an attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Audio stored and the completion message published.
    Completed { mp3_fid: BlobId },
    /// The source has no audio. Terminal, not an error.
    NoAudio,
    /// The body is not a job message. Never retried.
    Poison { reason: String },
    /// Infrastructure or processing failure at `stage`. Retried.
    Failed { stage: Stage, error: String },
    /// The processing task panicked. Retried.
    Panicked { error: String },
}

/// How a delivery is settled with the broker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Settlement {
    Ack,
    Nack { requeue: bool },
}

impl Outcome {
    pub fn settlement(&self) -> Settlement {
        match self {
            Outcome::Completed { .. } | Outcome::NoAudio => Settlement::Ack,
            Outcome::Poison { .. } => Settlement::Nack { requeue: false },
            Outcome::Failed { .. } | Outcome::Panicked { .. } => Settlement::Nack { requeue: true },
        }
    }

    /// Metric label.
    pub fn label(&self) -> &'static str {
        match self {
            Outcome::Completed { .. } => "completed",
            Outcome::NoAudio => "no_audio",
            Outcome::Poison { .. } => "poison",
            Outcome::Failed { .. } => "failed",
            Outcome::Panicked { .. } => "panicked",
        }
    }
}
