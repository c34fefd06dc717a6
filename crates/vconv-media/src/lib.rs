//! FFmpeg CLI wrapper for extracting audio from video.
//!
//! This crate provides:
//! - Type-safe FFmpeg command building
//! - Stream probing via ffprobe
//! - The [`Transcoder`] contract and its FFmpeg implementation

pub mod command;
pub mod error;
pub mod probe;
pub mod transcode;

pub use command::{check_ffmpeg, check_ffprobe, FfmpegCommand, FfmpegRunner};
pub use error::{MediaError, MediaResult};
pub use probe::{probe_media, MediaInfo, StreamInfo};
pub use transcode::{FfmpegTranscoder, TranscodeOutcome, TranscodeSettings, Transcoder};
