//! Audio extraction.

use std::path::{Path, PathBuf};
use std::time::Instant;

use async_trait::async_trait;
use tracing::{debug, info};
use vconv_models::env::{self, ConfigError, ConfigResult, Lookup};

use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::error::{MediaError, MediaResult};
use crate::probe::probe_media;

/// Result of a successful transcode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TranscodeOutcome {
    /// Encoded audio bytes.
    Audio(Vec<u8>),
    /// The source has no audio stream. Not an error.
    NoAudioTrack,
}

/// Turns source video bytes into audio bytes.
///
/// Implementations never touch the content store; any scratch files are
/// removed before `transcode` returns, whatever the result.
#[async_trait]
pub trait Transcoder: Send + Sync {
    async fn transcode(&self, source: &[u8]) -> MediaResult<TranscodeOutcome>;
}

/// Output encoding parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscodeSettings {
    /// FFmpeg audio encoder
    pub codec: String,
    /// Target bitrate, e.g. `192k`
    pub bitrate: String,
    /// Extension of the output file; selects the container
    pub extension: String,
}

impl Default for TranscodeSettings {
    fn default() -> Self {
        Self {
            codec: "libmp3lame".to_string(),
            bitrate: "192k".to_string(),
            extension: "mp3".to_string(),
        }
    }
}

impl TranscodeSettings {
    pub fn from_env() -> ConfigResult<Self> {
        Self::from_lookup(&env::process_env())
    }

    pub fn from_lookup(vars: &impl Lookup) -> ConfigResult<Self> {
        let defaults = Self::default();

        let bitrate = env::string_or(vars, "TRANSCODE_BITRATE", &defaults.bitrate);
        if !is_valid_bitrate(&bitrate) {
            return Err(ConfigError::invalid(
                "TRANSCODE_BITRATE",
                bitrate,
                "expected a number with an optional k or M suffix",
            ));
        }

        let extension = env::string_or(vars, "TRANSCODE_EXTENSION", &defaults.extension);
        if extension.is_empty() || !extension.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(ConfigError::invalid(
                "TRANSCODE_EXTENSION",
                extension,
                "expected a bare file extension",
            ));
        }

        Ok(Self {
            codec: env::string_or(vars, "TRANSCODE_CODEC", &defaults.codec),
            bitrate,
            extension,
        })
    }
}

fn is_valid_bitrate(s: &str) -> bool {
    let digits = s
        .strip_suffix(['k', 'K', 'M'])
        .unwrap_or(s);
    !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit())
}

/// [`Transcoder`] backed by the ffmpeg and ffprobe binaries.
#[derive(Debug, Clone, Default)]
pub struct FfmpegTranscoder {
    settings: TranscodeSettings,
    runner: FfmpegRunner,
    /// Parent of the per-call staging directories; the system temp dir if unset
    scratch_root: Option<PathBuf>,
}

impl FfmpegTranscoder {
    pub fn new(settings: TranscodeSettings) -> Self {
        Self {
            settings,
            runner: FfmpegRunner::new(),
            scratch_root: None,
        }
    }

    /// Stage files under `root` instead of the system temp dir.
    pub fn with_scratch_dir(mut self, root: impl AsRef<Path>) -> Self {
        self.scratch_root = Some(root.as_ref().to_path_buf());
        self
    }
}

#[async_trait]
impl Transcoder for FfmpegTranscoder {
    async fn transcode(&self, source: &[u8]) -> MediaResult<TranscodeOutcome> {
        let started = Instant::now();

        // Dropped on every return path, taking the staged files with it.
        let mut builder = tempfile::Builder::new();
        builder.prefix("vconv-");
        let scratch = match &self.scratch_root {
            Some(root) => builder.tempdir_in(root)?,
            None => builder.tempdir()?,
        };
        let source_path = scratch.path().join("source");
        tokio::fs::write(&source_path, source).await?;

        let info = probe_media(&source_path).await?;
        if !info.has_audio() {
            debug!(streams = info.streams.len(), "Source has no audio stream");
            return Ok(TranscodeOutcome::NoAudioTrack);
        }

        let output_path = scratch.path().join(format!("audio.{}", self.settings.extension));
        let cmd = FfmpegCommand::new(&source_path, &output_path)
            .no_video()
            .map("0:a:0")
            .audio_codec(self.settings.codec.as_str())
            .audio_bitrate(self.settings.bitrate.as_str());
        self.runner.run(&cmd).await?;

        let audio = tokio::fs::read(&output_path).await?;
        if audio.is_empty() {
            return Err(MediaError::ffmpeg_failed("FFmpeg produced no output", None, None));
        }

        let elapsed = started.elapsed();
        metrics::histogram!("vconv_transcode_duration_seconds").record(elapsed.as_secs_f64());
        info!(
            source_bytes = source.len(),
            audio_bytes = audio.len(),
            duration_ms = elapsed.as_millis() as u64,
            "Extracted audio"
        );

        Ok(TranscodeOutcome::Audio(audio))
    }
}
