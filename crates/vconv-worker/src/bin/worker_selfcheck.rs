use std::path::Path;
use std::process::Command;

use anyhow::Context;
use vconv_media::{check_ffmpeg, check_ffprobe, TranscodeSettings};
use vconv_queue::{BrokerConfig, QueueNames};
use vconv_storage::StoreConfig;
use vconv_worker::WorkerConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    println!("worker-selfcheck: starting");

    StoreConfig::from_env().context("content store configuration")?;
    BrokerConfig::from_env().context("broker configuration")?;
    QueueNames::from_env().context("queue configuration")?;
    WorkerConfig::from_env().context("worker configuration")?;
    let settings = TranscodeSettings::from_env().context("transcode configuration")?;

    ensure_runs(&check_ffmpeg()?, "-version")?;
    ensure_runs(&check_ffprobe()?, "-version")?;
    ensure_encoder(&settings.codec)?;
    ensure_scratch_writable().await?;

    println!("worker-selfcheck: ok");
    Ok(())
}

fn ensure_runs(binary: &Path, arg: &str) -> anyhow::Result<()> {
    let output = Command::new(binary)
        .arg(arg)
        .output()
        .map_err(|e| anyhow::anyhow!("{} not runnable: {}", binary.display(), e))?;

    if !output.status.success() {
        return Err(anyhow::anyhow!(
            "{} {} failed: {:?}",
            binary.display(),
            arg,
            output.status
        ));
    }
    Ok(())
}

fn ensure_encoder(codec: &str) -> anyhow::Result<()> {
    let output = Command::new("ffmpeg")
        .args(["-hide_banner", "-encoders"])
        .output()
        .context("listing ffmpeg encoders")?;

    let listing = String::from_utf8_lossy(&output.stdout);
    if !listing.split_whitespace().any(|word| word == codec) {
        return Err(anyhow::anyhow!("ffmpeg has no '{}' encoder", codec));
    }
    Ok(())
}

async fn ensure_scratch_writable() -> anyhow::Result<()> {
    let scratch_file = std::env::temp_dir().join(format!("vconv-selfcheck-{}", std::process::id()));
    tokio::fs::write(&scratch_file, b"ok")
        .await
        .with_context(|| format!("writing {}", scratch_file.display()))?;
    tokio::fs::remove_file(&scratch_file).await?;
    Ok(())
}
