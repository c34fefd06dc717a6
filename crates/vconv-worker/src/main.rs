//! Conversion worker binary.

use std::sync::Arc;

use metrics_exporter_prometheus::PrometheusBuilder;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use vconv_media::{FfmpegTranscoder, TranscodeSettings};
use vconv_queue::{
    retry_linear, BrokerConfig, LinearBackoff, LivenessSupervisor, PipelineContext, QueueNames,
    RedisBroker, RetryResult,
};
use vconv_storage::{connect_store, ContentStore, StoreConfig};
use vconv_worker::{JobExecutor, WorkerConfig, WorkerError, WorkerResult};

#[tokio::main]
async fn main() {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize tracing with colored output for dev, JSON for production
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let env_filter = EnvFilter::from_default_env()
        .add_directive("vconv=info".parse().unwrap());

    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_ansi(true)
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false),
            )
            .with(env_filter)
            .init();
    }

    info!("Starting vconv-worker");

    if let Err(e) = run().await {
        error!("Worker failed: {}", e);
        std::process::exit(1);
    }

    info!("Worker shutdown complete");
}

async fn run() -> WorkerResult<()> {
    let store_config = StoreConfig::from_env()?;
    let broker_config = BrokerConfig::from_env()?;
    let queues = QueueNames::from_env()?;
    let worker_config = WorkerConfig::from_env()?.fit_lease_to(broker_config.claim_min_idle);
    let settings = TranscodeSettings::from_env()?;
    info!("Worker config: {:?}, transcode: {:?}", worker_config, settings);

    if let Some(addr) = worker_config.metrics_addr {
        PrometheusBuilder::new()
            .with_http_listener(addr)
            .install()
            .map_err(|e| WorkerError::metrics(e.to_string()))?;
        info!("Prometheus metrics listening on {}", addr);
    }

    let store = connect_store(&store_config).await?;
    wait_for_store(store.as_ref(), &broker_config).await?;

    let broker = Arc::new(RedisBroker::connect(broker_config.clone()).await?);
    let context = PipelineContext::new(store, broker.clone(), queues);

    let executor = JobExecutor::new(
        context,
        Arc::new(FfmpegTranscoder::new(settings)),
        worker_config,
    );

    let (supervisor, reconnect_rx) =
        LivenessSupervisor::new(broker, &broker_config).spawn(executor.subscribe_shutdown());

    let shutdown = executor.shutdown_sender();
    tokio::spawn(async move {
        shutdown_signal().await;
        info!("Received shutdown signal, stopping after the current job");
        let _ = shutdown.send(true);
    });

    let result = executor.run(reconnect_rx).await;
    supervisor.abort();
    result
}

/// Block until the content store answers, paced like broker connects.
async fn wait_for_store(store: &dyn ContentStore, broker_config: &BrokerConfig) -> WorkerResult<()> {
    let policy = LinearBackoff::new("content store connectivity check")
        .with_max_attempts(broker_config.connect_attempts)
        .with_unit(broker_config.backoff_unit);

    match retry_linear(&policy, || store.check_connectivity()).await {
        RetryResult::Success(()) => Ok(()),
        RetryResult::Failed { error, attempts } => Err(WorkerError::StoreUnreachable {
            attempts,
            last_error: error.to_string(),
        }),
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for CTRL+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
