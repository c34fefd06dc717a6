//! Axum API server binary.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::Context;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use vconv_api::{create_router, metrics, ApiConfig, AppState, AuthServiceClient};
use vconv_queue::{
    retry_linear, BrokerConfig, LinearBackoff, LivenessSupervisor, MessageBroker, PipelineContext,
    QueueNames, RedisBroker, ReconnectSignal, RetryResult,
};
use vconv_storage::{connect_store, StoreConfig};

#[tokio::main]
async fn main() {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Install rustls crypto provider (required for rustls 0.23+)
    if rustls::crypto::ring::default_provider().install_default().is_err() {
        eprintln!("rustls crypto provider was already installed");
    }

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

    info!("Starting vconv-api");

    if let Err(e) = run().await {
        error!("API server failed: {:#}", e);
        std::process::exit(1);
    }

    info!("Server shutdown complete");
}

async fn run() -> anyhow::Result<()> {
    let config = ApiConfig::from_env()?;
    let store_config = StoreConfig::from_env()?;
    let broker_config = BrokerConfig::from_env()?;
    let queues = QueueNames::from_env()?;
    info!("API config: host={}, port={}", config.host, config.port);

    let metrics_handle = if config.metrics_enabled {
        info!("Prometheus metrics enabled at /metrics");
        Some(metrics::init_metrics().context("failed to install Prometheus recorder")?)
    } else {
        None
    };

    let store = connect_store(&store_config).await?;
    let policy = LinearBackoff::new("content store connectivity check")
        .with_max_attempts(broker_config.connect_attempts)
        .with_unit(broker_config.backoff_unit);
    if let RetryResult::Failed { error, attempts } = retry_linear(&policy, || store.check_connectivity()).await {
        anyhow::bail!("content store unreachable after {} attempts: {}", attempts, error);
    }

    let broker = Arc::new(RedisBroker::connect(broker_config.clone()).await?);
    let context = PipelineContext::new(store, broker.clone(), queues);
    context.declare_queues().await?;

    let validator = Arc::new(AuthServiceClient::new(&config)?);
    let state = AppState::new(config.clone(), context, validator);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let (supervisor, reconnect_rx) =
        LivenessSupervisor::new(broker.clone(), &broker_config).spawn(shutdown_rx.clone());
    let broker_lost = Arc::new(AtomicBool::new(false));
    let reconnector = spawn_reconnector(broker, reconnect_rx, shutdown_tx.clone(), broker_lost.clone());

    tokio::spawn(async move {
        shutdown_signal().await;
        info!("Received shutdown signal");
        let _ = shutdown_tx.send(true);
    });

    let app = create_router(state, metrics_handle);
    let addr = config.bind_address();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    info!("Listening on {}", addr);

    let mut serve_shutdown = shutdown_rx;
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = serve_shutdown.wait_for(|stop| *stop).await;
        })
        .await?;

    supervisor.abort();
    reconnector.abort();

    if broker_lost.load(Ordering::SeqCst) {
        anyhow::bail!("broker connection lost and could not be re-established");
    }
    Ok(())
}

/// Sole owner of broker reconnection. A failed reconnect stops the server.
fn spawn_reconnector(
    broker: Arc<RedisBroker>,
    mut signals: watch::Receiver<ReconnectSignal>,
    shutdown: watch::Sender<bool>,
    broker_lost: Arc<AtomicBool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while signals.changed().await.is_ok() {
            let generation = signals.borrow_and_update().generation;
            warn!(generation, "Broker liveness check failed, reconnecting");
            if let Err(e) = broker.reconnect().await {
                error!("Broker reconnect failed: {}", e);
                broker_lost.store(true, Ordering::SeqCst);
                let _ = shutdown.send(true);
                break;
            }
        }
    })
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
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
