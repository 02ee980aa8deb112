//! Task Queue Service
//!
//! HTTP ingestion plus the sharded worker pool in one process.
//!
//! ## Architecture
//!
//! ```text
//! POST /tasks
//!   ↓ (validate, crc32 shard, atomic Lua enqueue)
//! priority_queue:{shard} | delayed_queue:{shard}
//!   ↓ (DelayPromoter per shard moves due tasks)
//! ShardWorker per shard (BZPOPMAX)
//!   ↓ success | retry with backoff | dead_letter_queue
//! task_metrics hash + Prometheus counters
//! ```

pub mod api;

use axum::Router;
use core_config::{redis::RedisConfig, server::ServerConfig, Environment, FromEnv};
use eyre::{Result, WrapErr};
use std::sync::Arc;
use task_queue::{
    admin_router, init_metrics, AdminState, QueueConfig, QueueStore, RedisStore,
    SimulatedExecutor, TaskExecutor, TaskQueue,
};
use tokio::net::TcpListener;
use tokio::signal;
use tokio::sync::watch;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::{error, info, Level};

const APP_NAME: &str = env!("CARGO_PKG_NAME");
const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Full HTTP surface: ingestion, probes, metrics and dead letter inspection.
pub fn app<S, E>(queue: Arc<TaskQueue<S, E>>) -> Router
where
    S: QueueStore + 'static,
    E: TaskExecutor + 'static,
{
    let keys = &queue.config().keys;
    let admin = AdminState::new(
        queue.store().clone(),
        keys.metrics.clone(),
        keys.dead_letter.clone(),
        APP_NAME,
        APP_VERSION,
    );

    api::router(queue)
        .merge(admin_router(admin))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
}

/// Run the task queue service
///
/// 1. Sets up color-eyre, tracing and the Prometheus recorder
/// 2. Loads Redis, server and queue configuration from the environment
/// 3. Connects to Redis (fatal on failure)
/// 4. Starts one worker and one promoter per shard
/// 5. Serves HTTP until SIGINT/SIGTERM, then drains the queue loops
///
/// # Errors
///
/// Returns an error if configuration is invalid, Redis is unreachable at
/// startup or the HTTP listener cannot bind.
pub async fn run() -> Result<()> {
    core_config::tracing::install_color_eyre();
    let environment = Environment::from_env();
    core_config::tracing::init_tracing(&environment);

    init_metrics();

    info!(name = APP_NAME, version = APP_VERSION, "Starting task queue service");

    let redis_config = RedisConfig::from_env().wrap_err("Failed to load Redis configuration")?;
    let server_config = ServerConfig::from_env().wrap_err("Failed to load server configuration")?;
    let queue_config = QueueConfig::from_env().wrap_err("Failed to load queue configuration")?;
    info!(
        shards = queue_config.shards,
        max_attempts = queue_config.retry.max_attempts,
        backoff_initial_ms = queue_config.retry.backoff_initial.as_millis() as u64,
        backoff_factor = queue_config.retry.backoff_factor,
        "Queue configuration loaded"
    );

    info!("Connecting to Redis...");
    let store = RedisStore::connect(&redis_config.url)
        .await
        .wrap_err("Failed to connect to Redis")?;

    let grace = queue_config.shutdown_grace;
    let queue = Arc::new(
        TaskQueue::new(
            Arc::new(store),
            Arc::new(SimulatedExecutor::default()),
            queue_config,
        )
        .wrap_err("Invalid queue configuration")?,
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        shutdown_signal().await;
        let _ = shutdown_tx.send(true);
    });

    let processing = queue.process_tasks(shutdown_rx.clone());

    let addr = server_config.address();
    let listener = TcpListener::bind(&addr)
        .await
        .wrap_err_with(|| format!("Failed to bind HTTP server to {}", addr))?;
    info!(address = %addr, "HTTP server listening");

    let mut server_shutdown = shutdown_rx;
    axum::serve(listener, app(queue))
        .with_graceful_shutdown(async move {
            let _ = server_shutdown.wait_for(|stop| *stop).await;
        })
        .await
        .inspect_err(|e| error!(error = %e, "HTTP server failed"))
        .wrap_err("HTTP server failed")?;

    let aborted = processing.shutdown(grace).await;
    info!(aborted, "Task queue service stopped");
    Ok(())
}

/// Wait for SIGINT or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating shutdown...");
        },
        _ = terminate => {
            info!("Received SIGTERM, initiating shutdown...");
        },
    }
}
