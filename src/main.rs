//! sw_cache - A caching reverse proxy with service-worker semantics
//!
//! Sits in front of an origin and answers page traffic the way a service
//! worker would: cache-first for routed paths, network for everything else.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use sw_cache::cache::SystemClock;
use sw_cache::{create_router, spawn_expiration_task, AppState, CacheWorker, Config, HttpFetcher};

/// Main entry point for the caching proxy.
///
/// # Startup Sequence
/// 1. Initialize tracing subscriber for logging
/// 2. Load configuration from environment variables
/// 3. Start the cache worker and open its partitions
/// 4. Start the background expiration sweep
/// 5. Serve the router until SIGINT/SIGTERM
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Defaults to "info" level, can be overridden with RUST_LOG env var
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "sw_cache=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting sw_cache proxy");

    let config = Config::from_env();
    info!(
        "Configuration loaded: origin={}, port={}, sweep_interval={}s, fetch_timeout={}s",
        config.upstream_origin, config.server_port, config.sweep_interval, config.fetch_timeout
    );

    let fetcher = HttpFetcher::new(Duration::from_secs(config.fetch_timeout))
        .context("failed to create HTTP client")?;
    let worker = CacheWorker::start(&config, Arc::new(fetcher), Arc::new(SystemClock))
        .await
        .context("failed to start cache worker")?;

    let sweep_handle = spawn_expiration_task(worker.store().clone(), config.sweep_interval);
    info!("Background expiration sweep started");

    let app = create_router(AppState::new(worker));

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server_port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    info!("Server listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(sweep_handle))
        .await
        .context("server error")?;

    info!("Server shutdown complete");
    Ok(())
}

/// Waits for shutdown signal (Ctrl+C or SIGTERM).
///
/// On shutdown signal, aborts the sweep task and allows graceful shutdown.
async fn shutdown_signal(sweep_handle: tokio::task::JoinHandle<()>) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to install Ctrl+C handler: {}", e);
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
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating shutdown...");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating shutdown...");
        }
    }

    sweep_handle.abort();
    warn!("Expiration sweep aborted");
}
