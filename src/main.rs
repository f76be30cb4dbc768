//! Weather Cache - weather data cache server
//!
//! Serves weather reads through the refresh coordinator over HTTP.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use weather_cache::api::{create_router, AppState};
use weather_cache::cache::{CacheStore, FileStore, MemoryStore};
use weather_cache::clock::{Clock, SystemClock};
use weather_cache::upstream::OpenMeteoFetcher;
use weather_cache::{spawn_cleanup_task, Config, RefreshCoordinator};

/// Main entry point for the weather cache server.
///
/// # Startup Sequence
/// 1. Initialize tracing subscriber for logging
/// 2. Load configuration from environment variables
/// 3. Open the cache store (durable when `CACHE_DIR` is set)
/// 4. Build the upstream fetcher and refresh coordinator
/// 5. Start background maintenance task
/// 6. Start HTTP server on configured port
/// 7. Handle graceful shutdown on SIGINT/SIGTERM
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Defaults to "info" level, can be overridden with RUST_LOG env var
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "weather_cache=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Weather Cache Server");

    let config = Config::from_env();
    info!(
        "Configuration loaded: ttl={}s, fetch_timeout={}ms, max_retries={}, rate_limit={}/{}ms, port={}",
        config.ttl_seconds,
        config.fetch_timeout_ms,
        config.max_retries,
        config.rate_limit_per_key,
        config.rate_limit_window_ms,
        config.server_port
    );

    let store: Arc<dyn CacheStore> = match &config.cache_dir {
        Some(dir) => {
            let store = FileStore::open(dir)
                .with_context(|| format!("opening cache directory {}", dir.display()))?;
            info!("Durable cache store at {}", dir.display());
            Arc::new(store)
        }
        None => {
            info!("In-memory cache store");
            Arc::new(MemoryStore::new())
        }
    };

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    // The client bound sits above the coordinator's per-attempt bound.
    let fetcher = OpenMeteoFetcher::new(
        config.weather_api_url.clone(),
        config.geocoding_api_url.clone(),
        Duration::from_millis(config.fetch_timeout_ms.saturating_mul(2)),
        clock.clone(),
    )
    .context("building upstream client")?;

    let coordinator = RefreshCoordinator::from_config(&config, store, Arc::new(fetcher), clock);

    let cleanup_handle = spawn_cleanup_task(
        coordinator.clone(),
        config.cleanup_interval,
        config.stale_retention_secs,
    );
    info!("Background maintenance task started");

    let app = create_router(AppState::new(coordinator));

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server_port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {}", addr))?;
    info!("Server listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(cleanup_handle))
        .await
        .context("serving HTTP")?;

    info!("Server shutdown complete");
    Ok(())
}

/// Waits for shutdown signal (Ctrl+C or SIGTERM).
///
/// On shutdown signal, aborts the maintenance task and allows graceful shutdown.
async fn shutdown_signal(cleanup_handle: tokio::task::JoinHandle<()>) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
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

    cleanup_handle.abort();
    warn!("Maintenance task aborted");
}
