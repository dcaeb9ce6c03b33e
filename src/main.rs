//! Herd Cache - admin server
//!
//! Runs a cache client against the configured store, its background tasks,
//! and the admin HTTP API.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use tokio::signal;
use tokio::sync::mpsc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use herd_cache::api::create_router;
use herd_cache::store::{self, spawn_invalidation_bridge, MemoryStore};
use herd_cache::{
    spawn_cleanup_task, spawn_invalidation_sink, spawn_refresh_task, AppState, CacheClient,
    Config, KvStore, RefreshSettings, TaskHandle,
};

/// Queued invalidation requests before the bridge waits on the sink.
const INVALIDATION_BUFFER: usize = 1024;

/// # Startup Sequence
/// 1. Initialize tracing subscriber for logging
/// 2. Load configuration from environment variables
/// 3. Connect the store and build the cache client
/// 4. Start the refresh scheduler, plus the invalidation bridge with Redis or
///    the expired-entry sweep without it
/// 5. Serve the admin API until SIGINT/SIGTERM
/// 6. Stop background tasks
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Defaults to "info" level, can be overridden with RUST_LOG env var
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "herd_cache=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Herd Cache");

    let config = Config::from_env();
    info!(
        "Configuration loaded: prefix={}, default_ttl={}s, lock_ttl={}s, port={}",
        config.key_prefix, config.default_ttl, config.lock_ttl, config.server_port
    );

    let mut tasks: Vec<TaskHandle> = Vec::new();
    let store: Arc<dyn KvStore> = if config.redis_url.is_some() {
        store::connect(&config)
            .await
            .context("failed to configure cache store")?
    } else {
        info!("REDIS_URL not set, using in-process store");
        let memory = Arc::new(MemoryStore::new());
        tasks.push(spawn_cleanup_task(memory.clone(), config.cleanup_interval()));
        memory
    };
    let cache = CacheClient::new(store, &config);
    info!(store = cache.store_name(), "Cache client initialized");

    tasks.push(spawn_refresh_task(
        cache.clone(),
        RefreshSettings::from_config(&config),
    ));

    if let Some(url) = config.redis_url.clone() {
        let (tx, rx) = mpsc::channel(INVALIDATION_BUFFER);
        tasks.push(spawn_invalidation_sink(cache.clone(), rx));
        tasks.push(spawn_invalidation_bridge(
            url,
            config.invalidation_channel.clone(),
            tx,
        ));
        info!(channel = %config.invalidation_channel, "Listening for fleet invalidations");
    }

    let app = create_router(AppState::new(cache));

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server_port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    info!("Server listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    for task in tasks {
        let name = task.name();
        task.shutdown().await;
        info!(task = name, "Background task stopped");
    }

    info!("Server shutdown complete");
    Ok(())
}

/// Waits for shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
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
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
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
}
