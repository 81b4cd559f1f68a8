//! Shopvault - cache and lock core of a community shop backend
//!
//! Serves the cache maintenance and shop HTTP API.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use shopvault::{
    create_router, run_maintenance, spawn_cleanup_task, AppState, CacheManager, Config, Database,
};

/// Main entry point for the shop server.
///
/// # Startup Sequence
/// 1. Initialize tracing subscriber for logging
/// 2. Load configuration from environment variables
/// 3. Open the SQLite database and apply the schema
/// 4. Build the cache and services, sweep leftovers from the last run
/// 5. Start background maintenance task
/// 6. Start HTTP server on configured port
/// 7. Handle graceful shutdown on SIGINT/SIGTERM, then sweep once more
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Defaults to "info" level, can be overridden with RUST_LOG env var
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "shopvault=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Shopvault server");

    let config = Config::from_env();
    info!(
        "Configuration loaded: database={}, default_ttl={}s, port={}, cleanup_interval={}s, lock_timeout={}s",
        config.database_path,
        config.default_ttl,
        config.server_port,
        config.cleanup_interval,
        config.lock_timeout
    );

    let db = Database::open(&config.database_path)
        .await
        .with_context(|| format!("failed to open database {}", config.database_path))?;
    db.init_schema().await.context("failed to initialize schema")?;

    let cache = Arc::new(CacheManager::sqlite(db.clone()).with_default_ttl(config.default_ttl()));
    let state = AppState::from_config(db, cache.clone(), &config);
    let registries = state.registries();

    let (report, _) = run_maintenance(&cache, &registries).await;
    info!(
        "Startup cleanup removed {} memory and {:?} durable entries",
        report.memory_removed, report.durable_removed
    );

    let cleanup_handle = spawn_cleanup_task(
        cache.clone(),
        registries.clone(),
        Duration::from_secs(config.cleanup_interval),
    );
    info!("Background maintenance task started");

    let app = create_router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server_port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    info!("Server listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(cleanup_handle))
        .await
        .context("server error")?;

    run_maintenance(&cache, &registries).await;
    for registry in &registries {
        registry.cleanup();
    }
    info!("Server shutdown complete");
    Ok(())
}

/// Waits for shutdown signal (Ctrl+C or SIGTERM).
///
/// On shutdown signal, aborts the maintenance task and allows graceful shutdown.
async fn shutdown_signal(cleanup_handle: tokio::task::JoinHandle<()>) {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", err);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                warn!("Failed to install SIGTERM handler: {}", err);
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
