//! TaskHub Server — background job processing daemon.
//!
//! Main entry point: connects the job store, starts the worker pool and
//! cron scheduler, and stops them cooperatively on Ctrl+C or SIGTERM.

use std::sync::Arc;

use tracing_subscriber::{EnvFilter, fmt};

use taskhub::app;
use taskhub_core::config::AppConfig;
use taskhub_core::error::AppError;
use taskhub_database::{DatabasePool, JobStore};

#[tokio::main]
async fn main() {
    let env = std::env::var("TASKHUB_ENV").unwrap_or_else(|_| "development".to_string());
    let config = match AppConfig::load(&env) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    init_logging(&config);
    tracing::info!(env = %env, "Configuration loaded");

    if let Err(e) = run(config).await {
        tracing::error!("Server error: {}", e);
        std::process::exit(1);
    }
}

/// Initialize tracing/logging
fn init_logging(config: &AppConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.level));

    match config.logging.format.as_str() {
        "json" => {
            fmt()
                .json()
                .with_env_filter(filter)
                .with_target(true)
                .with_thread_ids(true)
                .init();
        }
        _ => {
            fmt()
                .pretty()
                .with_env_filter(filter)
                .with_target(true)
                .init();
        }
    }
}

/// Main server run function
async fn run(config: AppConfig) -> Result<(), AppError> {
    tracing::info!("Starting TaskHub v{}", env!("CARGO_PKG_VERSION"));

    // ── Step 1: Database connection + migrations ─────────────────
    let db = DatabasePool::connect(&config.database).await?;
    taskhub_database::migration::run_migrations(db.pool()).await?;

    // ── Step 2: Registries and background services ───────────────
    let store: Arc<dyn JobStore> = Arc::new(db.job_repository());
    let services = app::build_services(&config, store, app::job_registry());

    let worker_count = if config.worker.enabled {
        config.worker.concurrency
    } else {
        tracing::info!("Background worker disabled");
        0
    };
    services.start(worker_count).await?;

    // ── Step 3: Wait for a shutdown signal ───────────────────────
    shutdown_signal().await;
    tracing::info!("Shutdown signal received, starting graceful shutdown...");

    match services.shutdown(config.worker.shutdown_timeout()).await {
        Ok(()) => {}
        Err(e) if e.is_timeout() => {
            tracing::warn!("Background work still running at exit: {}", e);
        }
        Err(e) => tracing::error!("Shutdown error: {}", e),
    }

    db.close().await;
    tracing::info!("TaskHub server shut down");
    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
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
                tracing::error!("Failed to install SIGTERM handler: {}", e);
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
