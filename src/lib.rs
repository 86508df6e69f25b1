//! jobtagger -- category tagging and recent-execution tracking for job steps.
//!
//! This crate provides the category registry, the bounded execution history
//! with its latest-per-category projection, rename propagation for stored
//! job references, and the HTTP/CLI surfaces over them.

pub mod api;
pub mod category;
pub mod config;
pub mod jobs;
pub mod recorder;
pub mod registry;
pub mod rename;
pub mod step;
pub mod storage;
pub mod tracker;

use std::sync::Arc;

use anyhow::{Context, Result};

use crate::config::{AppConfig, LogFormat, LoggingConfig};
use crate::jobs::BaseUrlDirectory;
use crate::storage::SqliteDocuments;
use crate::tracker::Tracker;

/// Initialize the global tracing subscriber.
pub fn init_tracing(logging: &LoggingConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&logging.level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    let result = match logging.format {
        LogFormat::Json => builder.json().try_init(),
        LogFormat::Text => builder.try_init(),
    };
    if let Err(e) = result {
        eprintln!("tracing already initialized: {}", e);
    }
}

/// Open the database named by `config` and load all process-wide state.
pub fn open_tracker(config: &AppConfig) -> Result<Tracker> {
    tracing::info!(db_path = %config.storage.db_path, "Initializing database");
    let pool = storage::open_pool(&config.storage.db_path)
        .with_context(|| format!("failed to open database {}", config.storage.db_path))?;
    let documents = Arc::new(SqliteDocuments::new(pool));
    let jobs = Arc::new(BaseUrlDirectory::new(config.jobs.base_url.clone()));
    Tracker::open(documents, jobs)
}

/// Start the jobtagger daemon: serve the API over `tracker` until Ctrl-C.
pub async fn serve(tracker: Arc<Tracker>, bind: &str) -> Result<()> {
    let addr: std::net::SocketAddr = bind
        .parse()
        .with_context(|| format!("invalid bind address {}", bind))?;
    let app = api::router(api::state::AppState::new(tracker.clone()));

    tracing::info!(%addr, "jobtagger listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracker.flush().await?;
    tracing::info!("jobtagger stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "failed to listen for shutdown signal");
    }
}
