//! Startup orchestration.
//!
//! # Responsibilities
//! - Load and validate configuration
//! - Initialize logging and metrics
//! - Bind entry points and build the first handlers
//! - Start the config watcher and signal handler, then serve
//!
//! # Design Decisions
//! - Fail fast on config and metrics errors
//! - An entry point that cannot bind is not fatal; the rest still serve
//! - Entry points start forwarding only after the first rebuild

use std::net::SocketAddr;
use std::path::Path;

use thiserror::Error;

use crate::config::loader::{load_config, ConfigError};
use crate::config::watcher::ConfigWatcher;
use crate::lifecycle::{signals, Shutdown};
use crate::observability::{logging, metrics};
use crate::server::UdpServer;

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("failed to load configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("invalid metrics address {0:?}")]
    MetricsAddress(String),

    #[error("failed to start metrics exporter: {0}")]
    Metrics(#[from] metrics_exporter_prometheus::BuildError),

    #[error("failed to watch configuration file: {0}")]
    Watch(#[from] notify::Error),
}

/// Run the proxy from the config file at `path` until a termination signal.
pub async fn run(path: &Path) -> Result<(), StartupError> {
    let config = load_config(path)?;
    logging::init(&config.observability);

    tracing::info!(
        config = %path.display(),
        entry_points = config.entry_points.len(),
        routers = config.udp.routers.len(),
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        let address: SocketAddr = config
            .observability
            .metrics_address
            .parse()
            .map_err(|_| StartupError::MetricsAddress(config.observability.metrics_address.clone()))?;
        metrics::init_metrics(address)?;
    }

    let shutdown = Shutdown::new();
    let server = UdpServer::bind(&config).await;

    let (watcher, updates) = ConfigWatcher::new(path, Some(config));
    // Dropping the notify handle stops the watch.
    let _watch = watcher.run()?;

    signals::spawn_signal_handler(shutdown.clone());

    server.run(updates, shutdown.subscribe()).await;
    tracing::info!("Shutdown complete");
    Ok(())
}
