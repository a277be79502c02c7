//! Startup orchestration.
//!
//! # Responsibilities
//! - Validate the final configuration (after CLI overrides)
//! - Install the metrics exporter when enabled
//! - Bind the listener and serve until a shutdown signal
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - The listener binds last, so traffic only arrives once everything else is ready

use std::net::SocketAddr;
use thiserror::Error;

use crate::config::validation::validate_config;
use crate::config::{ConfigError, ProxyConfig};
use crate::error::ProxyError;
use crate::http::ProxyServer;
use crate::lifecycle::{signals, Shutdown};
use crate::net::{Listener, ListenerError};
use crate::observability::metrics;

/// Fatal startup or serve failure.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("{0}")]
    Config(#[from] ConfigError),

    #[error("Invalid metrics address '{0}'")]
    MetricsAddress(String),

    #[error("Failed to start metrics exporter: {0}")]
    Metrics(#[from] metrics_exporter_prometheus::BuildError),

    #[error(transparent)]
    Listener(#[from] ListenerError),

    #[error("Server error: {0}")]
    Server(#[from] ProxyError),
}

/// Start every subsystem and serve until SIGINT/SIGTERM.
pub async fn run(config: ProxyConfig) -> Result<(), StartupError> {
    validate_config(&config).map_err(ConfigError::Validation)?;

    tracing::info!(
        bind_address = %config.listener.bind_address,
        max_connections = config.listener.max_connections,
        connect_timeout_secs = config.timeouts.connect_secs,
        close_mode = ?config.relay.close_mode,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        let addr: SocketAddr = config
            .observability
            .metrics_address
            .parse()
            .map_err(|_| {
                StartupError::MetricsAddress(config.observability.metrics_address.clone())
            })?;
        metrics::init_metrics(addr)?;
    }

    let listener = Listener::bind(&config.listener).await?;

    let shutdown = Shutdown::new();
    let receiver = shutdown.subscribe();
    tokio::spawn(async move {
        signals::wait_for_signal().await;
        shutdown.trigger();
    });

    ProxyServer::new(config).run(listener, receiver).await?;
    Ok(())
}
