//! Proxy server accept loop.
//!
//! # Responsibilities
//! - Accept connections from the bound listener
//! - Spawn one handler task per connection
//! - Keep accepting after per-connection accept errors
//! - Stop accepting on shutdown, then drain in-flight connections

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::broadcast;
use tracing::Instrument;

use crate::config::ProxyConfig;
use crate::error::ProxyError;
use crate::net::{ConnectionPermit, ConnectionTracker, Listener};
use crate::proxy::{handle_connection, HandlerContext};

/// Forward proxy server.
pub struct ProxyServer {
    config: ProxyConfig,
    context: Arc<HandlerContext>,
    tracker: ConnectionTracker,
}

impl ProxyServer {
    /// Create a new proxy server with the given configuration.
    pub fn new(config: ProxyConfig) -> Self {
        let context = Arc::new(HandlerContext::new(&config));
        Self {
            config,
            context,
            tracker: ConnectionTracker::new(),
        }
    }

    /// Run the server, accepting connections on the given listener.
    ///
    /// Returns once `shutdown` fires (or its sender is dropped) and the
    /// in-flight connections have drained or the grace period has elapsed.
    pub async fn run(
        self,
        listener: Listener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), ProxyError> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            max_connections = listener.max_connections(),
            "Forward proxy starting"
        );

        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    tracing::info!("Shutdown signal received, no longer accepting connections");
                    break;
                }
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer, permit)) => self.spawn_handler(stream, peer, permit),
                    Err(ProxyError::ListenerClosed) => break,
                    Err(err) => tracing::error!(error = %err, "Failed to accept connection"),
                }
            }
        }
        drop(listener);

        let grace = Duration::from_secs(self.config.timeouts.shutdown_grace_secs);
        if !self.tracker.wait_for_drain(grace).await {
            tracing::warn!(
                remaining = self.tracker.active_count(),
                "Shutdown grace period elapsed with connections still open"
            );
        }

        tracing::info!("Forward proxy stopped");
        Ok(())
    }

    fn spawn_handler(&self, stream: TcpStream, peer: SocketAddr, permit: ConnectionPermit) {
        let guard = self.tracker.track();
        let span = tracing::info_span!("connection", id = %guard.id(), peer = %peer);
        let context = Arc::clone(&self.context);

        tokio::spawn(
            async move {
                let _permit = permit;
                handle_connection(context, stream, guard).await;
            }
            .instrument(span),
        );
    }
}
