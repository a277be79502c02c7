//! Per-connection handling.
//!
//! # Data Flow
//! ```text
//! read first request head
//!     ├─ malformed → close (optionally 400)
//!     └─ parsed → resolve target → dial
//!           ├─ dial failed → 503 → close
//!           ├─ CONNECT → 200 Connection Established → relay
//!           └─ other   → write request → relay
//!                 └─ forward failed → 503 → close
//! ```
//!
//! Only the first request on a connection is inspected. After that the
//! proxy is a byte pipe, so pipelined or keep-alive requests go to the
//! same target.

use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;

use crate::config::ProxyConfig;
use crate::error::ProxyError;
use crate::http::request::{ParsedRequest, RequestKind, RequestReader};
use crate::http::response;
use crate::net::connection::{ConnectionGuard, ConnectionState};
use crate::observability::metrics;
use crate::proxy::forward::forward_request;
use crate::proxy::relay::Relay;
use crate::proxy::tunnel::establish_tunnel;
use crate::upstream::TargetDialer;

/// Shared, read-only state every connection handler needs.
#[derive(Debug, Clone)]
pub struct HandlerContext {
    reader: RequestReader,
    dialer: TargetDialer,
    relay: Relay,
    reject_malformed: bool,
}

impl HandlerContext {
    pub fn new(config: &ProxyConfig) -> Self {
        Self {
            reader: RequestReader::new(&config.http),
            dialer: TargetDialer::new(Duration::from_secs(config.timeouts.connect_secs)),
            relay: Relay::new(&config.relay),
            reject_malformed: config.http.reject_malformed,
        }
    }
}

/// Serve one accepted client connection to completion.
///
/// Never returns an error: every failure ends in a response or a close,
/// and the client socket is closed on every path.
pub async fn handle_connection(
    ctx: Arc<HandlerContext>,
    client: TcpStream,
    mut guard: ConnectionGuard,
) {
    metrics::record_connection_opened();
    serve(&ctx, client, &mut guard).await;
    guard.transition(ConnectionState::Closed);
    metrics::record_connection_closed();
    tracing::debug!("Connection closed");
}

async fn serve(ctx: &HandlerContext, mut client: TcpStream, guard: &mut ConnectionGuard) {
    let (request, buffered) = match ctx.reader.read(&mut client).await {
        Ok(parsed) => parsed,
        Err(err) => {
            reject(ctx, &mut client, guard, err).await;
            return;
        }
    };
    guard.transition(ConnectionState::RequestParsed);

    let kind = request.kind();
    tracing::debug!(
        method = request.method(),
        uri = request.target(),
        version = request.version(),
        authority = request.authority(),
        "Request received"
    );

    let target_addr = match request.resolve() {
        Ok(addr) => addr,
        Err(err) => {
            reject(ctx, &mut client, guard, err).await;
            return;
        }
    };

    let mut target = match ctx.dialer.dial(&target_addr).await {
        Ok(stream) => stream,
        Err(err) => {
            guard.transition(ConnectionState::DialFailed);
            tracing::warn!(upstream = %target_addr, error = %err, "Failed to connect to target");
            metrics::record_request(kind.as_str(), "dial_failed");
            respond_unavailable(&mut client, guard, &err).await;
            return;
        }
    };

    match kind {
        RequestKind::Connect => {
            guard.transition(ConnectionState::Tunneling);
            tracing::info!(upstream = %target_addr, "Tunnel established");
            match establish_tunnel(client, target, &buffered, &ctx.relay).await {
                Ok(_) => metrics::record_request(kind.as_str(), "ok"),
                Err(err) => {
                    tracing::warn!(upstream = %target_addr, error = %err, "Tunnel setup failed");
                    metrics::record_request(kind.as_str(), "relay_failed");
                }
            }
        }
        RequestKind::Forward => {
            if expects_continue(&request) {
                tracing::debug!("Request body is read before any interim 100 Continue is relayed");
            }
            if let Err(err) = forward_request(&mut client, &mut target, &request, &buffered).await {
                match &err {
                    ProxyError::IncompleteBody { .. } => {
                        tracing::info!(
                            upstream = %target_addr,
                            error = %err,
                            "Client closed before sending the full request body"
                        );
                        metrics::record_request(kind.as_str(), "client_closed");
                    }
                    _ => {
                        tracing::warn!(
                            upstream = %target_addr,
                            error = %err,
                            "Failed to forward request"
                        );
                        metrics::record_request(kind.as_str(), "forward_failed");
                    }
                }
                drop(target);
                respond_unavailable(&mut client, guard, &err).await;
                return;
            }
            guard.transition(ConnectionState::Forwarding);
            tracing::info!(
                upstream = %target_addr,
                method = request.method(),
                "Request forwarded"
            );
            metrics::record_request(kind.as_str(), "ok");
            ctx.relay.run(client, target).await;
        }
    }
}

fn expects_continue(request: &ParsedRequest) -> bool {
    request
        .header("expect")
        .is_some_and(|value| value.trim_ascii().eq_ignore_ascii_case(b"100-continue"))
}

/// Handle a request that could not be read or classified.
async fn reject(
    ctx: &HandlerContext,
    client: &mut TcpStream,
    guard: &mut ConnectionGuard,
    err: ProxyError,
) {
    match &err {
        ProxyError::MalformedRequest(_) => {
            tracing::warn!(error = %err, "Rejecting malformed request")
        }
        _ => tracing::debug!(error = %err, "Failed to read request"),
    }
    metrics::record_request("unknown", "malformed");

    if !ctx.reject_malformed || !matches!(err, ProxyError::MalformedRequest(_)) {
        return;
    }
    match response::write_bad_request(client, &err.to_string()).await {
        Ok(()) => {
            guard.transition(ConnectionState::ErrorResponded);
            let _ = client.shutdown().await;
        }
        Err(e) => tracing::debug!(error = %e, "Failed to write 400 response"),
    }
}

async fn respond_unavailable(
    client: &mut TcpStream,
    guard: &mut ConnectionGuard,
    cause: &ProxyError,
) {
    match response::write_service_unavailable(client, &cause.to_string()).await {
        Ok(()) => {
            guard.transition(ConnectionState::ErrorResponded);
            let _ = client.shutdown().await;
        }
        Err(e) => tracing::debug!(error = %e, "Failed to write 503 response"),
    }
}
