//! Metrics collection and exposition.
//!
//! # Metrics
//! - `proxy_connections_total` (counter): accepted client connections
//! - `proxy_active_connections` (gauge): connections currently handled
//! - `proxy_requests_total` (counter): first requests by kind and outcome
//! - `proxy_dial_duration_seconds` (histogram): target dial latency by outcome
//! - `proxy_relayed_bytes_total` (counter): bytes relayed per direction
//!
//! Recording is a no-op until a recorder is installed, so the core calls
//! these unconditionally.

use std::net::SocketAddr;
use std::time::Duration;

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

/// Install the Prometheus recorder with an HTTP scrape listener on `addr`.
///
/// Must be called from within a Tokio runtime.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics endpoint listening");
    Ok(())
}

pub fn record_connection_opened() {
    metrics::counter!("proxy_connections_total").increment(1);
    metrics::gauge!("proxy_active_connections").increment(1.0);
}

pub fn record_connection_closed() {
    metrics::gauge!("proxy_active_connections").decrement(1.0);
}

/// `kind` is `connect` or `forward`; `outcome` is a short status label.
pub fn record_request(kind: &'static str, outcome: &'static str) {
    metrics::counter!("proxy_requests_total", "kind" => kind, "outcome" => outcome).increment(1);
}

pub fn record_dial(outcome: &'static str, elapsed: Duration) {
    metrics::histogram!("proxy_dial_duration_seconds", "outcome" => outcome)
        .record(elapsed.as_secs_f64());
}

pub fn record_relayed_bytes(direction: &'static str, bytes: u64) {
    metrics::counter!("proxy_relayed_bytes_total", "direction" => direction).increment(bytes);
}
