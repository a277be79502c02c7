//! Target dialing.
//!
//! One attempt, bounded by the connect timeout, no retries. The timeout
//! covers name resolution as well as the TCP handshake.

use std::io;
use std::time::{Duration, Instant};
use tokio::net::TcpStream;

use crate::error::{DialErrorKind, ProxyError, Result};
use crate::observability::metrics;
use crate::upstream::resolver::ResolvedAddress;

/// Default target connect timeout.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Opens TCP connections to resolved targets.
#[derive(Debug, Clone)]
pub struct TargetDialer {
    connect_timeout: Duration,
}

impl TargetDialer {
    pub fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }

    pub fn connect_timeout(&self) -> Duration {
        self.connect_timeout
    }

    /// Connect to `target`, surfacing any failure as `DialFailed`.
    pub async fn dial(&self, target: &ResolvedAddress) -> Result<TcpStream> {
        let started = Instant::now();
        let result = tokio::time::timeout(self.connect_timeout, TcpStream::connect(target.as_str()))
            .await
            .unwrap_or_else(|_| {
                Err(io::Error::new(
                    io::ErrorKind::TimedOut,
                    format!("i/o timeout after {:?}", self.connect_timeout),
                ))
            });

        match result {
            Ok(stream) => {
                metrics::record_dial("success", started.elapsed());
                if let Err(e) = stream.set_nodelay(true) {
                    tracing::debug!(upstream = %target, error = %e, "Failed to set TCP_NODELAY");
                }
                tracing::debug!(
                    upstream = %target,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Target connected"
                );
                Ok(stream)
            }
            Err(source) => {
                let kind = DialErrorKind::classify(&source);
                metrics::record_dial(kind.as_str(), started.elapsed());
                Err(ProxyError::DialFailed {
                    addr: target.to_string(),
                    kind,
                    source,
                })
            }
        }
    }
}

impl Default for TargetDialer {
    fn default() -> Self {
        Self::new(DEFAULT_CONNECT_TIMEOUT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::upstream::resolver::{resolve_target, Scheme};
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn dials_listening_target() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let target = resolve_target(&addr.to_string(), Scheme::Http).unwrap();

        let stream = TargetDialer::default().dial(&target).await.unwrap();
        assert_eq!(stream.peer_addr().unwrap(), addr);
    }

    #[tokio::test]
    async fn refused_dial_is_typed() {
        // Bind then drop to get a port with nothing listening.
        let addr = {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap()
        };
        let target = resolve_target(&addr.to_string(), Scheme::Http).unwrap();

        let err = TargetDialer::default().dial(&target).await.unwrap_err();
        match err {
            ProxyError::DialFailed { addr: failed, kind, .. } => {
                assert_eq!(failed, addr.to_string());
                assert_eq!(kind, DialErrorKind::Refused);
            }
            other => panic!("expected DialFailed, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn timeout_is_typed() {
        // TEST-NET-1 is unroutable; the connect either hangs until the timeout
        // or fails fast on hosts without a route.
        let target = resolve_target("192.0.2.1:81", Scheme::Http).unwrap();
        let dialer = TargetDialer::new(Duration::from_millis(100));

        let err = dialer.dial(&target).await.unwrap_err();
        assert!(matches!(err, ProxyError::DialFailed { .. }));
        assert!(dialer.connect_timeout() == Duration::from_millis(100));
    }
}
