//! Error types for the proxy core.
//!
//! Every failure is handled at the connection-handler boundary; none of
//! these ever propagates out of the accept loop.

use std::io;
use thiserror::Error;

/// Classifies dial failures for logging and metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DialErrorKind {
    /// The connect timeout elapsed.
    Timeout,
    /// The target actively refused the connection.
    Refused,
    /// Host name resolution failed.
    Resolve,
    /// Any other socket-level failure.
    Other,
}

impl DialErrorKind {
    /// Classify an I/O error returned by a connect attempt.
    pub fn classify(err: &io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::TimedOut => DialErrorKind::Timeout,
            io::ErrorKind::ConnectionRefused => DialErrorKind::Refused,
            // tokio's resolver reports lookup failures as `Other`/`Uncategorized`
            // with the resolver message attached.
            _ if err.to_string().contains("lookup") || err.to_string().contains("resolve") => {
                DialErrorKind::Resolve
            }
            _ => DialErrorKind::Other,
        }
    }

    /// Stable label used in metrics.
    pub fn as_str(&self) -> &'static str {
        match self {
            DialErrorKind::Timeout => "timeout",
            DialErrorKind::Refused => "refused",
            DialErrorKind::Resolve => "resolve",
            DialErrorKind::Other => "other",
        }
    }
}

/// Proxy error taxonomy.
#[derive(Error, Debug)]
pub enum ProxyError {
    #[error("accept failed: {0}")]
    AcceptFailed(#[source] io::Error),

    #[error("listener closed")]
    ListenerClosed,

    #[error("malformed request: {0}")]
    MalformedRequest(String),

    #[error("dial tcp {addr}: {source}")]
    DialFailed {
        addr: String,
        kind: DialErrorKind,
        #[source]
        source: io::Error,
    },

    #[error("forward request: {0}")]
    ForwardFailed(#[source] io::Error),

    #[error("forward request: client closed after {received} of {expected} body bytes")]
    IncompleteBody { received: u64, expected: u64 },

    #[error("relay: {0}")]
    RelayError(#[source] io::Error),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl ProxyError {
    /// Shorthand for a malformed request with a message.
    pub fn malformed(message: impl Into<String>) -> Self {
        ProxyError::MalformedRequest(message.into())
    }

    /// Whether this failure is reported to the client as a 503.
    pub fn is_upstream_failure(&self) -> bool {
        matches!(self, ProxyError::DialFailed { .. } | ProxyError::ForwardFailed(_))
    }
}

pub type Result<T> = std::result::Result<T, ProxyError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dial_error_kind_classifies_refused_and_timeout() {
        let refused = io::Error::new(io::ErrorKind::ConnectionRefused, "connection refused");
        assert_eq!(DialErrorKind::classify(&refused), DialErrorKind::Refused);

        let timeout = io::Error::new(io::ErrorKind::TimedOut, "connect timed out");
        assert_eq!(DialErrorKind::classify(&timeout), DialErrorKind::Timeout);

        let lookup = io::Error::new(io::ErrorKind::Other, "failed to lookup address information");
        assert_eq!(DialErrorKind::classify(&lookup), DialErrorKind::Resolve);
    }

    #[test]
    fn dial_failed_display_includes_address_and_cause() {
        let err = ProxyError::DialFailed {
            addr: "example.invalid:443".into(),
            kind: DialErrorKind::Refused,
            source: io::Error::new(io::ErrorKind::ConnectionRefused, "connection refused"),
        };
        let display = err.to_string();
        assert!(display.contains("example.invalid:443"), "got: {}", display);
        assert!(display.contains("connection refused"), "got: {}", display);
    }

    #[test]
    fn upstream_failures_are_dial_and_forward_only() {
        assert!(ProxyError::ForwardFailed(io::Error::other("broken pipe")).is_upstream_failure());
        assert!(!ProxyError::malformed("bad").is_upstream_failure());
        let short = ProxyError::IncompleteBody {
            received: 3,
            expected: 100,
        };
        assert!(!short.is_upstream_failure());
        assert_eq!(
            short.to_string(),
            "forward request: client closed after 3 of 100 body bytes"
        );
        assert!(!ProxyError::RelayError(io::Error::other("reset")).is_upstream_failure());
    }
}
