//! Connection state machine and lifecycle tracking.
//!
//! # Responsibilities
//! - Track per-connection state (Accepted → RequestParsed → ... → Closed)
//! - Generate unique connection IDs for tracing
//! - Count in-flight connections so shutdown can drain them

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

/// Global atomic counter for connection IDs.
/// Using relaxed ordering is sufficient since we only need uniqueness, not synchronization.
static CONNECTION_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Generate a new unique connection ID.
    pub fn new() -> Self {
        Self(CONNECTION_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Per-connection state.
///
/// ```text
/// Accepted → RequestParsed → DialFailed → ErrorResponded → Closed
///                          → ErrorResponded → Closed      (forward failed)
///                          → Tunneling → Closed
///                          → Forwarding → Closed
/// Accepted → ErrorResponded → Closed                      (rejected malformed request)
/// Accepted → Closed                                       (malformed request)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Accepted,
    RequestParsed,
    DialFailed,
    ErrorResponded,
    Tunneling,
    Forwarding,
    Closed,
}

impl ConnectionState {
    /// Whether moving from `self` to `next` is a legal transition.
    pub fn can_transition_to(self, next: ConnectionState) -> bool {
        use ConnectionState::*;
        matches!(
            (self, next),
            (Accepted, RequestParsed)
                | (Accepted, ErrorResponded)
                | (Accepted, Closed)
                | (RequestParsed, DialFailed)
                | (RequestParsed, ErrorResponded)
                | (RequestParsed, Tunneling)
                | (RequestParsed, Forwarding)
                | (RequestParsed, Closed)
                | (DialFailed, ErrorResponded)
                | (DialFailed, Closed)
                | (ErrorResponded, Closed)
                | (Tunneling, Closed)
                | (Forwarding, Closed)
        )
    }

    /// Whether this state is terminal.
    pub fn is_terminal(self) -> bool {
        self == ConnectionState::Closed
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ConnectionState::Accepted => "accepted",
            ConnectionState::RequestParsed => "request_parsed",
            ConnectionState::DialFailed => "dial_failed",
            ConnectionState::ErrorResponded => "error_responded",
            ConnectionState::Tunneling => "tunneling",
            ConnectionState::Forwarding => "forwarding",
            ConnectionState::Closed => "closed",
        }
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tracks active connections for graceful shutdown.
#[derive(Debug, Clone, Default)]
pub struct ConnectionTracker {
    inner: Arc<TrackerInner>,
}

#[derive(Debug, Default)]
struct TrackerInner {
    /// Current count of active connections.
    active_count: AtomicU64,
    /// Woken whenever a connection closes.
    closed: Notify,
}

impl ConnectionTracker {
    /// Create a new connection tracker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a new active connection. Returns a guard that decrements on drop.
    pub fn track(&self) -> ConnectionGuard {
        self.inner.active_count.fetch_add(1, Ordering::SeqCst);
        ConnectionGuard {
            inner: Arc::clone(&self.inner),
            id: ConnectionId::new(),
            state: ConnectionState::Accepted,
        }
    }

    /// Get current active connection count.
    pub fn active_count(&self) -> u64 {
        self.inner.active_count.load(Ordering::SeqCst)
    }

    /// Wait until all connections are closed or the grace period elapses.
    ///
    /// Returns `true` if every connection drained in time.
    pub async fn wait_for_drain(&self, grace: Duration) -> bool {
        let drained = async {
            loop {
                let notified = self.inner.closed.notified();
                if self.active_count() == 0 {
                    return;
                }
                notified.await;
            }
        };
        tokio::time::timeout(grace, drained).await.is_ok()
    }
}

/// Guard that tracks a connection's lifetime and state.
/// Decrements active count when dropped.
#[derive(Debug)]
pub struct ConnectionGuard {
    inner: Arc<TrackerInner>,
    id: ConnectionId,
    state: ConnectionState,
}

impl ConnectionGuard {
    /// Get this connection's ID.
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Current state.
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Move to `next`, logging the transition.
    ///
    /// Illegal transitions are logged and ignored, so the recorded state only
    /// ever follows the documented machine.
    pub fn transition(&mut self, next: ConnectionState) -> bool {
        if !self.state.can_transition_to(next) {
            tracing::warn!(from = %self.state, to = %next, "Illegal connection state transition");
            return false;
        }
        tracing::trace!(from = %self.state, to = %next, "Connection state");
        self.state = next;
        true
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.inner.active_count.fetch_sub(1, Ordering::SeqCst);
        self.inner.closed.notify_waiters();
        tracing::trace!(connection_id = %self.id, "Connection closed");
    }
}
