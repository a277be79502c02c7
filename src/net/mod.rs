//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming TCP connection
//!     → listener.rs (accept loop, connection limits)
//!     → connection.rs (lifecycle tracking, state machine)
//!     → Hand off to the proxy handler
//!
//! Connection States:
//!     Accepted → RequestParsed → {Tunneling | Forwarding | DialFailed → ErrorResponded} → Closed
//! ```
//!
//! # Design Decisions
//! - Accepting waits for a free connection slot; excess clients queue in the kernel backlog
//! - Each connection is tracked for graceful shutdown

pub mod connection;
pub mod listener;

pub use connection::{ConnectionGuard, ConnectionId, ConnectionState, ConnectionTracker};
pub use listener::{ConnectionPermit, Listener, ListenerError};
