//! Transparent HTTP forward proxy.
//!
//! # Architecture Overview
//!
//! ```text
//!   Client ──▶ net::Listener ──▶ http::ProxyServer ──▶ proxy::handler
//!                                                         │
//!                           http::request (classify) ◀────┤
//!                           upstream (resolve + dial) ◀───┤
//!                                                         ▼
//!                               proxy::tunnel / proxy::forward
//!                                                         │
//!   Client ◀══════════════ proxy::relay ══════════════▶ Target
//! ```
//!
//! CONNECT requests become opaque TCP tunnels. Any other request is written
//! to the target unchanged and the connection then turns into a byte pipe.
//! When the target cannot be reached the client gets a `503 Service
//! Unavailable` carrying the failure text.

// Core subsystems
pub mod config;
pub mod error;
pub mod http;
pub mod net;
pub mod proxy;
pub mod upstream;

// Cross-cutting concerns
pub mod lifecycle;
pub mod observability;

pub use config::ProxyConfig;
pub use error::{ProxyError, Result};
pub use http::ProxyServer;
pub use lifecycle::Shutdown;
pub use net::Listener;
