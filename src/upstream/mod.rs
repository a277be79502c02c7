//! Upstream target subsystem.
//!
//! # Data Flow
//! ```text
//! ParsedRequest (authority, scheme)
//!     → resolver.rs (host:port with scheme default port)
//!     → dialer.rs (single bounded connect attempt)
//!     → TargetConnection handed to the tunnel or forwarder
//! ```

pub mod dialer;
pub mod resolver;

pub use dialer::{TargetDialer, DEFAULT_CONNECT_TIMEOUT};
pub use resolver::{resolve_target, ResolvedAddress, Scheme};
