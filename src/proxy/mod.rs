//! Proxy core.
//!
//! # Data Flow
//! ```text
//! accepted connection
//!     → handler.rs  (classify, dial, dispatch)
//!     → tunnel.rs   (CONNECT)  ─┐
//!     → forward.rs  (plain)    ─┴→ relay.rs (bidirectional copy)
//! ```

pub mod forward;
pub mod handler;
pub mod relay;
pub mod tunnel;

pub use handler::{handle_connection, HandlerContext};
pub use relay::{Direction, DirectionOutcome, Relay, RelayReport};
