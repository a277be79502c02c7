//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs   (accept loop, one task per connection)
//!     → request.rs  (read and classify the first request head)
//!     → [proxy core dials and relays]
//!     → response.rs (200 Connection Established, 503, 400)
//! ```

pub mod request;
pub mod response;
pub mod server;

pub use request::{BodyFraming, ParsedRequest, RequestKind, RequestReader};
pub use server::ProxyServer;
