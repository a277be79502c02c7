//! Plain (non-CONNECT) request forwarding.
//!
//! The request head is written to the target byte-for-byte as received,
//! including the request-target in whatever form the client used. A
//! Content-Length body is copied before the relay starts; everything after
//! that (chunked bodies, the response, later requests) rides the relay.
//!
//! Because the declared body is read before the relay starts, an interim
//! `100 Continue` from the target only reaches the client after the whole
//! body has been sent. Clients that send `Expect: 100-continue` and wait
//! for the interim response stall until their own expect timeout fires.

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use crate::error::{ProxyError, Result};
use crate::http::request::{BodyFraming, ParsedRequest};

/// Write `request` and its known-length body to `target`.
///
/// `buffered` holds bytes read from the client past the end of the head.
/// Returns the number of bytes written.
pub async fn forward_request(
    client: &mut TcpStream,
    target: &mut TcpStream,
    request: &ParsedRequest,
    buffered: &[u8],
) -> Result<u64> {
    target
        .write_all(request.head())
        .await
        .map_err(ProxyError::ForwardFailed)?;
    let mut written = request.head().len() as u64;

    if !buffered.is_empty() {
        target
            .write_all(buffered)
            .await
            .map_err(ProxyError::ForwardFailed)?;
        written += buffered.len() as u64;
    }

    if let BodyFraming::ContentLength(length) = request.body() {
        let remaining = length.saturating_sub(buffered.len() as u64);
        if remaining > 0 {
            let mut body = (&mut *client).take(remaining);
            let copied = tokio::io::copy(&mut body, target)
                .await
                .map_err(ProxyError::ForwardFailed)?;
            if copied < remaining {
                return Err(ProxyError::IncompleteBody {
                    received: length - remaining + copied,
                    expected: length,
                });
            }
            written += copied;
        }
    }

    target.flush().await.map_err(ProxyError::ForwardFailed)?;
    Ok(written)
}
