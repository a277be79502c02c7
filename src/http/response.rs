//! Synthetic responses written by the proxy itself.
//!
//! The proxy only ever speaks first on a connection in three cases: the
//! CONNECT success line, the 503 Error Responder, and the optional 400 for
//! malformed requests. Everything else on the wire comes from the target.

use tokio::io::{AsyncWrite, AsyncWriteExt};

/// Sent to the client once a CONNECT target has been dialed.
pub const CONNECTION_ESTABLISHED: &[u8] = b"HTTP/1.1 200 Connection Established\r\n\r\n";

/// Status line of the Error Responder.
pub const SERVICE_UNAVAILABLE: &str = "HTTP/1.1 503 Service Unavailable";

/// Status line for rejected malformed requests.
pub const BAD_REQUEST: &str = "HTTP/1.1 400 Bad Request";

const ERROR_HEADERS: &str =
    "\r\nContent-Type: text/plain; charset=utf-8\r\nConnection: close\r\n\r\n";

/// Build an error response: status line, minimal headers, then `cause` as the body.
pub fn error_response(status_line: &str, cause: &str) -> Vec<u8> {
    let mut response = Vec::with_capacity(status_line.len() + ERROR_HEADERS.len() + cause.len());
    response.extend_from_slice(status_line.as_bytes());
    response.extend_from_slice(ERROR_HEADERS.as_bytes());
    response.extend_from_slice(cause.as_bytes());
    response
}

/// Write a `503 Service Unavailable` carrying `cause` to the client.
pub async fn write_service_unavailable<W>(client: &mut W, cause: &str) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    client.write_all(&error_response(SERVICE_UNAVAILABLE, cause)).await?;
    client.flush().await
}

/// Write a `400 Bad Request` carrying `cause` to the client.
pub async fn write_bad_request<W>(client: &mut W, cause: &str) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    client.write_all(&error_response(BAD_REQUEST, cause)).await?;
    client.flush().await
}

/// Write the CONNECT success line.
pub async fn write_connection_established<W>(client: &mut W) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    client.write_all(CONNECTION_ESTABLISHED).await?;
    client.flush().await
}
