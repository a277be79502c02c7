//! CONNECT tunnels.

use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;

use crate::error::{ProxyError, Result};
use crate::http::response;
use crate::proxy::relay::{Relay, RelayReport};

/// Confirm the tunnel to the client and relay until both sides are done.
///
/// `early_data` holds bytes the client sent after the CONNECT head; they are
/// delivered to the target before anything else.
pub async fn establish_tunnel(
    mut client: TcpStream,
    mut target: TcpStream,
    early_data: &[u8],
    relay: &Relay,
) -> Result<RelayReport> {
    response::write_connection_established(&mut client)
        .await
        .map_err(ProxyError::RelayError)?;

    if !early_data.is_empty() {
        target
            .write_all(early_data)
            .await
            .map_err(ProxyError::RelayError)?;
        tracing::trace!(bytes = early_data.len(), "Delivered early tunnel payload");
    }

    Ok(relay.run(client, target).await)
}
