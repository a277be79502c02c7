//! Bidirectional byte relay.
//!
//! # Responsibilities
//! - Copy client→target and target→client concurrently
//! - End each direction independently on end-of-stream or I/O error
//! - Apply the configured close mode once a direction finishes
//! - Report per-direction byte counts and outcomes
//!
//! # Design Decisions
//! - target→client runs in the caller's task; client→target is spawned
//! - A failed direction aborts the other: a half-consumed TCP stream cannot
//!   be replayed, so there is nothing left to salvage
//! - Socket halves are owned by the copy loops, so every exit path drops them

use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::task::JoinError;
use tracing::Instrument;

use crate::config::{CloseMode, RelayConfig};
use crate::observability::metrics;

/// One direction of a relay session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    ClientToTarget,
    TargetToClient,
}

impl Direction {
    pub fn as_str(self) -> &'static str {
        match self {
            Direction::ClientToTarget => "client_to_target",
            Direction::TargetToClient => "target_to_client",
        }
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How one direction ended.
#[derive(Debug)]
pub enum DirectionOutcome {
    /// The source reached end-of-stream.
    Completed { bytes: u64 },
    /// A read or write failed.
    Failed { bytes: u64, error: io::Error },
    /// The session ended before this direction did.
    Aborted { bytes: u64 },
}

impl DirectionOutcome {
    pub fn bytes(&self) -> u64 {
        match self {
            DirectionOutcome::Completed { bytes }
            | DirectionOutcome::Failed { bytes, .. }
            | DirectionOutcome::Aborted { bytes } => *bytes,
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, DirectionOutcome::Completed { .. })
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, DirectionOutcome::Failed { .. })
    }

    pub fn is_aborted(&self) -> bool {
        matches!(self, DirectionOutcome::Aborted { .. })
    }
}

/// Result of one relay session.
#[derive(Debug)]
pub struct RelayReport {
    pub client_to_target: DirectionOutcome,
    pub target_to_client: DirectionOutcome,
}

impl RelayReport {
    fn record(&self) {
        for (direction, outcome) in [
            (Direction::ClientToTarget, &self.client_to_target),
            (Direction::TargetToClient, &self.target_to_client),
        ] {
            metrics::record_relayed_bytes(direction.as_str(), outcome.bytes());
            if let DirectionOutcome::Failed { error, .. } = outcome {
                match error.kind() {
                    io::ErrorKind::ConnectionReset | io::ErrorKind::BrokenPipe => {
                        tracing::debug!(%direction, error = %error, "Relay peer reset")
                    }
                    _ => tracing::warn!(%direction, error = %error, "Relay error"),
                }
            }
        }

        tracing::debug!(
            client_to_target_bytes = self.client_to_target.bytes(),
            target_to_client_bytes = self.target_to_client.bytes(),
            client_to_target_aborted = self.client_to_target.is_aborted(),
            target_to_client_aborted = self.target_to_client.is_aborted(),
            "Relay finished"
        );
    }
}

/// Relay settings shared by every session of a server.
#[derive(Debug, Clone)]
pub struct Relay {
    buffer_size: usize,
    close_mode: CloseMode,
}

impl Relay {
    pub fn new(config: &RelayConfig) -> Self {
        Self {
            buffer_size: config.buffer_size,
            close_mode: config.close_mode,
        }
    }

    /// Relay between two TCP connections until the session ends.
    ///
    /// Both sockets are closed when this returns.
    pub async fn run(&self, client: TcpStream, target: TcpStream) -> RelayReport {
        let (client_read, client_write) = client.into_split();
        let (target_read, target_write) = target.into_split();
        self.run_split(client_read, client_write, target_read, target_write)
            .await
    }

    /// Relay between already-split stream halves.
    pub async fn run_split<CR, CW, TR, TW>(
        &self,
        client_read: CR,
        client_write: CW,
        target_read: TR,
        target_write: TW,
    ) -> RelayReport
    where
        CR: AsyncRead + Unpin + Send + 'static,
        TW: AsyncWrite + Unpin + Send + 'static,
        TR: AsyncRead + Unpin,
        CW: AsyncWrite + Unpin,
    {
        let half_close = self.close_mode == CloseMode::HalfClose;
        let upstream_progress = Arc::new(AtomicU64::new(0));
        let downstream_progress = Arc::new(AtomicU64::new(0));

        let mut upstream = tokio::spawn(
            pump(
                client_read,
                target_write,
                self.buffer_size,
                half_close,
                Arc::clone(&upstream_progress),
            )
            .in_current_span(),
        );

        let downstream = pump(
            target_read,
            client_write,
            self.buffer_size,
            half_close,
            Arc::clone(&downstream_progress),
        );
        tokio::pin!(downstream);

        let mut client_to_target = None;
        let target_to_client = tokio::select! {
            outcome = &mut downstream => outcome,
            joined = &mut upstream => {
                let outcome = join_outcome(joined, &upstream_progress);
                let failed = outcome.is_failed();
                client_to_target = Some(outcome);
                if failed {
                    DirectionOutcome::Aborted {
                        bytes: downstream_progress.load(Ordering::Relaxed),
                    }
                } else {
                    (&mut downstream).await
                }
            }
        };

        let client_to_target = match client_to_target {
            Some(outcome) => outcome,
            None => {
                if self.close_mode == CloseMode::FullClose || target_to_client.is_failed() {
                    upstream.abort();
                }
                join_outcome(upstream.await, &upstream_progress)
            }
        };

        let report = RelayReport {
            client_to_target,
            target_to_client,
        };
        report.record();
        report
    }
}

fn join_outcome(
    joined: Result<DirectionOutcome, JoinError>,
    progress: &AtomicU64,
) -> DirectionOutcome {
    let bytes = progress.load(Ordering::Relaxed);
    match joined {
        Ok(outcome) => outcome,
        Err(e) if e.is_cancelled() => DirectionOutcome::Aborted { bytes },
        Err(e) => DirectionOutcome::Failed {
            bytes,
            error: io::Error::other(e.to_string()),
        },
    }
}

/// Copy `reader` into `writer` with a fixed-size buffer until end-of-stream.
async fn pump<R, W>(
    mut reader: R,
    mut writer: W,
    buffer_size: usize,
    half_close: bool,
    progress: Arc<AtomicU64>,
) -> DirectionOutcome
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut buf = vec![0u8; buffer_size];
    loop {
        let n = match reader.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => n,
            Err(error) => {
                return DirectionOutcome::Failed {
                    bytes: progress.load(Ordering::Relaxed),
                    error,
                }
            }
        };
        if let Err(error) = writer.write_all(&buf[..n]).await {
            return DirectionOutcome::Failed {
                bytes: progress.load(Ordering::Relaxed),
                error,
            };
        }
        progress.fetch_add(n as u64, Ordering::Relaxed);
    }

    if half_close {
        // Propagate end-of-stream to the other side as a FIN.
        if let Err(e) = writer.shutdown().await {
            tracing::debug!(error = %e, "Write shutdown failed");
        }
    }
    DirectionOutcome::Completed {
        bytes: progress.load(Ordering::Relaxed),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::pin::Pin;
    use std::task::{Context, Poll};
    use std::time::Duration;
    use tokio::io::{duplex, ReadBuf};

    /// A reader whose peer has reset the connection.
    struct ResetReader;

    impl AsyncRead for ResetReader {
        fn poll_read(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            _buf: &mut ReadBuf<'_>,
        ) -> Poll<io::Result<()>> {
            Poll::Ready(Err(io::Error::new(
                io::ErrorKind::ConnectionReset,
                "connection reset by peer",
            )))
        }
    }

    fn relay(close_mode: CloseMode) -> Relay {
        Relay::new(&RelayConfig {
            buffer_size: 1024,
            close_mode,
        })
    }

    #[tokio::test]
    async fn copies_both_directions_in_order() {
        let (mut client, client_proxy) = duplex(64);
        let (target_proxy, mut target) = duplex(64);
        let (client_read, client_write) = tokio::io::split(client_proxy);
        let (target_read, target_write) = tokio::io::split(target_proxy);

        let session = tokio::spawn(async move {
            relay(CloseMode::HalfClose)
                .run_split(client_read, client_write, target_read, target_write)
                .await
        });

        let upload: Vec<u8> = (0..5000u32).map(|i| (i % 251) as u8).collect();
        let expected = upload.clone();
        let target_side = tokio::spawn(async move {
            let mut received = Vec::new();
            target.read_to_end(&mut received).await.unwrap();
            target.write_all(b"pong").await.unwrap();
            target.shutdown().await.unwrap();
            received
        });

        client.write_all(&upload).await.unwrap();
        client.shutdown().await.unwrap();

        let mut reply = Vec::new();
        client.read_to_end(&mut reply).await.unwrap();
        assert_eq!(reply, b"pong");
        assert_eq!(target_side.await.unwrap(), expected);

        let report = session.await.unwrap();
        assert!(report.client_to_target.is_completed());
        assert!(report.target_to_client.is_completed());
        assert_eq!(report.client_to_target.bytes(), 5000);
        assert_eq!(report.target_to_client.bytes(), 4);
    }

    #[tokio::test]
    async fn full_close_aborts_upload_when_target_finishes() {
        let (mut client, client_proxy) = duplex(64);
        let (target_proxy, mut target) = duplex(64);
        let (client_read, client_write) = tokio::io::split(client_proxy);
        let (target_read, target_write) = tokio::io::split(target_proxy);

        let session = tokio::spawn(async move {
            relay(CloseMode::FullClose)
                .run_split(client_read, client_write, target_read, target_write)
                .await
        });

        // Target answers and closes while the client keeps its side open.
        target.write_all(b"bye").await.unwrap();
        drop(target);

        let mut reply = Vec::new();
        client.read_to_end(&mut reply).await.unwrap();
        assert_eq!(reply, b"bye");

        let report = tokio::time::timeout(Duration::from_secs(5), session)
            .await
            .expect("session must end without the client closing")
            .unwrap();
        assert!(report.target_to_client.is_completed());
        assert!(report.client_to_target.is_aborted());
    }

    #[tokio::test]
    async fn half_close_keeps_downstream_open_after_upload_ends() {
        let (mut client, client_proxy) = duplex(64);
        let (target_proxy, mut target) = duplex(64);
        let (client_read, client_write) = tokio::io::split(client_proxy);
        let (target_read, target_write) = tokio::io::split(target_proxy);

        let session = tokio::spawn(async move {
            relay(CloseMode::HalfClose)
                .run_split(client_read, client_write, target_read, target_write)
                .await
        });

        client.write_all(b"request").await.unwrap();
        client.shutdown().await.unwrap();

        // The target sees end-of-stream but may still answer.
        let mut received = Vec::new();
        target.read_to_end(&mut received).await.unwrap();
        assert_eq!(received, b"request");
        target.write_all(b"late answer").await.unwrap();
        target.shutdown().await.unwrap();

        let mut reply = Vec::new();
        client.read_to_end(&mut reply).await.unwrap();
        assert_eq!(reply, b"late answer");

        let report = session.await.unwrap();
        assert!(report.client_to_target.is_completed());
        assert!(report.target_to_client.is_completed());
    }

    #[tokio::test]
    async fn client_read_error_aborts_downstream() {
        let (client_proxy, _client) = duplex(64);
        let (target_proxy, _target) = duplex(64);
        let (_, client_write) = tokio::io::split(client_proxy);
        let (target_read, target_write) = tokio::io::split(target_proxy);

        // The target stays open, so only the failure can end the session.
        let report = tokio::time::timeout(
            Duration::from_secs(5),
            relay(CloseMode::HalfClose).run_split(
                ResetReader,
                client_write,
                target_read,
                target_write,
            ),
        )
        .await
        .expect("failed upload must end the session");

        assert!(report.client_to_target.is_failed());
        assert!(report.target_to_client.is_aborted());
    }

    #[tokio::test]
    async fn target_read_error_aborts_upstream() {
        let (client_proxy, _client) = duplex(64);
        let (target_proxy, _target) = duplex(64);
        let (client_read, client_write) = tokio::io::split(client_proxy);
        let (_, target_write) = tokio::io::split(target_proxy);

        let report = tokio::time::timeout(
            Duration::from_secs(5),
            relay(CloseMode::HalfClose).run_split(
                client_read,
                client_write,
                ResetReader,
                target_write,
            ),
        )
        .await
        .expect("failed download must end the session");

        assert!(report.target_to_client.is_failed());
        assert!(report.client_to_target.is_aborted());
    }

    #[test]
    fn direction_labels() {
        assert_eq!(Direction::ClientToTarget.to_string(), "client_to_target");
        assert_eq!(Direction::TargetToClient.as_str(), "target_to_client");
    }
}
