//! Data forwarding module
//!
//! This module relays bytes between the two connections of a session.
//! Each direction runs as its own pump; the first pump to stop, or the idle
//! watchdog, ends the whole session and both connections are closed.

use log::debug;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time::Instant;

use crate::common::{ProxyError, Result};

/// Upper bound for sending TLS close_notify / TCP FIN during cleanup
const CLOSE_GRACE: Duration = Duration::from_secs(1);

/// Which end of a session closed first
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    /// The plaintext client
    Client,
    /// The remote TLS server
    Remote,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Client => write!(f, "client"),
            Self::Remote => write!(f, "remote"),
        }
    }
}

/// Bytes moved by one session, per direction
///
/// Counts stay readable after the relay returns, whatever ended it.
#[derive(Debug, Default)]
pub struct TransferCounters {
    client_to_remote: AtomicU64,
    remote_to_client: AtomicU64,
}

impl TransferCounters {
    /// Bytes read from the client and written to the remote server
    pub fn client_to_remote(&self) -> u64 {
        self.client_to_remote.load(Ordering::Relaxed)
    }

    /// Bytes read from the remote server and written to the client
    pub fn remote_to_client(&self) -> u64 {
        self.remote_to_client.load(Ordering::Relaxed)
    }
}

/// Time of the last completed read on either side
struct Activity {
    started: Instant,
    last_millis: AtomicU64,
}

impl Activity {
    fn new() -> Self {
        Self {
            started: Instant::now(),
            last_millis: AtomicU64::new(0),
        }
    }

    fn touch(&self) {
        let elapsed = self.started.elapsed().as_millis() as u64;
        self.last_millis.fetch_max(elapsed, Ordering::Relaxed);
    }

    fn idle_for(&self) -> Duration {
        let last = Duration::from_millis(self.last_millis.load(Ordering::Relaxed));
        self.started.elapsed().saturating_sub(last)
    }
}

/// Relay bytes between `client` and `remote` until the session ends
///
/// Both connections are consumed and closed before this returns.
///
/// # Returns
///
/// The side that closed its stream first, or an error if a read or write
/// failed or neither side produced data for `idle_timeout`.
pub async fn relay<C, R>(
    client: C,
    remote: R,
    buffer_size: usize,
    idle_timeout: Duration,
    counters: &TransferCounters,
) -> Result<Side>
where
    C: AsyncRead + AsyncWrite + Unpin,
    R: AsyncRead + AsyncWrite + Unpin,
{
    let (mut client_reader, mut client_writer) = tokio::io::split(client);
    let (mut remote_reader, mut remote_writer) = tokio::io::split(remote);
    let activity = Activity::new();

    let outcome = tokio::select! {
        result = pump(&mut client_reader, &mut remote_writer, buffer_size, &activity, &counters.client_to_remote) => {
            result.map(|()| Side::Client)
        }
        result = pump(&mut remote_reader, &mut client_writer, buffer_size, &activity, &counters.remote_to_client) => {
            result.map(|()| Side::Remote)
        }
        () = watchdog(&activity, idle_timeout) => Err(ProxyError::IdleTimeout(idle_timeout)),
    };

    debug!(
        "Relay finished ({} bytes client to remote, {} bytes remote to client)",
        counters.client_to_remote(),
        counters.remote_to_client()
    );

    // Errors while closing are irrelevant, the session is over either way
    let _ = tokio::time::timeout(CLOSE_GRACE, remote_writer.shutdown()).await;
    let _ = tokio::time::timeout(CLOSE_GRACE, client_writer.shutdown()).await;

    outcome
}

/// Copy one direction until end-of-stream or an error
async fn pump<Rd, Wr>(
    reader: &mut Rd,
    writer: &mut Wr,
    buffer_size: usize,
    activity: &Activity,
    transferred: &AtomicU64,
) -> Result<()>
where
    Rd: AsyncRead + Unpin,
    Wr: AsyncWrite + Unpin,
{
    let mut buffer = vec![0u8; buffer_size];

    loop {
        let n = reader.read(&mut buffer).await?;
        if n == 0 {
            return Ok(());
        }
        activity.touch();

        writer.write_all(&buffer[..n]).await?;
        writer.flush().await?;
        transferred.fetch_add(n as u64, Ordering::Relaxed);
    }
}

/// Resolve once no read has completed for `idle_timeout`
async fn watchdog(activity: &Activity, idle_timeout: Duration) {
    loop {
        let idle = activity.idle_for();
        if idle >= idle_timeout {
            return;
        }
        tokio::time::sleep(idle_timeout - idle).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::duplex;

    const IDLE: Duration = Duration::from_secs(60);

    #[tokio::test]
    async fn test_relay_both_directions() {
        let (client, mut client_peer) = duplex(64);
        let (remote, mut remote_peer) = duplex(64);
        let counters = TransferCounters::default();

        let peers = async {
            client_peer.write_all(b"PING").await.unwrap();
            let mut buf = [0u8; 4];
            remote_peer.read_exact(&mut buf).await.unwrap();
            assert_eq!(&buf, b"PING");

            remote_peer.write_all(b"PONG").await.unwrap();
            client_peer.read_exact(&mut buf).await.unwrap();
            assert_eq!(&buf, b"PONG");

            drop(client_peer);
            remote_peer
        };

        let (side, mut remote_peer) = tokio::join!(relay(client, remote, 16, IDLE, &counters), peers);
        assert_eq!(side.unwrap(), Side::Client);
        assert_eq!(counters.client_to_remote(), 4);
        assert_eq!(counters.remote_to_client(), 4);

        // Remote side sees the close after the client went away
        let mut rest = Vec::new();
        remote_peer.read_to_end(&mut rest).await.unwrap();
        assert!(rest.is_empty());
    }

    #[tokio::test]
    async fn test_relay_preserves_order_with_small_buffer() {
        let (client, mut client_peer) = duplex(1024);
        let (remote, mut remote_peer) = duplex(1024);
        let counters = TransferCounters::default();
        let payload: Vec<u8> = (0..50_000u32).map(|i| (i % 251) as u8).collect();

        let expected = payload.clone();
        let peers = async move {
            let writer = async {
                client_peer.write_all(&payload).await.unwrap();
                client_peer
            };
            let reader = async {
                let mut received = vec![0u8; expected.len()];
                remote_peer.read_exact(&mut received).await.unwrap();
                assert_eq!(received, expected);
                remote_peer
            };
            let (client_peer, remote_peer) = tokio::join!(writer, reader);
            drop(remote_peer);
            client_peer
        };

        let (side, _client_peer) = tokio::join!(relay(client, remote, 7, IDLE, &counters), peers);
        assert_eq!(side.unwrap(), Side::Remote);
        assert_eq!(counters.client_to_remote(), 50_000);
        assert_eq!(counters.remote_to_client(), 0);
    }

    #[tokio::test]
    async fn test_remote_close_closes_client() {
        let (client, mut client_peer) = duplex(64);
        let (remote, remote_peer) = duplex(64);
        drop(remote_peer);

        let counters = TransferCounters::default();
        let side = relay(client, remote, 16, IDLE, &counters).await.unwrap();
        assert_eq!(side, Side::Remote);

        let mut rest = Vec::new();
        client_peer.read_to_end(&mut rest).await.unwrap();
        assert!(rest.is_empty());
        assert_eq!(counters.remote_to_client(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_timeout() {
        let (client, mut client_peer) = duplex(64);
        let (remote, _remote_peer) = duplex(64);
        let counters = TransferCounters::default();

        let result = relay(client, remote, 16, Duration::from_secs(5), &counters).await;
        assert!(matches!(result, Err(ProxyError::IdleTimeout(d)) if d == Duration::from_secs(5)));

        let mut rest = Vec::new();
        client_peer.read_to_end(&mut rest).await.unwrap();
        assert!(rest.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_activity_postpones_idle_timeout() {
        let (client, mut client_peer) = duplex(64);
        let (remote, mut remote_peer) = duplex(64);
        let counters = TransferCounters::default();

        let chatter = async {
            for _ in 0..4 {
                tokio::time::sleep(Duration::from_secs(3)).await;
                client_peer.write_all(b"x").await.unwrap();
                let mut buf = [0u8; 1];
                remote_peer.read_exact(&mut buf).await.unwrap();
            }
            (client_peer, remote_peer)
        };

        let started = Instant::now();
        let (result, _peers) = tokio::join!(
            relay(client, remote, 16, Duration::from_secs(5), &counters),
            chatter
        );

        // Four writes three seconds apart keep the session alive past 5s
        assert!(matches!(result, Err(ProxyError::IdleTimeout(_))));
        assert!(started.elapsed() >= Duration::from_secs(17));
        assert_eq!(counters.client_to_remote(), 4);
    }

    #[test]
    fn test_side_display() {
        assert_eq!(Side::Client.to_string(), "client");
        assert_eq!(Side::Remote.to_string(), "remote");
    }
}
