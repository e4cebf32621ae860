//! Connection handler module
//!
//! This module runs one session: dial the remote server over TLS on behalf
//! of an accepted client, then relay until either side is done.

use log::{debug, info};
use metrics::counter;
use openssl::ssl::SslConnector;
use std::net::SocketAddr;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_openssl::SslStream;

use super::forwarder::{relay, TransferCounters};
use crate::common::{Endpoint, ProxyError, Result};
use crate::config::SessionSettings;
use crate::tls;

/// Handle a single client connection
///
/// The remote connection is opened only after the client has been accepted
/// and is still connected. If connecting or the TLS handshake fails, no data
/// is forwarded and the client connection is closed when this returns.
///
/// # Parameters
///
/// * `client_stream` - Accepted client TCP stream
/// * `client_addr` - Client address, for logging
/// * `remote` - Remote TLS endpoint
/// * `connector` - Shared TLS connector
/// * `settings` - Per-session settings
///
/// # Returns
///
/// Returns `Ok(())` if the session ended because one side closed its stream,
/// otherwise the error that ended it.
pub async fn handle_connection(
    client_stream: TcpStream,
    client_addr: SocketAddr,
    remote: &Endpoint,
    connector: &SslConnector,
    settings: &SessionSettings,
) -> Result<()> {
    // A client that already hung up gets no remote connection
    client_stream.peer_addr()?;

    let remote_stream = timeout(settings.connect_timeout, connect_remote(remote, connector))
        .await
        .map_err(|_| ProxyError::ConnectTimeout(settings.connect_timeout))??;

    {
        let ssl = remote_stream.ssl();
        info!(
            "Connected to {} with TLS for {} ({}, {})",
            remote,
            client_addr,
            ssl.version_str(),
            ssl.current_cipher().map(|c| c.name()).unwrap_or("unknown cipher")
        );
    }

    let counters = TransferCounters::default();
    let result = relay(
        client_stream,
        remote_stream,
        settings.buffer_size,
        settings.idle_timeout,
        &counters,
    )
    .await;

    counter!("tls_forwarder.bytes", "direction" => "client_to_remote")
        .increment(counters.client_to_remote());
    counter!("tls_forwarder.bytes", "direction" => "remote_to_client")
        .increment(counters.remote_to_client());

    let side = result?;
    info!(
        "Session {} -> {} closed by {} ({} bytes sent, {} bytes received)",
        client_addr,
        remote,
        side,
        counters.client_to_remote(),
        counters.remote_to_client()
    );

    Ok(())
}

/// Open the TCP connection to the remote endpoint and run the TLS handshake
async fn connect_remote(remote: &Endpoint, connector: &SslConnector) -> Result<SslStream<TcpStream>> {
    let tcp = TcpStream::connect((remote.host(), remote.port()))
        .await
        .map_err(|source| ProxyError::Connect {
            addr: remote.to_string(),
            source,
        })?;

    debug!("TCP connection to {} established, starting TLS handshake", remote);

    tls::connect(connector, remote.host(), tcp).await
}
