//! TLS client side: connector construction and per-session handshake

use log::info;
use openssl::ssl::{SslConnector, SslMethod, SslVersion};
use openssl::x509::X509VerifyResult;
use std::path::Path;
use std::pin::Pin;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_openssl::SslStream;

use crate::common::{ProxyError, Result};

/// Create the TLS connector shared by all sessions
///
/// The system trust store is always loaded. `ca_file`, when given, adds
/// extra PEM trust anchors on top of it. Peer verification and hostname
/// checks are always on.
///
/// # Example
///
/// ```no_run
/// # use tls_forwarder::tls::create_tls_connector;
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let connector = create_tls_connector(None)?;
/// # Ok(())
/// # }
/// ```
pub fn create_tls_connector(ca_file: Option<&Path>) -> Result<SslConnector> {
    let mut builder = SslConnector::builder(SslMethod::tls_client())?;
    builder.set_min_proto_version(Some(SslVersion::TLS1_2))?;

    if let Some(ca_file) = ca_file {
        info!("Trusting additional CA certificates from {}", ca_file.display());
        builder.set_ca_file(ca_file)?;
    }

    Ok(builder.build())
}

/// Run the TLS client handshake over an established transport
///
/// `server_name` is sent as SNI (for DNS names) and checked against the
/// certificate presented by the server. IP literals are matched against
/// IP subject alternative names.
///
/// # Errors
///
/// Returns `ProxyError::TlsHandshake` if the handshake or certificate
/// verification fails.
pub async fn connect<S>(
    connector: &SslConnector,
    server_name: &str,
    transport: S,
) -> Result<SslStream<S>>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let ssl = connector.configure()?.into_ssl(server_name)?;
    let mut stream = SslStream::new(ssl, transport)?;

    if let Err(e) = Pin::new(&mut stream).connect().await {
        let verify_result = stream.ssl().verify_result();
        let message = if verify_result == X509VerifyResult::OK {
            e.to_string()
        } else {
            format!("{} (certificate verification: {})", e, verify_result)
        };
        return Err(ProxyError::TlsHandshake(message));
    }

    Ok(stream)
}
