//! Error handling module
//!
//! This module defines the error types and result type aliases used in the application.

use std::io;
use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;

/// TLS forwarder error type
#[derive(Error, Debug)]
pub enum ProxyError {
    /// Endpoint string is not a single `host:port` pair
    #[error("Invalid address format: {0}. Use format 'host:port'")]
    InvalidAddressFormat(String),

    /// Port segment is not a number in 1..=65535
    #[error("Invalid port: {0}. Must be a number between 1 and 65535")]
    InvalidPort(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Listening socket could not be set up
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    /// TCP connection to the remote endpoint failed
    #[error("Failed to connect to {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: io::Error,
    },

    /// OpenSSL error
    #[error("OpenSSL error: {0}")]
    Ssl(#[from] openssl::error::ErrorStack),

    /// TLS handshake error
    #[error("TLS handshake error: {0}")]
    TlsHandshake(String),

    /// Remote connect and handshake did not finish in time
    #[error("Remote connection timed out after {0:?}")]
    ConnectTimeout(Duration),

    /// Neither side of a session produced data in time
    #[error("Session idle for {0:?}")]
    IdleTimeout(Duration),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Other error
    #[error("Other error: {0}")]
    Other(String),
}

impl ProxyError {
    /// Whether this error can only happen while a session is running.
    ///
    /// The dispatcher logs these as warnings; anything else ending a session
    /// is logged as an error.
    pub fn is_session_error(&self) -> bool {
        matches!(
            self,
            Self::Connect { .. }
                | Self::TlsHandshake(_)
                | Self::ConnectTimeout(_)
                | Self::IdleTimeout(_)
                | Self::Io(_)
        )
    }
}

/// Result type alias
///
/// This is a `Result` type alias that uses our custom `ProxyError`.
pub type Result<T> = std::result::Result<T, ProxyError>;
