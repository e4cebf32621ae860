//! Network utility functions
//!
//! This module provides the `Endpoint` type: a validated `host:port` pair
//! used both for the local listening address and the remote TLS server.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::SocketAddr;
use std::str::FromStr;

use super::error::{ProxyError, Result};

/// Separator between host and port
const SEPARATOR: char = ':';

/// Host used when the local endpoint leaves the host empty
const UNSPECIFIED_HOST: &str = "0.0.0.0";

/// A validated `host:port` pair
///
/// Endpoints are immutable once parsed. The host is kept exactly as written;
/// it may be a DNS name or an IPv4 literal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Endpoint {
    host: String,
    port: u16,
}

impl Endpoint {
    /// Parse an endpoint from `host:port`
    ///
    /// # Errors
    ///
    /// * `ProxyError::InvalidAddressFormat` if the string is not exactly one
    ///   `host` and one `port` segment
    /// * `ProxyError::InvalidPort` if the port is not an integer in 1..=65535
    pub fn parse(addr: &str) -> Result<Self> {
        let mut parts = addr.split(SEPARATOR);
        let (host, port) = match (parts.next(), parts.next(), parts.next()) {
            (Some(host), Some(port), None) => (host, port),
            _ => return Err(ProxyError::InvalidAddressFormat(addr.to_string())),
        };

        let port = match port.parse::<u16>() {
            Ok(port) if port >= 1 => port,
            _ => return Err(ProxyError::InvalidPort(port.to_string())),
        };

        Ok(Self {
            host: host.to_string(),
            port,
        })
    }

    /// Host part, exactly as given
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Port part
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Host to hand to the resolver when binding
    fn bind_host(&self) -> &str {
        if self.host.is_empty() {
            UNSPECIFIED_HOST
        } else {
            &self.host
        }
    }

    /// Resolve to the first socket address reported by the system resolver
    pub async fn resolve(&self) -> Result<SocketAddr> {
        let mut addrs = tokio::net::lookup_host((self.bind_host(), self.port))
            .await
            .map_err(|e| ProxyError::Config(format!("Failed to resolve {}: {}", self, e)))?;

        addrs
            .next()
            .ok_or_else(|| ProxyError::Config(format!("No addresses found for {}", self)))
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.host, SEPARATOR, self.port)
    }
}

impl FromStr for Endpoint {
    type Err = ProxyError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Endpoint {
    type Error = ProxyError;

    fn try_from(value: String) -> std::result::Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Endpoint> for String {
    fn from(endpoint: Endpoint) -> Self {
        endpoint.to_string()
    }
}
