//! Configuration module
//!
//! This module handles application configuration: centralized defaults,
//! loading from a JSON file, merging sources by priority and validation.

mod defaults;
mod error;
mod merger;
mod validator;

pub use self::defaults::MAX_BUFFER_SIZE;
pub use self::error::ConfigError;
pub use self::merger::{ConfigMerger, ConfigOverrides};
pub use self::validator::validate_config;

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::common::{Endpoint, Result};

/// Forwarder configuration
///
/// Every field has a default so partial JSON files are accepted. The two
/// endpoints have no sensible default and must be supplied by some source.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
#[serde(default)]
pub struct ForwarderConfig {
    // --- Network settings ---

    /// Local address to accept plaintext connections on (host:port)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub local: Option<Endpoint>,

    /// Remote TLS server to forward to (host:port)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote: Option<Endpoint>,

    /// Additional PEM trust anchors, on top of the system store
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ca_file: Option<PathBuf>,

    // --- Session settings ---

    /// Relay chunk size in bytes
    #[serde(default = "defaults::buffer_size")]
    pub buffer_size: usize,

    /// Seconds without traffic in either direction before a session is dropped
    #[serde(default = "defaults::idle_timeout")]
    pub idle_timeout: u64,

    /// Seconds allowed for the remote TCP connect plus TLS handshake
    #[serde(default = "defaults::connect_timeout")]
    pub connect_timeout: u64,

    /// Seconds to wait for in-flight sessions when shutting down
    #[serde(default = "defaults::shutdown_timeout")]
    pub shutdown_timeout: u64,

    // --- General settings ---

    /// Log level (error, warn, info, debug, trace) or a full `RUST_LOG` filter
    #[serde(default = "defaults::log_level")]
    pub log_level: String,
}

impl Default for ForwarderConfig {
    #[inline]
    fn default() -> Self {
        Self {
            local: None,
            remote: None,
            ca_file: None,
            buffer_size: defaults::buffer_size(),
            idle_timeout: defaults::idle_timeout(),
            connect_timeout: defaults::connect_timeout(),
            shutdown_timeout: defaults::shutdown_timeout(),
            log_level: defaults::log_level(),
        }
    }
}

impl AsRef<ForwarderConfig> for ForwarderConfig {
    #[inline]
    fn as_ref(&self) -> &ForwarderConfig {
        self
    }
}

/// Settings every session needs, fixed at startup
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSettings {
    /// Relay chunk size in bytes
    pub buffer_size: usize,
    /// Maximum time without a completed read on either side
    pub idle_timeout: Duration,
    /// Bound on remote connect plus handshake
    pub connect_timeout: Duration,
}

impl Default for SessionSettings {
    fn default() -> Self {
        ForwarderConfig::default().session_settings()
    }
}

impl ForwarderConfig {
    /// Build a configuration from the two endpoint strings
    ///
    /// # Errors
    ///
    /// Returns the Address Resolver error for whichever endpoint is malformed.
    pub fn from_endpoints(local: &str, remote: &str) -> Result<Self> {
        Ok(Self {
            local: Some(local.parse()?),
            remote: Some(remote.parse()?),
            ..Self::default()
        })
    }

    /// Load a configuration from a JSON file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(ConfigError::FileNotFound(path.to_path_buf()).into());
        }

        let content = fs::read_to_string(path)
            .map_err(|e| ConfigError::FileReadError(path.to_path_buf(), e.to_string()))?;

        let config: Self = serde_json::from_str(&content).map_err(ConfigError::from)?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        validate_config(self)?;
        Ok(())
    }

    /// Local endpoint, or an error if no source provided one
    pub fn local(&self) -> Result<&Endpoint> {
        self.local
            .as_ref()
            .ok_or_else(|| ConfigError::MissingRequiredValue("local".to_string()).into())
    }

    /// Remote endpoint, or an error if no source provided one
    pub fn remote(&self) -> Result<&Endpoint> {
        self.remote
            .as_ref()
            .ok_or_else(|| ConfigError::MissingRequiredValue("remote".to_string()).into())
    }

    /// Idle timeout as a `Duration`
    #[inline]
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout)
    }

    /// Connect timeout as a `Duration`
    #[inline]
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout)
    }

    /// Shutdown drain timeout as a `Duration`
    #[inline]
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout)
    }

    /// Per-session settings derived from this configuration
    pub fn session_settings(&self) -> SessionSettings {
        SessionSettings {
            buffer_size: self.buffer_size,
            idle_timeout: self.idle_timeout(),
            connect_timeout: self.connect_timeout(),
        }
    }
}
