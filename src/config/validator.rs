//! Configuration validator
//!
//! This module provides functionality for validating configuration.

use log::warn;

use crate::config::defaults::MAX_BUFFER_SIZE;
use crate::config::error::{ConfigError, Result};
use crate::config::ForwarderConfig;

/// Validate the configuration
pub fn validate_config(config: &ForwarderConfig) -> Result<()> {
    validate_network_settings(config)?;
    validate_session_settings(config)?;
    validate_general_settings(config);

    Ok(())
}

/// Validate network settings
fn validate_network_settings(config: &ForwarderConfig) -> Result<()> {
    let local = config
        .local
        .as_ref()
        .ok_or_else(|| ConfigError::MissingRequiredValue("local".to_string()))?;
    let remote = config
        .remote
        .as_ref()
        .ok_or_else(|| ConfigError::MissingRequiredValue("remote".to_string()))?;

    // The remote host doubles as the TLS server name
    if remote.host().is_empty() {
        return Err(ConfigError::InvalidValue(
            "remote".to_string(),
            "Remote host must not be empty".to_string(),
        ));
    }

    if local == remote {
        return Err(ConfigError::InvalidCombination(
            "Local and remote addresses must be different".to_string(),
        ));
    }

    if let Some(ca_file) = &config.ca_file {
        if !ca_file.is_file() {
            return Err(ConfigError::FileNotFound(ca_file.clone()));
        }
    }

    Ok(())
}

/// Validate relay and timeout settings
fn validate_session_settings(config: &ForwarderConfig) -> Result<()> {
    if config.buffer_size == 0 || config.buffer_size > MAX_BUFFER_SIZE {
        return Err(ConfigError::InvalidValue(
            "buffer_size".to_string(),
            format!("Buffer size must be between 1 and {} bytes", MAX_BUFFER_SIZE),
        ));
    }

    for (name, value) in [
        ("idle_timeout", config.idle_timeout),
        ("connect_timeout", config.connect_timeout),
        ("shutdown_timeout", config.shutdown_timeout),
    ] {
        if value == 0 {
            return Err(ConfigError::InvalidValue(
                name.to_string(),
                "Timeout must be greater than 0".to_string(),
            ));
        }
    }

    Ok(())
}

/// Validate general settings
fn validate_general_settings(config: &ForwarderConfig) {
    // Anything else is handed to env_logger as a filter expression
    if config.log_level.trim().is_empty() {
        warn!("Empty log level, logging falls back to RUST_LOG or errors only");
    }
}
