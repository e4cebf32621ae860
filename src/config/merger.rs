//! Configuration merging functionality
//!
//! This module provides functionality for merging configurations from different sources.

use std::path::PathBuf;

use crate::common::Endpoint;
use crate::config::ForwarderConfig;

/// Trait for merging configurations
pub trait ConfigMerger {
    /// Merge another configuration into this one
    ///
    /// Values from `other` override values in `self` when they are set
    /// (`Option` fields) or differ from the defaults (everything else).
    /// Merging lower priority sources first yields the final configuration.
    fn merge(&self, other: impl AsRef<Self>) -> Self where Self: Sized;
}

impl ConfigMerger for ForwarderConfig {
    fn merge(&self, other: impl AsRef<Self>) -> Self {
        let other = other.as_ref();
        let default = Self::default();

        fn merge_field<T: Clone + PartialEq>(self_val: &T, other_val: &T, default_val: &T) -> T {
            if other_val != default_val {
                other_val.clone()
            } else {
                self_val.clone()
            }
        }

        fn merge_option<T: Clone>(self_val: &Option<T>, other_val: &Option<T>) -> Option<T> {
            other_val.clone().or_else(|| self_val.clone())
        }

        Self {
            local: merge_option(&self.local, &other.local),
            remote: merge_option(&self.remote, &other.remote),
            ca_file: merge_option(&self.ca_file, &other.ca_file),
            buffer_size: merge_field(&self.buffer_size, &other.buffer_size, &default.buffer_size),
            idle_timeout: merge_field(&self.idle_timeout, &other.idle_timeout, &default.idle_timeout),
            connect_timeout: merge_field(
                &self.connect_timeout,
                &other.connect_timeout,
                &default.connect_timeout,
            ),
            shutdown_timeout: merge_field(
                &self.shutdown_timeout,
                &other.shutdown_timeout,
                &default.shutdown_timeout,
            ),
            log_level: merge_field(&self.log_level, &other.log_level, &default.log_level),
        }
    }
}

/// Values given explicitly by the environment or the command line
///
/// A `Some` field always wins over the merged configuration, even when it
/// equals the built-in default.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigOverrides {
    pub local: Option<Endpoint>,
    pub remote: Option<Endpoint>,
    pub ca_file: Option<PathBuf>,
    pub buffer_size: Option<usize>,
    pub idle_timeout: Option<u64>,
    pub connect_timeout: Option<u64>,
    pub shutdown_timeout: Option<u64>,
    pub log_level: Option<String>,
}

impl ForwarderConfig {
    /// Apply explicitly given values on top of this configuration
    pub fn with_overrides(&self, overrides: &ConfigOverrides) -> Self {
        let config = self.clone();
        Self {
            local: overrides.local.clone().or(config.local),
            remote: overrides.remote.clone().or(config.remote),
            ca_file: overrides.ca_file.clone().or(config.ca_file),
            buffer_size: overrides.buffer_size.unwrap_or(config.buffer_size),
            idle_timeout: overrides.idle_timeout.unwrap_or(config.idle_timeout),
            connect_timeout: overrides.connect_timeout.unwrap_or(config.connect_timeout),
            shutdown_timeout: overrides.shutdown_timeout.unwrap_or(config.shutdown_timeout),
            log_level: overrides.log_level.clone().unwrap_or(config.log_level),
        }
    }
}
