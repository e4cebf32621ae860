//! Default configuration values
//!
//! Single source of truth for defaults, shared by serde, the CLI and `Default`.

/// Default log level as string
pub const LOG_LEVEL_STR: &str = "info";

/// Largest accepted relay buffer (1 MiB)
pub const MAX_BUFFER_SIZE: usize = 1024 * 1024;

/// Default log level
pub fn log_level() -> String {
    LOG_LEVEL_STR.to_string()
}

/// Default relay chunk size (4KB)
pub fn buffer_size() -> usize {
    4096
}

/// Default idle timeout in seconds
pub fn idle_timeout() -> u64 {
    60
}

/// Default remote connect and TLS handshake timeout in seconds
pub fn connect_timeout() -> u64 {
    30
}

/// Default time allowed for in-flight sessions to finish on shutdown, in seconds
pub fn shutdown_timeout() -> u64 {
    30
}
