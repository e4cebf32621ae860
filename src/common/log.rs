//! Logging helpers
//!
//! Thin wrapper around `env_logger` so the binary and tests share one setup path.

/// Initialize the global logger
///
/// `RUST_LOG` takes precedence over `level` when set.
///
/// # Parameters
///
/// * `level` - Log filter used when `RUST_LOG` is absent (e.g. `info`, `tls_forwarder=debug`)
pub fn init_logger(level: &str) {
    let env = env_logger::Env::default()
        .filter_or("RUST_LOG", level);

    // A logger may already be installed (tests, embedding applications)
    let _ = env_logger::Builder::from_env(env)
        .format_timestamp_millis()
        .try_init();
}
