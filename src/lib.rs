//! TLS Forwarder: plain TCP in, TLS out
//!
//! This library implements a forwarding proxy that accepts plaintext TCP
//! connections on a local address and relays each one, byte for byte, to a
//! fixed remote server over TLS. The remote certificate is verified against
//! the system trust store (plus an optional extra CA bundle) and the remote
//! host name.
//!
//! # Main Features
//!
//! - One task per client, one remote TLS connection per client
//! - Concurrent bidirectional relay with an idle timeout
//! - Per-session error isolation
//! - Graceful shutdown that drains in-flight sessions
//!
//! # Example
//!
//! ```no_run
//! use tls_forwarder::{Forwarder, ForwarderConfig, Result, create_tls_connector};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let config = ForwarderConfig::from_endpoints("127.0.0.1:8080", "example.com:443")?;
//!     config.validate()?;
//!
//!     let connector = create_tls_connector(config.ca_file.as_deref())?;
//!     let forwarder = Forwarder::bind(&config, connector).await?;
//!
//!     let (handle, task) = forwarder.start();
//!     tokio::signal::ctrl_c().await?;
//!     handle.shutdown().await?;
//!     task.await.expect("dispatcher panicked")?;
//!
//!     Ok(())
//! }
//! ```

// Public modules
pub mod common;
pub mod config;
pub mod proxy;
pub mod tls;

// Re-export commonly used structures and functions for convenience
pub use common::{Endpoint, ProxyError, Result};
pub use config::ForwarderConfig;
pub use proxy::{Forwarder, ForwarderHandle, ForwarderStats};
pub use tls::create_tls_connector;

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");
