//! TLS handling module
//!
//! This module builds the client-side TLS context and performs the
//! handshake toward the remote server for each session.

mod connector;

pub use connector::{connect, create_tls_connector};
