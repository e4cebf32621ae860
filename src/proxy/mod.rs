//! Proxy service module
//!
//! This module implements the forwarding core: the listener/dispatcher,
//! the per-session handler and the bidirectional relay.
//!
//! Every accepted client gets its own task. Sessions share no mutable state
//! except the atomic counters behind `ForwarderStats`, and a failing session
//! never affects the dispatcher or other sessions.

mod forwarder;
mod handler;
mod message;
mod server;
mod stats;

pub use forwarder::{relay, Side, TransferCounters};
pub use handler::handle_connection;
pub use message::{ForwarderHandle, ForwarderMessage};
pub use server::Forwarder;
pub use stats::ForwarderStats;
