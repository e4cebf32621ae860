//! Forwarder control messages
//!
//! The dispatcher owns its listener and session set; other tasks talk to it
//! only through messages sent over a `ForwarderHandle`.

use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};

use super::stats::{ForwarderStats, SessionStats};
use crate::common::{ProxyError, Result};

/// Capacity of the control channel
const CHANNEL_CAPACITY: usize = 16;

/// Messages that can be sent to the dispatcher
#[derive(Debug)]
pub enum ForwarderMessage {
    /// Report the current session counters
    Stats {
        /// Response channel
        response: oneshot::Sender<ForwarderStats>,
    },
    /// Stop accepting, release the listener and drain in-flight sessions
    Shutdown,
}

/// Forwarder control handle
///
/// Cheap to clone. Dropping every handle shuts the forwarder down like
/// `shutdown` does.
#[derive(Debug, Clone)]
pub struct ForwarderHandle {
    sender: mpsc::Sender<ForwarderMessage>,
    stats: Arc<SessionStats>,
}

impl ForwarderHandle {
    /// Send a message to the dispatcher
    pub async fn send(&self, message: ForwarderMessage) -> Result<()> {
        self.sender
            .send(message)
            .await
            .map_err(|_| ProxyError::Other("Forwarder is no longer running".to_string()))
    }

    /// Ask the dispatcher to shut down
    ///
    /// Returns once the request is queued; await the dispatcher's
    /// `JoinHandle` to know when draining has finished.
    pub async fn shutdown(&self) -> Result<()> {
        self.send(ForwarderMessage::Shutdown).await
    }

    /// Session counters as seen by the dispatcher
    pub async fn stats(&self) -> Result<ForwarderStats> {
        let (response, rx) = oneshot::channel();
        self.send(ForwarderMessage::Stats { response }).await?;
        rx.await
            .map_err(|_| ProxyError::Other("Forwarder dropped the stats request".to_string()))
    }

    /// Number of sessions currently running, without a round trip
    pub fn active_sessions(&self) -> usize {
        self.stats.active()
    }
}

/// Create a control channel bound to the given counters
pub(crate) fn create_channel(
    stats: Arc<SessionStats>,
) -> (ForwarderHandle, mpsc::Receiver<ForwarderMessage>) {
    let (sender, rx) = mpsc::channel(CHANNEL_CAPACITY);
    (ForwarderHandle { sender, stats }, rx)
}
