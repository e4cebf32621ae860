//! Session counters
//!
//! Lock-free counters shared between the dispatcher, its session tasks and
//! control handles. Values are mirrored to the `metrics` facade.

use metrics::{counter, gauge};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

/// Snapshot of the dispatcher's session counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ForwarderStats {
    /// Sessions currently running
    pub active_sessions: usize,
    /// Sessions started since the forwarder began accepting
    pub total_sessions: u64,
    /// Sessions that ended with an error (connect, handshake, I/O, timeout)
    pub failed_sessions: u64,
}

/// Live counters behind `ForwarderStats`
#[derive(Debug, Default)]
pub struct SessionStats {
    active: AtomicUsize,
    total: AtomicU64,
    failed: AtomicU64,
}

impl SessionStats {
    /// Record a new session; the returned guard records its end when dropped
    pub fn session_started(self: &Arc<Self>) -> SessionGuard {
        self.total.fetch_add(1, Ordering::Relaxed);
        self.active.fetch_add(1, Ordering::Relaxed);
        counter!("tls_forwarder.sessions.total").increment(1);
        gauge!("tls_forwarder.sessions.active").increment(1.0);

        SessionGuard {
            stats: Arc::clone(self),
        }
    }

    /// Number of sessions currently running
    pub fn active(&self) -> usize {
        self.active.load(Ordering::Relaxed)
    }

    /// Current values of all counters
    pub fn snapshot(&self) -> ForwarderStats {
        ForwarderStats {
            active_sessions: self.active.load(Ordering::Relaxed),
            total_sessions: self.total.load(Ordering::Relaxed),
            failed_sessions: self.failed.load(Ordering::Relaxed),
        }
    }
}

/// Marks one session as active for as long as it lives
///
/// Dropping the guard decrements the active count, also when the session
/// task panics or is aborted.
#[derive(Debug)]
pub struct SessionGuard {
    stats: Arc<SessionStats>,
}

impl SessionGuard {
    /// Record that this session ended with an error
    pub fn mark_failed(&self) {
        self.stats.failed.fetch_add(1, Ordering::Relaxed);
        counter!("tls_forwarder.sessions.failed").increment(1);
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        self.stats.active.fetch_sub(1, Ordering::Relaxed);
        gauge!("tls_forwarder.sessions.active").decrement(1.0);
    }
}
