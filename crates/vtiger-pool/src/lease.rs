//! RAII handle to a checked-out session
//!
//! A lease ends in exactly one of three ways: `release()`, `evict()`, or drop.
//! Drop counts as release, so a request future cancelled mid-flight (timeout,
//! client disconnect) returns its session instead of leaking it.

use std::sync::Arc;

use tracing::debug;

use crate::pool::SessionPool;

/// A session taken from a `SessionPool`, returned when the lease ends.
#[derive(Debug)]
pub struct SessionLease {
    pool: Arc<SessionPool>,
    name: String,
    settled: bool,
}

impl SessionLease {
    /// Check a session out of `pool`, if one is available.
    pub fn checkout(pool: &Arc<SessionPool>) -> Option<Self> {
        pool.checkout().map(|name| Self {
            pool: Arc::clone(pool),
            name,
            settled: false,
        })
    }

    /// Session name to send as `sessionName`.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Put the session back; it is still usable.
    pub fn release(mut self) {
        self.settled = true;
        self.pool.release(&self.name);
    }

    /// Drop the session for good; the server no longer accepts it.
    pub fn evict(mut self) {
        self.settled = true;
        self.pool.evict(&self.name);
    }
}

impl Drop for SessionLease {
    fn drop(&mut self) {
        if !self.settled {
            debug!(session_prefix = %prefix(&self.name), "lease dropped, releasing session");
            self.pool.release(&self.name);
        }
    }
}

/// Short, log-safe form of a session name.
pub(crate) fn prefix(name: &str) -> &str {
    let end = name
        .char_indices()
        .nth(6)
        .map(|(i, _)| i)
        .unwrap_or(name.len());
    &name[..end]
}
