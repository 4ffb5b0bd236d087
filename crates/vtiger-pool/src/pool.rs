//! Available/in-use session bookkeeping
//!
//! Two disjoint collections behind one lock: `available` is a stack (the most
//! recently added or released session is handed out first, keeping fewer
//! sessions hot) and `in_use` holds checked-out names. A release only counts
//! for a name that is still checked out, so a late release can never bring
//! back an evicted session. A short window of recently evicted names also
//! refuses re-adds. After `drain` the pool is closed and stays empty.
//!
//! Every operation is a single short critical section; nothing here awaits.

use std::collections::{HashSet, VecDeque};

use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, info, warn};

#[derive(Debug, Default)]
struct PoolState {
    available: Vec<String>,
    in_use: HashSet<String>,
    /// Most recent evictions of pooled names, oldest first.
    recently_evicted: VecDeque<String>,
    closed: bool,
}

const EVICTED_WINDOW: usize = 64;

/// Point-in-time pool counts. Session names are credentials and are never
/// included.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PoolSnapshot {
    pub available: usize,
    pub in_use: usize,
    pub closed: bool,
}

impl PoolSnapshot {
    /// Sessions the pool still owns, idle or checked out.
    pub fn live(&self) -> usize {
        self.available + self.in_use
    }
}

/// Pool of logged-in session names.
#[derive(Debug, Default)]
pub struct SessionPool {
    state: Mutex<PoolState>,
}

impl SessionPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the pool with sessions that are still valid from a previous run.
    pub fn with_sessions<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let pool = Self::new();
        for name in names {
            pool.add(name);
        }
        pool
    }

    /// Make a freshly logged-in session available.
    ///
    /// Adding a name that is already pooled is a caller bug and only checked
    /// in debug builds. Recently evicted names are refused, as is everything
    /// once the pool is drained.
    pub fn add(&self, name: impl Into<String>) {
        let name = name.into();
        let mut state = self.state.lock();
        if state.closed {
            debug!("add to drained pool ignored");
            return;
        }
        if state.recently_evicted.contains(&name) {
            warn!(session = %name, "refusing to pool an evicted session");
            return;
        }
        debug_assert!(
            !state.available.contains(&name) && !state.in_use.contains(&name),
            "session {name} added twice"
        );
        state.available.push(name);
        publish_available(state.available.len());
    }

    /// Take the most recently pooled session, if any.
    pub fn checkout(&self) -> Option<String> {
        let mut state = self.state.lock();
        let name = state.available.pop()?;
        state.in_use.insert(name.clone());
        publish_available(state.available.len());
        Some(name)
    }

    /// Return a session after use.
    ///
    /// Ignored unless the session is currently checked out, so a late release
    /// can neither resurrect an evicted name nor duplicate an available one.
    pub fn release(&self, name: &str) {
        let mut state = self.state.lock();
        if !state.in_use.remove(name) {
            debug!(session = %name, "release of session not checked out ignored");
            return;
        }
        state.available.push(name.to_string());
        publish_available(state.available.len());
    }

    /// Remove a session for good. Returns whether it was pooled; evicting an
    /// unknown name is a no-op.
    pub fn evict(&self, name: &str) -> bool {
        let mut state = self.state.lock();
        let was_in_use = state.in_use.remove(name);
        let before = state.available.len();
        state.available.retain(|n| n != name);
        let was_available = state.available.len() != before;

        let present = was_in_use || was_available;
        if present {
            if state.recently_evicted.len() == EVICTED_WINDOW {
                state.recently_evicted.pop_front();
            }
            state.recently_evicted.push_back(name.to_string());
            metrics::counter!("vtiger_sessions_evicted_total").increment(1);
            publish_available(state.available.len());
        }
        present
    }

    /// Number of idle sessions.
    pub fn count(&self) -> usize {
        self.state.lock().available.len()
    }

    /// Number of checked-out sessions.
    pub fn in_use_count(&self) -> usize {
        self.state.lock().in_use.len()
    }

    /// Remove every session (shutdown) and return their names. The pool is
    /// closed afterwards: later adds and releases are ignored.
    pub fn drain(&self) -> Vec<String> {
        let mut state = self.state.lock();
        let mut names: Vec<String> = state.available.drain(..).collect();
        names.extend(state.in_use.drain());
        state.recently_evicted.clear();
        state.closed = true;
        publish_available(0);
        info!(sessions = names.len(), "session pool drained");
        names
    }

    /// Counts for health reporting, taken under one lock.
    pub fn snapshot(&self) -> PoolSnapshot {
        let state = self.state.lock();
        PoolSnapshot {
            available: state.available.len(),
            in_use: state.in_use.len(),
            closed: state.closed,
        }
    }

    #[cfg(test)]
    fn assert_consistent(&self) {
        let state = self.state.lock();
        let unique: HashSet<&String> = state.available.iter().collect();
        assert_eq!(unique.len(), state.available.len(), "duplicate in available");
        for name in &state.available {
            assert!(!state.in_use.contains(name), "{name} both available and in use");
            assert!(
                !state.recently_evicted.contains(name),
                "{name} evicted but available"
            );
        }
        for name in &state.in_use {
            assert!(
                !state.recently_evicted.contains(name),
                "{name} evicted but in use"
            );
        }
        assert!(state.recently_evicted.len() <= EVICTED_WINDOW);
        if state.closed {
            assert!(state.available.is_empty() && state.in_use.is_empty());
        }
    }

    #[cfg(test)]
    fn tracked_evictions(&self) -> usize {
        self.state.lock().recently_evicted.len()
    }
}

fn publish_available(count: usize) {
    metrics::gauge!("vtiger_pool_available").set(count as f64);
}
