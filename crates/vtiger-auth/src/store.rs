//! Process-local cache for the challenge token
//!
//! Holds at most one token. A compare-and-set "asking" flag ensures only one
//! challenge request is in flight; other callers poll at a fixed interval
//! until the token appears, the in-flight fetch fails (they get the same
//! error), or their attempt budget runs out.
//!
//! No lock is held across the network call. The flag is cleared by a drop
//! guard so a cancelled fetch never leaves the store stuck.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::SystemTime;

use common::RetryPolicy;
use parking_lot::Mutex;
use tracing::{debug, info, warn};
use webservice::Transport;

use crate::challenge::request_challenge;
use crate::error::{Error, Result};
use crate::token::Token;

/// Challenge token cache shared by every login of one dispatcher.
pub struct TokenStore {
    transport: Arc<dyn Transport>,
    username: String,
    policy: RetryPolicy,
    slot: Mutex<Option<Token>>,
    asking: AtomicBool,
    /// Number of fetches that ran to completion (success or failure).
    completed_fetches: AtomicU64,
    /// Failure of the most recent completed fetch, keyed by its sequence number.
    last_failure: Mutex<Option<(u64, Error)>>,
}

/// Clears the asking flag when the fetching caller finishes or is dropped.
struct AskingGuard<'a>(&'a AtomicBool);

impl Drop for AskingGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl TokenStore {
    pub fn new(transport: Arc<dyn Transport>, username: impl Into<String>, policy: RetryPolicy) -> Self {
        Self {
            transport,
            username: username.into(),
            policy,
            slot: Mutex::new(None),
            asking: AtomicBool::new(false),
            completed_fetches: AtomicU64::new(0),
            last_failure: Mutex::new(None),
        }
    }

    /// Return the cached token, fetching a new one if absent or expired.
    ///
    /// Malformed or rejected challenge responses are returned as is, without
    /// retry. `Error::Authentication` means the budget ran out while another
    /// caller held the fetch.
    pub async fn get_token(&self) -> Result<Token> {
        let mut observed = self.completed_fetches.load(Ordering::Acquire);

        for attempt in self.policy.attempts() {
            if let Some(token) = self.current() {
                return Ok(token);
            }

            if let Some(err) = self.failed_since(&mut observed) {
                return Err(err);
            }

            if let Some(guard) = self.try_ask() {
                return self.fetch_if_absent(guard, &mut observed).await;
            }

            debug!(attempt, "challenge already in flight, waiting");
            if !self.policy.is_last(attempt) {
                tokio::time::sleep(self.policy.interval).await;
            }
        }

        warn!(
            attempts = self.policy.max_attempts,
            "gave up waiting for challenge token"
        );
        Err(Error::Authentication(format!(
            "no challenge token after {} attempts",
            self.policy.max_attempts
        )))
    }

    /// Cached token if still valid. An expired token is cleared here.
    pub fn current(&self) -> Option<Token> {
        let mut slot = self.slot.lock();
        match slot.as_ref().map(Token::is_valid) {
            Some(true) => slot.clone(),
            Some(false) => {
                info!("challenge token expired, clearing");
                *slot = None;
                None
            }
            None => None,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.current().is_some()
    }

    /// Drop the cached token; the next `get_token` issues a new challenge.
    pub fn invalidate(&self) {
        if self.slot.lock().take().is_some() {
            info!("challenge token invalidated");
        }
    }

    /// Drop the cached token only if it is still `used`.
    ///
    /// A login rejected with an old token must not throw away a newer one that
    /// another caller fetched in the meantime.
    pub fn discard(&self, used: &Token) {
        let mut slot = self.slot.lock();
        if slot.as_ref().is_some_and(|current| current.value() == used.value()) {
            *slot = None;
            info!("challenge token discarded after rejected login");
        }
    }

    /// Claim the asking flag. The flag is held until the guard drops.
    fn try_ask(&self) -> Option<AskingGuard<'_>> {
        self.asking
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| AskingGuard(&self.asking))
    }

    /// Failure of a fetch that completed after `observed` and left no token.
    fn failed_since(&self, observed: &mut u64) -> Option<Error> {
        let completed = self.completed_fetches.load(Ordering::Acquire);
        if completed == *observed {
            return None;
        }
        *observed = completed;
        self.failure_of(completed)
    }

    /// Fetch unless another fetch finished between the caller's last check
    /// and winning the flag.
    async fn fetch_if_absent(&self, guard: AskingGuard<'_>, observed: &mut u64) -> Result<Token> {
        if let Some(token) = self.current() {
            return Ok(token);
        }
        if let Some(err) = self.failed_since(observed) {
            return Err(err);
        }
        self.fetch(guard).await
    }

    /// Run one challenge request while holding the asking flag.
    async fn fetch(&self, _guard: AskingGuard<'_>) -> Result<Token> {
        info!(username = %self.username, "requesting challenge token");

        let outcome = request_challenge(self.transport.as_ref(), &self.username)
            .await
            .map(|challenge| Token::from_challenge(&challenge, SystemTime::now()));

        match &outcome {
            Ok(token) => {
                info!(
                    lifetime_secs = token.remaining().as_secs(),
                    "challenge token acquired"
                );
                *self.slot.lock() = Some(token.clone());
            }
            Err(e) => warn!(error = %e, "challenge request failed"),
        }

        // Record the failure before publishing the sequence number so waiters
        // that see the new number always find the matching error.
        let mut last_failure = self.last_failure.lock();
        let seq = self.completed_fetches.load(Ordering::Acquire) + 1;
        *last_failure = outcome.as_ref().err().map(|e| (seq, e.clone()));
        self.completed_fetches.store(seq, Ordering::Release);

        outcome
    }

    fn failure_of(&self, seq: u64) -> Option<Error> {
        match &*self.last_failure.lock() {
            Some((failed, err)) if *failed == seq => Some(err.clone()),
            _ => None,
        }
    }
}
