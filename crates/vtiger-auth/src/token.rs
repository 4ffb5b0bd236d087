//! Challenge token with an absolute local expiry
//!
//! The server reports `expireTime` and `serverTime` on its own clock. Only the
//! difference is trusted: it is added to the local wall clock once, at fetch
//! time, to produce `expires_at`.

use std::fmt;
use std::time::{Duration, SystemTime};

use crate::challenge::ChallengeResponse;

/// A challenge token. Valid strictly before `expires_at`.
#[derive(Clone, PartialEq, Eq)]
pub struct Token {
    value: String,
    issued_at: SystemTime,
    expires_at: SystemTime,
}

impl Token {
    pub fn new(value: impl Into<String>, issued_at: SystemTime, lifetime: Duration) -> Self {
        Self {
            value: value.into(),
            issued_at,
            expires_at: issued_at + lifetime,
        }
    }

    /// Build a token from a challenge response received at `now`.
    pub fn from_challenge(challenge: &ChallengeResponse, now: SystemTime) -> Self {
        Self::new(challenge.token.clone(), now, challenge.lifetime())
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn issued_at(&self) -> SystemTime {
        self.issued_at
    }

    pub fn expires_at(&self) -> SystemTime {
        self.expires_at
    }

    /// Validity at an arbitrary instant. Expiry is inclusive.
    pub fn is_valid_at(&self, now: SystemTime) -> bool {
        now < self.expires_at
    }

    pub fn is_valid(&self) -> bool {
        self.is_valid_at(SystemTime::now())
    }

    /// Time left before expiry, zero once expired.
    pub fn remaining(&self) -> Duration {
        self.expires_at
            .duration_since(SystemTime::now())
            .unwrap_or_default()
    }
}

// Tokens are short-lived credentials: only a prefix is ever printed.
impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let prefix: String = self.value.chars().take(4).collect();
        f.debug_struct("Token")
            .field("value", &format_args!("{prefix}..."))
            .field("issued_at", &self.issued_at)
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(secs: u64) -> SystemTime {
        SystemTime::UNIX_EPOCH + Duration::from_secs(secs)
    }

    #[test]
    fn valid_before_expiry_invalid_at_and_after() {
        let token = Token::new("abc", at(1_000), Duration::from_secs(300));

        assert!(token.is_valid_at(at(1_000)));
        assert!(token.is_valid_at(at(1_299)));
        assert!(token.is_valid_at(at(1_300) - Duration::from_millis(1)));
        assert!(!token.is_valid_at(at(1_300)), "expiry boundary is inclusive");
        assert!(!token.is_valid_at(at(5_000)));
    }

    #[test]
    fn from_challenge_uses_server_offset_not_server_clock() {
        let challenge = ChallengeResponse {
            token: "tok".into(),
            // Server clock far in the future; only the 60s offset matters
            expire_time: 4_000_000_060,
            server_time: 4_000_000_000,
        };
        let token = Token::from_challenge(&challenge, at(100));
        assert_eq!(token.value(), "tok");
        assert_eq!(token.issued_at(), at(100));
        assert_eq!(token.expires_at(), at(160));
    }

    #[test]
    fn zero_lifetime_is_born_expired() {
        let token = Token::new("abc", at(50), Duration::ZERO);
        assert!(!token.is_valid_at(at(50)));
    }

    #[test]
    fn fresh_token_reports_remaining_time() {
        let token = Token::new("abc", SystemTime::now(), Duration::from_secs(300));
        assert!(token.is_valid());
        assert!(token.remaining() > Duration::from_secs(290));

        let stale = Token::new("abc", at(0), Duration::from_secs(1));
        assert_eq!(stale.remaining(), Duration::ZERO);
    }

    #[test]
    fn debug_shows_only_prefix() {
        let token = Token::new("5f0c9a77e1b2", at(0), Duration::from_secs(1));
        let debug = format!("{token:?}");
        assert!(debug.contains("5f0c..."), "got: {debug}");
        assert!(!debug.contains("5f0c9a77e1b2"), "token leaked: {debug}");
    }
}
