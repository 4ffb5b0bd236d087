//! Dispatcher settings and credentials

use std::time::Duration;

use common::{RetryPolicy, Secret};
use serde::Deserialize;

/// When the initial bulk login happens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WarmUpMode {
    /// `Dispatcher::start` logs in the whole pool before returning.
    #[default]
    Eager,
    /// `start` returns at once; the first checkout performs the warm-up.
    Lazy,
}

impl WarmUpMode {
    pub fn label(&self) -> &'static str {
        match self {
            WarmUpMode::Eager => "eager",
            WarmUpMode::Lazy => "lazy",
        }
    }
}

/// Login identity for the webservice user.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub username: String,
    /// The user's webservice access key, used as the hash secret at login
    pub password: Secret<String>,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: Secret::new(password.into()),
        }
    }
}

/// Limits and sizes for one dispatcher.
///
/// The checkout bound and the invalid-session bound are independent: the
/// first limits how long a caller waits for a session, the second how many
/// sessions one call may burn through.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatcherConfig {
    /// Sessions created by warm-up
    pub pool_size: usize,
    /// Attempts and spacing for acquiring a session
    pub checkout: RetryPolicy,
    /// Attempts and spacing while another caller fetches the challenge token
    pub token: RetryPolicy,
    /// Token + login cycles per new session before giving up
    pub max_login_attempts: u32,
    /// Fresh sessions tried after `INVALID_SESSIONID` before giving up
    pub max_invalid_session_retries: u32,
    pub warm_up: WarmUpMode,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            pool_size: 2,
            checkout: RetryPolicy::new(10, Duration::from_millis(300)),
            token: RetryPolicy::new(10, Duration::from_millis(500)),
            max_login_attempts: 3,
            max_invalid_session_retries: 3,
            warm_up: WarmUpMode::Eager,
        }
    }
}
