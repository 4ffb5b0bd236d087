//! Session pool and authenticated request dispatcher for vtiger
//!
//! Keeps a pool of logged-in session names, hands them out to concurrent
//! callers, and recovers when the remote service reports a session invalid.
//! The challenge token and login calls come from `vtiger-auth`; the network
//! goes through any `webservice::Transport`.
//!
//! Session lifecycle:
//! 1. `Dispatcher::start` warms the pool with N parallel logins (or defers to
//!    the first caller in lazy mode)
//! 2. `execute` checks out a session (LIFO), logging in a new one when the
//!    pool is empty, with a bounded fixed-interval retry
//! 3. The call succeeds or fails normally → session released back to the pool
//! 4. The call reports `INVALID_SESSIONID` → session evicted, call retried on
//!    a fresh session up to a configured bound
//! 5. `shutdown` drains the pool

pub mod config;
pub mod dispatcher;
pub mod error;
pub mod lease;
pub mod pool;

pub use config::{Credentials, DispatcherConfig, WarmUpMode};
pub use dispatcher::Dispatcher;
pub use error::{Error, Result};
pub use lease::SessionLease;
pub use pool::{PoolSnapshot, SessionPool};
