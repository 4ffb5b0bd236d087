//! Shared types for the vtiger gateway workspace
//!
//! Holds the pieces every crate needs without pulling in any network stack:
//! the redacting `Secret` wrapper, the fixed-interval `RetryPolicy`, and the
//! configuration-level error type.

mod error;
mod retry;
mod secret;

pub use error::{Error, Result};
pub use retry::RetryPolicy;
pub use secret::Secret;
