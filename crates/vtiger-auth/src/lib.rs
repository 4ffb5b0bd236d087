//! vtiger webservice authentication
//!
//! The remote service authenticates in two steps:
//! 1. `getchallenge` returns a short-lived token for a username
//! 2. `login` exchanges `md5(token + password)` for a session name
//!
//! This crate provides both calls, the access-key derivation, and the
//! `TokenStore` that caches the challenge token and guarantees at most one
//! challenge request is in flight at a time. Session pooling lives in
//! `vtiger-pool`.

pub mod access_key;
pub mod challenge;
pub mod constants;
pub mod error;
pub mod store;
pub mod token;

pub use access_key::compute_access_key;
pub use challenge::{ChallengeResponse, LoginResponse, login, request_challenge};
pub use constants::*;
pub use error::{Error, Result};
pub use store::TokenStore;
pub use token::Token;
