//! Error types for authentication operations

use webservice::TransportError;

/// Errors from the challenge/login handshake.
///
/// `Clone` so a single challenge failure can be handed to every caller that
/// was waiting on the same fetch.
#[derive(Debug, Clone, thiserror::Error)]
pub enum Error {
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("malformed {operation} response: {body}")]
    MalformedResponse { operation: String, body: String },

    #[error("challenge rejected ({code}): {message}")]
    ChallengeRejected { code: String, message: String },

    #[error("login rejected ({code}): {message}")]
    LoginRejected { code: String, message: String },

    #[error("authentication failed: {0}")]
    Authentication(String),
}

/// Result alias for auth operations.
pub type Result<T> = std::result::Result<T, Error>;
