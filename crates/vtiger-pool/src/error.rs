//! Error types for pool and dispatch operations

use webservice::TransportError;

/// Errors surfaced to callers of the dispatcher.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("authentication failed: {0}")]
    Authentication(String),

    #[error("malformed response ({context}): {body}")]
    MalformedResponse { context: String, body: String },

    #[error("{entity} {operation}: session still invalid after {attempts} attempts")]
    SessionInvalid {
        entity: String,
        operation: String,
        attempts: u32,
    },

    #[error("{entity} {operation} failed ({code}): {message}")]
    RemoteOperation {
        entity: String,
        operation: String,
        code: String,
        message: String,
    },

    #[error("no session available after {attempts} attempts")]
    PoolExhausted { attempts: u32 },

    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("unknown entity type: {0}")]
    UnknownEntity(String),
}

impl From<vtiger_auth::Error> for Error {
    fn from(e: vtiger_auth::Error) -> Self {
        match e {
            vtiger_auth::Error::Transport(t) => Error::Transport(t),
            vtiger_auth::Error::MalformedResponse { operation, body } => Error::MalformedResponse {
                context: operation,
                body,
            },
            other @ (vtiger_auth::Error::ChallengeRejected { .. }
            | vtiger_auth::Error::LoginRejected { .. }
            | vtiger_auth::Error::Authentication(_)) => Error::Authentication(other.to_string()),
        }
    }
}

/// Result alias for pool operations.
pub type Result<T> = std::result::Result<T, Error>;
