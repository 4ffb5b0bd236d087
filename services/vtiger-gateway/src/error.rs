//! Per-request errors and their HTTP mapping
//!
//! Every failure is answered with
//! `{"error":{"type":"...","message":"...","request_id":"req_..."}}`.

use std::time::Duration;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;
use webservice::TransportError;

use crate::filter::FilterError;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("unsupported operation: {0}")]
    UnsupportedOperation(String),

    #[error("invalid request body: {0}")]
    InvalidBody(String),

    #[error("invalid filter: {0}")]
    InvalidFilter(#[from] FilterError),

    #[error("request timed out after {}s", .0.as_secs())]
    Timeout(Duration),

    #[error(transparent)]
    Dispatch(#[from] vtiger_pool::Error),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        use vtiger_pool::Error as E;
        match self {
            ApiError::UnsupportedOperation(_)
            | ApiError::InvalidBody(_)
            | ApiError::InvalidFilter(_) => StatusCode::BAD_REQUEST,
            ApiError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            ApiError::Dispatch(err) => match err {
                E::UnknownEntity(_) => StatusCode::NOT_FOUND,
                E::RemoteOperation { .. } => StatusCode::UNPROCESSABLE_ENTITY,
                E::PoolExhausted { .. } | E::SessionInvalid { .. } => {
                    StatusCode::SERVICE_UNAVAILABLE
                }
                E::Transport(TransportError::Timeout(_)) => StatusCode::GATEWAY_TIMEOUT,
                E::Authentication(_) | E::MalformedResponse { .. } | E::Transport(_) => {
                    StatusCode::BAD_GATEWAY
                }
            },
        }
    }

    /// Short machine-readable label, also used as the metrics `outcome`.
    pub fn kind(&self) -> &'static str {
        use vtiger_pool::Error as E;
        match self {
            ApiError::UnsupportedOperation(_) => "unsupported_operation",
            ApiError::InvalidBody(_) | ApiError::InvalidFilter(_) => "invalid_request",
            ApiError::Timeout(_) => "timeout",
            ApiError::Dispatch(err) => match err {
                E::UnknownEntity(_) => "unknown_entity",
                E::RemoteOperation { .. } => "remote_error",
                E::PoolExhausted { .. } => "pool_exhausted",
                E::SessionInvalid { .. } => "session_invalid",
                E::Authentication(_) => "authentication_error",
                E::MalformedResponse { .. } => "malformed_response",
                E::Transport(_) => "upstream_error",
            },
        }
    }

    /// Build the JSON error response for one request.
    pub fn to_response(&self, request_id: &str) -> Response {
        let mut error = serde_json::json!({
            "type": self.kind(),
            "message": self.to_string(),
            "request_id": request_id,
        });
        if let ApiError::Dispatch(vtiger_pool::Error::RemoteOperation { code, .. }) = self {
            error["code"] = serde_json::Value::String(code.clone());
        }
        (
            self.status(),
            [(axum::http::header::CONTENT_TYPE, "application/json")],
            serde_json::json!({ "error": error }).to_string(),
        )
            .into_response()
    }
}
