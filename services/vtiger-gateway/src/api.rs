//! Entity request handling
//!
//! `POST /entities/{entity}/{operation}` with a JSON body. `find` bodies are
//! filter documents and get shaped by `filter::build_data_filter`; `create`,
//! `update` and `delete` bodies are forwarded as is. The dispatcher call is
//! wrapped in the configured request timeout; a timed-out call returns its
//! session to the pool when the future is dropped.

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::body::Bytes;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::Value;
use tracing::{info, instrument, warn};
use vtiger_pool::Dispatcher;

use crate::error::ApiError;
use crate::filter::build_data_filter;
use crate::metrics;

/// Logical operations exposed over HTTP.
pub const OPERATIONS: &[&str] = &["find", "create", "update", "delete"];

/// Shared state for entity handlers
#[derive(Clone)]
pub struct ApiState {
    pub dispatcher: Arc<Dispatcher>,
    pub timeout: Duration,
}

/// Run one entity request and render the response.
#[instrument(skip_all, fields(request_id = %request_id, entity = %entity, operation = %operation))]
pub async fn handle_entity_request(
    state: &ApiState,
    entity: String,
    operation: String,
    body: Bytes,
    request_id: String,
) -> Response {
    let start = Instant::now();
    let outcome = run(state, &entity, &operation, &body).await;
    let duration = start.elapsed().as_secs_f64();

    // Keep label cardinality bounded for unsupported operations
    let operation_label = if OPERATIONS.contains(&operation.as_str()) {
        operation.as_str()
    } else {
        "unsupported"
    };

    match outcome {
        Ok(result) => {
            metrics::record_request(&entity, operation_label, "ok", duration);
            info!(duration_ms = (duration * 1000.0) as u64, "request completed");
            (
                StatusCode::OK,
                [(axum::http::header::CONTENT_TYPE, "application/json")],
                serde_json::json!({
                    "result": result,
                    "request_id": request_id,
                })
                .to_string(),
            )
                .into_response()
        }
        Err(err) => {
            metrics::record_request(&entity, operation_label, err.kind(), duration);
            warn!(
                error = %err,
                status = err.status().as_u16(),
                duration_ms = (duration * 1000.0) as u64,
                "request failed"
            );
            err.to_response(&request_id)
        }
    }
}

async fn run(state: &ApiState, entity: &str, operation: &str, body: &[u8]) -> Result<Value, ApiError> {
    if !OPERATIONS.contains(&operation) {
        return Err(ApiError::UnsupportedOperation(operation.to_string()));
    }

    let payload: Value = if body.iter().all(u8::is_ascii_whitespace) {
        Value::Object(serde_json::Map::new())
    } else {
        serde_json::from_slice(body).map_err(|e| ApiError::InvalidBody(e.to_string()))?
    };
    let payload = if operation == "find" {
        build_data_filter(&payload)?
    } else {
        payload
    };

    let result = tokio::time::timeout(
        state.timeout,
        state.dispatcher.execute(entity, operation, &payload),
    )
    .await
    .map_err(|_| ApiError::Timeout(state.timeout))??;
    Ok(result)
}
