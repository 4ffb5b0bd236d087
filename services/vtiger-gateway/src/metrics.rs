//! Prometheus metrics exposition
//!
//! Gateway metrics:
//!
//! - `gateway_requests_total` (counter): labels `entity`, `operation`, `outcome`
//! - `gateway_request_duration_seconds` (histogram): label `outcome`
//!
//! The pool crate records its own session metrics (`vtiger_sessions_created_total`,
//! `vtiger_sessions_evicted_total`, `vtiger_checkout_exhausted_total`,
//! `vtiger_pool_available`) through the same global recorder.

use metrics_exporter_prometheus::{BuildError, Matcher, PrometheusBuilder, PrometheusHandle};

/// Bucket boundaries from 5ms to 60s, the default request timeout.
const DURATION_BUCKETS: &[f64] = &[
    0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0,
];

fn builder() -> Result<PrometheusBuilder, BuildError> {
    PrometheusBuilder::new().set_buckets_for_metric(
        Matcher::Full("gateway_request_duration_seconds".to_string()),
        DURATION_BUCKETS,
    )
}

/// Install the global Prometheus recorder and return a handle for rendering.
///
/// The duration metric gets explicit buckets so it renders as a histogram
/// (`_bucket` lines) rather than a summary.
pub fn install_recorder() -> Result<PrometheusHandle, BuildError> {
    builder()?.install_recorder()
}

/// Record a completed entity request.
pub fn record_request(entity: &str, operation: &str, outcome: &str, duration_secs: f64) {
    metrics::counter!(
        "gateway_requests_total",
        "entity" => entity.to_string(),
        "operation" => operation.to_string(),
        "outcome" => outcome.to_string()
    )
    .increment(1);
    metrics::histogram!("gateway_request_duration_seconds", "outcome" => outcome.to_string())
        .record(duration_secs);
}
