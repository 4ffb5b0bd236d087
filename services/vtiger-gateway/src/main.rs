//! vtiger Gateway
//!
//! Single-binary Rust service that:
//! 1. Loads the TOML config and the vtiger password
//! 2. Warms a pool of vtiger webservice sessions
//! 3. Serves `POST /entities/{entity}/{operation}` through the session dispatcher
//! 4. Drains in-flight requests and the session pool on SIGINT/SIGTERM

mod api;
mod config;
mod error;
mod filter;
mod metrics;

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use axum::Router;
use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use metrics_exporter_prometheus::PrometheusHandle;
use tokio::net::TcpListener;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use vtiger_pool::Dispatcher;
use webservice::{HttpTransport, StaticResolver, Transport};

use crate::api::ApiState;
use crate::config::Config;

/// Time allowed for in-flight requests after a shutdown signal.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Shared application state accessible from all handlers
#[derive(Clone)]
struct AppState {
    api: ApiState,
    prometheus: PrometheusHandle,
    started_at: Instant,
}

/// Build the axum router with all routes and shared state.
///
/// `max_connections` caps concurrent requests, and with it the number of
/// callers competing for sessions.
fn build_router(state: AppState, max_connections: usize) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .route("/entities/{entity}/{operation}", post(entity_handler))
        .layer(tower::limit::ConcurrencyLimitLayer::new(max_connections))
        .with_state(state)
}

#[tokio::main]
async fn main() -> Result<()> {
    // JSON logs, filter from LOG_LEVEL, then RUST_LOG, then "info"
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_env("LOG_LEVEL")
                .or_else(|_| EnvFilter::try_from_default_env())
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    info!("starting vtiger-gateway");

    // Install Prometheus metrics recorder before any metrics are emitted
    let prometheus_handle =
        metrics::install_recorder().context("failed to install Prometheus recorder")?;

    // CLI: simple --config flag parsing
    let args: Vec<String> = std::env::args().collect();
    let cli_config_path = args
        .iter()
        .position(|a| a == "--config")
        .and_then(|i| args.get(i + 1))
        .map(|s| s.as_str());

    let config_path = Config::resolve_path(cli_config_path);
    info!(path = %config_path.display(), "loading configuration");

    let config = Config::load(&config_path)
        .with_context(|| format!("failed to load config from {}", config_path.display()))?;

    info!(
        listen_addr = %config.server.listen_addr,
        host = %config.vtiger.host,
        username = %config.vtiger.username,
        pool_size = config.pool.size,
        warm_up = config.pool.warm_up.label(),
        entities = config.entities.len(),
        "configuration loaded"
    );

    let client = reqwest::Client::builder()
        .build()
        .context("failed to build HTTP client")?;
    let transport: Arc<dyn Transport> = Arc::new(HttpTransport::new(
        client,
        config.vtiger.host.clone(),
        config.request_timeout(),
    ));
    let resolver: StaticResolver = config
        .entities
        .iter()
        .map(|(entity, prefix)| (entity.clone(), prefix.clone()))
        .collect();

    let dispatcher_config = config.pool.dispatcher_config();
    info!(
        entities = ?resolver.entities(),
        checkout_max_wait_ms = dispatcher_config.checkout.max_total_wait().as_millis() as u64,
        token_max_wait_ms = dispatcher_config.token.max_total_wait().as_millis() as u64,
        "dispatcher configured"
    );

    let dispatcher = Arc::new(Dispatcher::new(
        transport,
        Arc::new(resolver),
        config.credentials()?,
        dispatcher_config,
    ));

    dispatcher
        .start()
        .await
        .context("session pool warm-up failed")?;

    let app_state = AppState {
        api: ApiState {
            dispatcher: dispatcher.clone(),
            timeout: config.request_timeout(),
        },
        prometheus: prometheus_handle,
        started_at: Instant::now(),
    };

    let app = build_router(app_state, config.server.max_connections);

    let listen_addr = config.server.listen_addr;
    let listener = TcpListener::bind(listen_addr)
        .await
        .with_context(|| format!("failed to bind to {listen_addr}"))?;
    info!(addr = %listen_addr, "accepting requests");

    // The drain timeout starts when the shutdown signal fires: the server is
    // told to drain, then the drain is raced against DRAIN_TIMEOUT.
    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();

    let server_handle = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
            })
            .await
    });

    shutdown_signal().await;
    let _ = shutdown_tx.send(());

    match tokio::time::timeout(DRAIN_TIMEOUT, server_handle).await {
        Ok(Ok(Ok(()))) => {
            info!("all in-flight requests drained");
        }
        Ok(Ok(Err(e))) => {
            error!(error = %e, "server error during shutdown");
        }
        Ok(Err(e)) => {
            error!(error = %e, "server task panicked");
        }
        Err(_) => {
            warn!(
                in_use = dispatcher.pool().in_use_count(),
                drain_timeout_secs = DRAIN_TIMEOUT.as_secs(),
                "drain timeout exceeded, forcing shutdown"
            );
        }
    }

    dispatcher.shutdown();

    info!("shutdown complete");
    Ok(())
}

/// Health endpoint: dispatcher snapshot plus uptime.
/// Returns 200 when the pool is warm and holds a live session, or lazy warm-up
/// is still waiting for the first request; 503 otherwise.
async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    let dispatcher = &state.api.dispatcher;
    let status_code = if dispatcher.is_healthy() {
        axum::http::StatusCode::OK
    } else {
        axum::http::StatusCode::SERVICE_UNAVAILABLE
    };

    let mut body = dispatcher.health();
    body["uptime_seconds"] = serde_json::json!(state.started_at.elapsed().as_secs());

    (
        status_code,
        [(axum::http::header::CONTENT_TYPE, "application/json")],
        body.to_string(),
    )
}

/// Prometheus metrics endpoint in text exposition format.
async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    (
        axum::http::StatusCode::OK,
        [(
            axum::http::header::CONTENT_TYPE,
            "text/plain; version=0.0.4; charset=utf-8",
        )],
        state.prometheus.render(),
    )
}

async fn entity_handler(
    State(state): State<AppState>,
    Path((entity, operation)): Path<(String, String)>,
    body: Bytes,
) -> Response {
    let request_id = format!("req_{}", uuid::Uuid::new_v4().as_simple());
    api::handle_entity_request(&state.api, entity, operation, body, request_id).await
}

/// Wait for SIGTERM or SIGINT for graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received SIGINT, shutting down"),
        _ = terminate => info!("received SIGTERM, shutting down"),
    }
}
