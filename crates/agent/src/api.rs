//! HTTP surface for probes, pipeline state, and Prometheus metrics

use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Json, Router};
use forwarder_lib::{
    forwarder::ForwarderState, health::HealthRegistry, observability::ForwarderMetrics,
};
use prometheus::{Encoder, TextEncoder};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::info;

/// State shared across request handlers
#[derive(Clone)]
pub struct AppState {
    pub health_registry: HealthRegistry,
    pub metrics: ForwarderMetrics,
    pub state_rx: watch::Receiver<ForwarderState>,
}

impl AppState {
    pub fn new(
        health_registry: HealthRegistry,
        metrics: ForwarderMetrics,
        state_rx: watch::Receiver<ForwarderState>,
    ) -> Self {
        Self {
            health_registry,
            metrics,
            state_rx,
        }
    }
}

#[derive(Debug, Serialize)]
struct StateResponse {
    state: ForwarderState,
}

/// Liveness probe, 503 only once a component has failed outright
async fn healthz(State(app): State<Arc<AppState>>) -> impl IntoResponse {
    let health = app.health_registry.health().await;

    let status_code = if health.status.is_operational() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status_code, Json(health))
}

/// Readiness probe, 503 until startup completes
async fn readyz(State(app): State<Arc<AppState>>) -> impl IntoResponse {
    let readiness = app.health_registry.readiness().await;

    let status_code = if readiness.ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status_code, Json(readiness))
}

/// Current forward loop state as published on the watch channel
async fn forwarder_state(State(app): State<Arc<AppState>>) -> Json<StateResponse> {
    Json(StateResponse {
        state: *app.state_rx.borrow(),
    })
}

/// Prometheus text exposition of the process-global registry
async fn metrics() -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    encoder.encode(&metric_families, &mut buffer).unwrap();

    (
        StatusCode::OK,
        [("content-type", "text/plain; charset=utf-8")],
        buffer,
    )
}

pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/state", get(forwarder_state))
        .route("/metrics", get(metrics))
        .with_state(state)
}

/// Bind the API listener and serve until the task is dropped
pub async fn serve(port: u16, state: Arc<AppState>) -> anyhow::Result<()> {
    let app = create_router(state);

    let addr = format!("0.0.0.0:{}", port);
    info!(addr = %addr, "Serving probe and metrics API");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
