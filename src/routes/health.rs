use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use prometheus::{Encoder, TextEncoder};
use serde::Serialize;
use std::sync::Arc;

use crate::models::DerivedRefreshState;
use crate::AppState;

/// Root endpoint - basic status
pub async fn root() -> impl IntoResponse {
    Json(serde_json::json!({
        "name": "Channel Cache Server",
        "version": env!("CARGO_PKG_VERSION"),
        "status": "running",
    }))
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    uptime: u64,
    cache_file: bool,
    logged_in: bool,
    refresh_state: DerivedRefreshState,
}

/// GET /health
pub async fn health_check(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let snapshot = state.coordinator.snapshot();

    // a wedged refresh job is the only degraded condition
    let status = match snapshot.derived_state {
        DerivedRefreshState::Stuck => "degraded",
        _ => "ok",
    };

    Json(HealthResponse {
        status,
        uptime: state.start_time.elapsed().as_secs(),
        cache_file: state.store.cache_path().exists(),
        logged_in: state.credentials.is_logged_in(),
        refresh_state: snapshot.derived_state,
    })
}

/// GET /metrics - Prometheus metrics
pub async fn metrics() -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();

    let mut buffer = Vec::new();
    match encoder.encode(&metric_families, &mut buffer) {
        Ok(_) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            buffer,
        ),
        Err(e) => {
            tracing::error!("Failed to encode metrics: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                [("content-type", "text/plain")],
                b"Internal Server Error".to_vec(),
            )
        }
    }
}

/// Liveness probe
pub async fn live() -> impl IntoResponse {
    (StatusCode::OK, "alive")
}
