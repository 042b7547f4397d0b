use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use std::sync::Arc;

use crate::models::{RefreshResponse, StartOutcome, StatusResponse};
use crate::routes::load_cache;
use crate::AppState;

/// POST /refresh - start a background refresh (409 if not logged in or already running)
pub async fn trigger_refresh(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, (StatusCode, Json<serde_json::Value>)> {
    let Some(credentials) = state.credentials.get() else {
        tracing::info!("Refresh requested without active account");
        return Err((
            StatusCode::CONFLICT,
            Json(serde_json::json!({ "error": "not logged in" })),
        ));
    };

    match state.coordinator.try_start_refresh(credentials) {
        StartOutcome::Started => Ok(Json(RefreshResponse {
            status: StartOutcome::Started,
        })),
        StartOutcome::AlreadyRunning => Err((
            StatusCode::CONFLICT,
            Json(serde_json::json!({
                "error": "already refreshing",
                "status": StartOutcome::AlreadyRunning,
            })),
        )),
    }
}

/// GET /status - refresh lifecycle plus cache summary
pub async fn get_status(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let cached = load_cache(&state).await;
    let snapshot = state.coordinator.snapshot();

    Json(StatusResponse {
        logged_in: state.credentials.is_logged_in(),
        refreshing: snapshot.refreshing,
        cache_available: cached.is_some(),
        last_refresh: cached.as_ref().map(|p| p.timestamp.clone()),
        channel_count: cached.as_ref().map_or(0, |p| p.channel_count),
        refresh_started_at: snapshot.started_at,
        heartbeat_at: snapshot.heartbeat_at,
        refresh_state: snapshot.derived_state,
        refresh_status: snapshot.last_status,
        last_error: snapshot.last_error,
        last_successful_refresh: snapshot.last_successful_refresh,
    })
}
