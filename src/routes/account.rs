use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use std::sync::Arc;

use crate::models::Credentials;
use crate::services::fetcher::normalize_host;
use crate::AppState;

/// POST /login - activate provider credentials (memory only)
pub async fn login(
    State(state): State<Arc<AppState>>,
    Json(credentials): Json<Credentials>,
) -> Result<impl IntoResponse, (StatusCode, Json<serde_json::Value>)> {
    if !credentials.is_complete() {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({ "error": "host, username and password are required" })),
        ));
    }

    tracing::info!(host = %normalize_host(&credentials.host), "Login accepted");
    state.credentials.set(credentials);

    Ok(Json(serde_json::json!({ "status": "ok" })))
}

/// GET /account - connection state without secrets
pub async fn get_account(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let active = state.credentials.get();
    Json(serde_json::json!({
        "connected": active.is_some(),
        "host": active.map(|c| normalize_host(&c.host)),
    }))
}

/// DELETE /account - forget the active credentials
pub async fn delete_account(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    state.credentials.clear();
    tracing::info!("Account disconnected");
    Json(serde_json::json!({ "status": "ok" }))
}
