use axum::{
    extract::{Query, State},
    response::IntoResponse,
    Json,
};
use std::sync::Arc;

use crate::models::{ChannelListResponse, ChannelsQuery, GroupsResponse};
use crate::routes::load_cache;
use crate::services::cache::CacheStore;
use crate::services::query::ChannelQuery;
use crate::AppState;

/// GET /channels - filtered, paginated channel list from cache
pub async fn get_channels(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ChannelsQuery>,
) -> impl IntoResponse {
    let query = ChannelQuery::from_request(&params, state.config.max_page_size);

    let (page, cached) = match load_cache(&state).await {
        Some(payload) => (query.apply(&payload.channels), true),
        None => {
            tracing::info!("Channels requested but cache is missing");
            (query.apply(&[]), false)
        }
    };

    tracing::debug!(
        total = page.total,
        page = page.page,
        page_size = page.page_size,
        "Channels served"
    );

    Json(ChannelListResponse {
        channels: page.channels,
        total: page.total,
        page: page.page,
        page_size: page.page_size,
        cached,
    })
}

/// GET /stats - per-category counts
pub async fn get_stats(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let payload = load_cache(&state).await;
    if payload.is_none() {
        tracing::info!("Stats requested but cache is missing");
    }
    Json(CacheStore::get_stats(payload.as_ref()))
}

/// GET /groups - categories present and group counts
pub async fn get_groups(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let payload = load_cache(&state).await;

    Json(GroupsResponse {
        categories: payload.as_ref().map(|p| p.categories.clone()).unwrap_or_default(),
        groups: CacheStore::get_group_counts(payload.as_ref()),
    })
}
