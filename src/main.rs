mod config;
mod models;
mod routes;
mod services;

use axum::{
    routing::{get, post},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Config;
use crate::services::{
    cache::CacheStore,
    credentials::CredentialStore,
    fetcher::{normalize_host, PlaylistFetcher},
    refresh::RefreshCoordinator,
};

/// Application state shared across handlers
pub struct AppState {
    pub config: Config,
    pub store: Arc<CacheStore>,
    pub coordinator: Arc<RefreshCoordinator>,
    pub credentials: CredentialStore,
    pub start_time: Instant,
}

fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        // Health endpoints
        .route("/", get(routes::health::root))
        .route("/health", get(routes::health::health_check))
        .route("/live", get(routes::health::live))
        .route("/metrics", get(routes::health::metrics))
        // Account
        .route("/login", post(routes::account::login))
        .route(
            "/account",
            get(routes::account::get_account).delete(routes::account::delete_account),
        )
        // Channels
        .route("/channels", get(routes::channels::get_channels))
        .route("/stats", get(routes::channels::get_stats))
        .route("/groups", get(routes::channels::get_groups))
        // Refresh
        .route("/refresh", post(routes::refresh::trigger_refresh))
        .route("/status", get(routes::refresh::get_status))
        // Middleware
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

/// Start a background refresh when credentials exist and the cache is absent or stale
async fn warm_cache(state: &Arc<AppState>) {
    let Some(credentials) = state.credentials.get() else {
        tracing::info!("No startup credentials, waiting for /login");
        return;
    };

    let host = normalize_host(&credentials.host);
    let fresh = match state.store.load().await {
        Ok(Some(payload)) => CacheStore::is_valid(&payload, &host, state.config.cache_ttl_seconds),
        Ok(None) => false,
        Err(e) => {
            tracing::warn!(error = %e, "Cache unreadable at startup");
            false
        }
    };

    if fresh {
        tracing::info!(host = %host, "Cache is fresh, skipping startup refresh");
        return;
    }

    let outcome = state.coordinator.try_start_refresh(credentials);
    tracing::info!(host = %host, outcome = ?outcome, "Startup refresh");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize tracing/logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "channel_cache_server=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    // Load configuration
    let config = Config::from_env();
    let port = config.port;

    tracing::info!("Starting Channel Cache Server v{}", env!("CARGO_PKG_VERSION"));

    let store = Arc::new(CacheStore::new(&config.cache_dir));
    tracing::info!(cache_dir = %config.cache_dir, ttl_seconds = config.cache_ttl_seconds, "Cache store initialized");

    let fetcher = PlaylistFetcher::from_config(&config)?;
    tracing::info!(
        verify_ssl = config.verify_ssl,
        max_attempts = config.fetch_max_attempts,
        "Playlist fetcher initialized"
    );

    let coordinator = Arc::new(RefreshCoordinator::new(
        Arc::new(fetcher),
        Arc::clone(&store),
        Duration::from_secs(config.heartbeat_interval_secs),
        config.channel_filter_keywords.clone(),
    ));

    let credentials = CredentialStore::new(config.credentials());

    // Build application state
    let state = Arc::new(AppState {
        config,
        store,
        coordinator,
        credentials,
        start_time: Instant::now(),
    });

    if state.config.refresh_on_startup {
        warm_cache(&state).await;
    }

    let app = build_router(Arc::clone(&state));

    // Start server
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("Listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
