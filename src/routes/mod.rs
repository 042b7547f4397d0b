pub mod account;
pub mod channels;
pub mod health;
pub mod refresh;

use crate::models::CachePayload;
use crate::AppState;

/// Read path shared by handlers: I/O errors are logged and read as "no cache"
pub(crate) async fn load_cache(state: &AppState) -> Option<CachePayload> {
    match state.store.load().await {
        Ok(payload) => payload,
        Err(e) => {
            tracing::error!(error = %e, "Failed to read channel cache");
            None
        }
    }
}
