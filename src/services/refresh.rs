//! Single-flight refresh coordinator.
//!
//! Owns the refresh slot (`idle -> loading -> idle`), a heartbeat ticker that
//! runs alongside each job, and the derived health classification shown on
//! the status surface. A run is Fetcher -> Parser -> Cache Store; any failing
//! step aborts the run before the cache is touched.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::models::{Credentials, DerivedRefreshState, RefreshSnapshot, RefreshStatus, StartOutcome};
use crate::services::cache::{CacheError, CacheStore};
use crate::services::fetcher::{normalize_host, FetchError, PlaylistSource};
use crate::services::metrics;
use crate::services::parser::{filter_channels, parse_m3u};

/// Loading runs younger than this are reported as pending
const PENDING_GRACE_SECS: i64 = 2;
/// Loading runs whose heartbeat is older than this are reported as stuck
const STUCK_AFTER_SECS: i64 = 15;
const MIN_HEARTBEAT_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Debug, thiserror::Error)]
pub enum RefreshError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error("Failed to parse playlist: {0}")]
    Parse(String),
    #[error("Failed to save channel cache: {0}")]
    Save(#[from] CacheError),
    #[error("Playlist contained no channels")]
    EmptyPlaylist,
}

#[derive(Debug, Clone, Copy, Default)]
struct RefreshState {
    refreshing: bool,
    started_at: Option<DateTime<Utc>>,
    heartbeat_at: Option<DateTime<Utc>>,
}

pub struct RefreshCoordinator {
    state: Mutex<RefreshState>,
    source: Arc<dyn PlaylistSource>,
    store: Arc<CacheStore>,
    heartbeat_interval: Duration,
    filter_keywords: Vec<String>,
}

/// Releases the slot and stops the heartbeat on every exit path
struct SlotGuard {
    coordinator: Arc<RefreshCoordinator>,
    heartbeat: CancellationToken,
    completed: bool,
}

impl Drop for SlotGuard {
    fn drop(&mut self) {
        self.heartbeat.cancel();
        if !self.completed {
            self.coordinator.store.record_failure("Refresh aborted unexpectedly");
            metrics::record_refresh("failed");
        }
        self.coordinator.release();
    }
}

impl RefreshCoordinator {
    pub fn new(
        source: Arc<dyn PlaylistSource>,
        store: Arc<CacheStore>,
        heartbeat_interval: Duration,
        filter_keywords: Vec<String>,
    ) -> Self {
        Self {
            state: Mutex::new(RefreshState::default()),
            source,
            store,
            heartbeat_interval: heartbeat_interval.max(MIN_HEARTBEAT_INTERVAL),
            filter_keywords,
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, RefreshState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Atomically move `idle -> loading`; false (and no side effects) if already loading
    pub fn try_acquire(&self) -> bool {
        {
            let mut state = self.lock_state();
            if state.refreshing {
                return false;
            }
            let now = Utc::now();
            *state = RefreshState {
                refreshing: true,
                started_at: Some(now),
                heartbeat_at: Some(now),
            };
        }
        self.store.record_loading();
        true
    }

    fn release(&self) {
        *self.lock_state() = RefreshState::default();
    }

    fn touch(&self) {
        let mut state = self.lock_state();
        if state.refreshing {
            state.heartbeat_at = Some(Utc::now());
        }
    }

    /// Start a background refresh unless one is already running
    pub fn try_start_refresh(self: &Arc<Self>, credentials: Credentials) -> StartOutcome {
        match self.spawn_refresh(credentials) {
            Some(_) => StartOutcome::Started,
            None => StartOutcome::AlreadyRunning,
        }
    }

    /// Like [`try_start_refresh`](Self::try_start_refresh) but hands back the job handle
    pub fn spawn_refresh(
        self: &Arc<Self>,
        credentials: Credentials,
    ) -> Option<JoinHandle<Result<usize, RefreshError>>> {
        if !self.try_acquire() {
            tracing::info!(host = %credentials.host, "Refresh already running, request rejected");
            return None;
        }

        let this = Arc::clone(self);
        Some(tokio::spawn(async move { this.run_acquired(credentials).await }))
    }

    async fn run_acquired(self: Arc<Self>, credentials: Credentials) -> Result<usize, RefreshError> {
        let run_id = uuid::Uuid::new_v4().simple().to_string()[..8].to_string();
        let heartbeat_token = CancellationToken::new();
        let mut slot = SlotGuard {
            coordinator: Arc::clone(&self),
            heartbeat: heartbeat_token.clone(),
            completed: false,
        };

        let span = tracing::info_span!("refresh", run_id = %run_id);
        let heartbeat = self.spawn_heartbeat(heartbeat_token.clone());
        let started = Instant::now();

        tracing::info!(parent: &span, host = %normalize_host(&credentials.host), "Refresh started");
        let result = self.execute(&credentials).instrument(span.clone()).await;

        heartbeat_token.cancel();
        let _ = heartbeat.await;

        let elapsed_ms = started.elapsed().as_millis() as u64;
        match &result {
            Ok(count) => {
                metrics::record_refresh("success");
                tracing::info!(parent: &span, channels = count, elapsed_ms, "Refresh completed");
            }
            Err(e) => {
                self.store.record_failure(&e.to_string());
                metrics::record_refresh("failed");
                tracing::error!(parent: &span, error = %e, elapsed_ms, "Refresh failed");
            }
        }

        slot.completed = true;
        drop(slot);
        result
    }

    async fn execute(&self, credentials: &Credentials) -> Result<usize, RefreshError> {
        self.touch();
        let raw = self.source.fetch(credentials).await?;
        self.touch();

        let parsed = tokio::task::spawn_blocking(move || parse_m3u(&raw))
            .await
            .map_err(|e| RefreshError::Parse(e.to_string()))?;
        self.touch();
        tracing::info!(
            channels = parsed.channels.len(),
            malformed = parsed.malformed_entries,
            superseded = parsed.superseded_entries,
            "Playlist parsed"
        );

        let channels = filter_channels(parsed.channels, &self.filter_keywords);
        if channels.is_empty() {
            return Err(RefreshError::EmptyPlaylist);
        }

        let host = normalize_host(&credentials.host);
        self.touch();
        let payload = self.store.save(&host, channels).await?;
        self.touch();

        Ok(payload.channel_count)
    }

    fn spawn_heartbeat(self: &Arc<Self>, token: CancellationToken) -> JoinHandle<()> {
        let this = Arc::clone(self);
        let period = self.heartbeat_interval;

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // first tick completes immediately
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => this.touch(),
                }
            }
        })
    }

    /// `GetRefreshState`
    pub fn snapshot(&self) -> RefreshSnapshot {
        let state = *self.lock_state();
        let meta = self.store.metadata();
        let last_status = meta.status.unwrap_or_default();

        RefreshSnapshot {
            refreshing: state.refreshing,
            started_at: state.started_at,
            heartbeat_at: state.heartbeat_at,
            derived_state: derive_state(
                state.refreshing,
                state.started_at,
                state.heartbeat_at,
                last_status,
                Utc::now(),
            ),
            last_status,
            last_error: meta.error,
            last_successful_refresh: meta.last_successful_refresh,
        }
    }
}

/// Classify refresh health from the raw state at `now`
pub fn derive_state(
    refreshing: bool,
    started_at: Option<DateTime<Utc>>,
    heartbeat_at: Option<DateTime<Utc>>,
    last_status: RefreshStatus,
    now: DateTime<Utc>,
) -> DerivedRefreshState {
    if !refreshing {
        return match last_status {
            RefreshStatus::Failed => DerivedRefreshState::Failed,
            _ => DerivedRefreshState::Idle,
        };
    }

    if started_at.is_some_and(|s| now - s < ChronoDuration::seconds(PENDING_GRACE_SECS)) {
        return DerivedRefreshState::Pending;
    }

    match heartbeat_at.or(started_at) {
        Some(beat) if now - beat <= ChronoDuration::seconds(STUCK_AFTER_SECS) => DerivedRefreshState::Alive,
        _ => DerivedRefreshState::Stuck,
    }
}
