use chrono::{DateTime, Utc};
use serde::Serialize;

use super::cache::RefreshStatus;

/// Health of the refresh job as exposed to status readers (never persisted)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DerivedRefreshState {
    /// No job running
    Idle,
    /// No job running and the last completed run failed
    Failed,
    /// Job just started
    Pending,
    /// Job running but the heartbeat went quiet
    Stuck,
    /// Job running with a fresh heartbeat
    Alive,
}

/// Result of `TryStartRefresh`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StartOutcome {
    Started,
    AlreadyRunning,
}

/// Point-in-time view of the refresh lifecycle
#[derive(Debug, Clone, Serialize)]
pub struct RefreshSnapshot {
    pub refreshing: bool,
    pub started_at: Option<DateTime<Utc>>,
    pub heartbeat_at: Option<DateTime<Utc>>,
    pub derived_state: DerivedRefreshState,
    pub last_status: RefreshStatus,
    pub last_error: Option<String>,
    pub last_successful_refresh: Option<String>,
}
