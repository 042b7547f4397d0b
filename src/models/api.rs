use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use super::cache::RefreshStatus;
use super::channel::{Category, Channel};
use super::refresh::{DerivedRefreshState, StartOutcome};

/// Query parameters for the channels endpoint
#[derive(Debug, Clone, Deserialize)]
pub struct ChannelsQuery {
    #[serde(default = "default_page")]
    pub page: usize,
    #[serde(default = "default_page_size")]
    pub page_size: usize,
    #[serde(default)]
    pub search: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub group: Option<String>,
}

fn default_page() -> usize {
    1
}

fn default_page_size() -> usize {
    50
}

/// Paginated channel list
#[derive(Debug, Serialize)]
pub struct ChannelListResponse {
    pub channels: Vec<Channel>,
    pub total: usize,
    pub page: usize,
    pub page_size: usize,
    pub cached: bool,
}

/// Service status: refresh lifecycle plus cache summary
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub logged_in: bool,
    pub refreshing: bool,
    pub cache_available: bool,
    pub last_refresh: Option<String>,
    pub channel_count: usize,
    pub refresh_started_at: Option<DateTime<Utc>>,
    pub heartbeat_at: Option<DateTime<Utc>>,
    pub refresh_state: DerivedRefreshState,
    pub refresh_status: RefreshStatus,
    pub last_error: Option<String>,
    pub last_successful_refresh: Option<String>,
}

/// Categories present and per-group counts
#[derive(Debug, Serialize)]
pub struct GroupsResponse {
    pub categories: BTreeSet<Category>,
    pub groups: BTreeMap<String, usize>,
}

/// Response for refresh trigger
#[derive(Debug, Serialize)]
pub struct RefreshResponse {
    pub status: StartOutcome,
}
