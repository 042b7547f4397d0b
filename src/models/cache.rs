use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use super::channel::{Category, CategoryStats, Channel};

/// Current on-disk schema version
pub const CACHE_SCHEMA_VERSION: u32 = 1;

pub const CREATED_BY: &str = "channel-cache-server";

/// Outcome of the most recent refresh, as seen by status readers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RefreshStatus {
    Success,
    Failed,
    Loading,
    Missing,
}

impl Default for RefreshStatus {
    fn default() -> Self {
        Self::Missing
    }
}

/// Provenance block written with every snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheHeader {
    pub schema_version: u32,
    pub created_by: String,
    pub pid: u32,
}

impl CacheHeader {
    pub fn current() -> Self {
        Self {
            schema_version: CACHE_SCHEMA_VERSION,
            created_by: CREATED_BY.to_string(),
            pid: std::process::id(),
        }
    }
}

/// Full persisted snapshot (`channels.json`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachePayload {
    pub host: String,
    /// ISO-8601 capture time
    pub timestamp: String,
    pub channels: Vec<Channel>,
    pub channel_count: usize,
    pub stats: CategoryStats,
    pub categories: BTreeSet<Category>,
    pub group_counts: BTreeMap<String, usize>,
    pub cache_header: CacheHeader,
    pub last_refresh_status: RefreshStatus,
    pub last_refresh_error: Option<String>,
    pub last_successful_refresh: Option<String>,
}

impl CachePayload {
    /// Build a fresh snapshot; channels must already be normalized
    pub fn build(host: &str, channels: Vec<Channel>, captured_at: DateTime<Utc>) -> Self {
        let timestamp = captured_at.to_rfc3339();
        let aggregates = Aggregates::compute(&channels);

        Self {
            host: host.to_string(),
            timestamp: timestamp.clone(),
            channel_count: channels.len(),
            channels,
            stats: aggregates.stats,
            categories: aggregates.categories,
            group_counts: aggregates.group_counts,
            cache_header: CacheHeader::current(),
            last_refresh_status: RefreshStatus::Success,
            last_refresh_error: None,
            last_successful_refresh: Some(timestamp),
        }
    }
}

/// Precomputed aggregates over a channel list
#[derive(Debug, Default)]
pub struct Aggregates {
    pub stats: CategoryStats,
    pub categories: BTreeSet<Category>,
    pub group_counts: BTreeMap<String, usize>,
}

impl Aggregates {
    /// One pass over the list
    pub fn compute(channels: &[Channel]) -> Self {
        let mut aggregates = Self::default();
        for channel in channels {
            aggregates.stats.record(channel.category);
            aggregates.categories.insert(channel.category);
            *aggregates.group_counts.entry(channel.group.clone()).or_insert(0) += 1;
        }
        aggregates
    }
}

/// In-memory mirror of the refresh outcome
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RefreshMetadata {
    pub status: Option<RefreshStatus>,
    pub error: Option<String>,
    pub last_successful_refresh: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_computes_aggregates() {
        let channels = vec![
            Channel::new("CNN", "News", None, "http://x/cnn.ts"),
            Channel::new("BBC", "News", None, "http://x/bbc.ts"),
            Channel::new("Matrix", "VOD Action", None, "http://x/m.mp4"),
        ];
        let payload = CachePayload::build("example.com", channels, Utc::now());

        assert_eq!(payload.channel_count, 3);
        assert_eq!(payload.stats.total, 3);
        assert_eq!(payload.stats.tv, 2);
        assert_eq!(payload.stats.movies, 1);
        assert_eq!(payload.group_counts.get("News"), Some(&2));
        assert!(payload.categories.contains(&Category::Movies));
        assert_eq!(payload.last_refresh_status, RefreshStatus::Success);
        assert_eq!(payload.last_successful_refresh.as_deref(), Some(payload.timestamp.as_str()));
    }

    #[test]
    fn test_refresh_status_serializes_lowercase() {
        let value = serde_json::to_value(RefreshStatus::Missing).unwrap();
        assert_eq!(value, "missing");
    }
}
