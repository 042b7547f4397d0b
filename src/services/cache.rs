use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Instant;
use tokio::fs::{self, File};
use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;

use crate::models::cache::{Aggregates, CACHE_SCHEMA_VERSION};
use crate::models::{CacheHeader, CachePayload, CategoryStats, Channel, RefreshMetadata, RefreshStatus};
use crate::services::metrics;

const CACHE_FILE: &str = "channels.json";

/// Upper bound for TTL arithmetic (about 136 years)
const MAX_TTL_SECONDS: u64 = u32::MAX as u64;

/// Errors surfaced by save/load; corruption is not one of them (it quarantines)
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("cache I/O failed at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to encode cache payload: {0}")]
    Encode(#[from] serde_json::Error),
}

impl CacheError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Single-document channel cache (`<cache_dir>/channels.json`)
///
/// Writes go to a sibling temp file which is fsynced and renamed over the
/// target, so readers only ever see a complete snapshot. A corrupt file is
/// renamed aside and reported as "no cache".
pub struct CacheStore {
    cache_dir: PathBuf,
    /// Serializes file access: loads share, saves are exclusive
    file_lock: RwLock<()>,
    /// In-memory refresh outcome; wins over what the file says once populated
    metadata: Mutex<RefreshMetadata>,
}

impl CacheStore {
    pub fn new(cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            cache_dir: cache_dir.into(),
            file_lock: RwLock::new(()),
            metadata: Mutex::new(RefreshMetadata::default()),
        }
    }

    pub fn cache_path(&self) -> PathBuf {
        self.cache_dir.join(CACHE_FILE)
    }

    fn tmp_path(&self) -> PathBuf {
        self.cache_dir.join(format!("{}.tmp", CACHE_FILE))
    }

    /// Normalize, aggregate and atomically persist a channel list
    pub async fn save(&self, host: &str, channels: Vec<Channel>) -> Result<CachePayload, CacheError> {
        let started = Instant::now();
        let channels: Vec<Channel> = channels.into_iter().map(Channel::normalized).collect();
        let payload = CachePayload::build(host, channels, Utc::now());
        let body = serde_json::to_vec(&payload)?;

        let path = self.cache_path();
        let tmp_path = self.tmp_path();

        {
            let _guard = self.file_lock.write().await;

            fs::create_dir_all(&self.cache_dir)
                .await
                .map_err(|e| CacheError::io(&self.cache_dir, e))?;

            if let Err(e) = write_synced(&tmp_path, &body).await {
                let _ = fs::remove_file(&tmp_path).await;
                return Err(CacheError::io(&tmp_path, e));
            }

            // rename replaces the target in one step; the old file stays until then
            if let Err(e) = fs::rename(&tmp_path, &path).await {
                let _ = fs::remove_file(&tmp_path).await;
                return Err(CacheError::io(&path, e));
            }
        }

        self.update_metadata(|meta| {
            meta.status = Some(RefreshStatus::Success);
            meta.error = None;
            meta.last_successful_refresh = Some(payload.timestamp.clone());
        });
        metrics::set_cached_channels(payload.channel_count);

        tracing::info!(
            path = %path.display(),
            host = %payload.host,
            channels = payload.channel_count,
            bytes = body.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Cache saved"
        );

        Ok(payload)
    }

    /// Read the snapshot; `Ok(None)` when absent or quarantined
    pub async fn load(&self) -> Result<Option<CachePayload>, CacheError> {
        let _guard = self.file_lock.read().await;
        let path = self.cache_path();

        let raw = match fs::read(&path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "No cache file");
                return Ok(None);
            }
            Err(e) => return Err(CacheError::io(&path, e)),
        };

        let value: Value = match serde_json::from_slice(&raw) {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Cache file is not valid JSON");
                self.quarantine(&path, "invalid_json").await;
                return Ok(None);
            }
        };

        let payload = match normalize_stored(value) {
            Ok(payload) => payload,
            Err(reason) => {
                self.quarantine(&path, reason).await;
                return Ok(None);
            }
        };

        // fields already set in memory win; the file fills the gaps
        self.update_metadata(|meta| {
            if meta.status.is_none() {
                meta.status = Some(payload.last_refresh_status);
            }
            if meta.error.is_none() {
                meta.error = payload.last_refresh_error.clone();
            }
            if meta.last_successful_refresh.is_none() {
                meta.last_successful_refresh = payload.last_successful_refresh.clone();
            }
        });
        metrics::set_cached_channels(payload.channel_count);

        tracing::debug!(channels = payload.channel_count, host = %payload.host, "Cache loaded");
        Ok(Some(payload))
    }

    /// Rename a corrupt file aside; returns the new path when it moved
    async fn quarantine(&self, path: &Path, reason: &str) -> Option<PathBuf> {
        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "channels".to_string());
        let stamp = Utc::now().format("%Y%m%dT%H%M%S%3fZ");
        let target = path.with_file_name(format!("{}.corrupt-{}.json", stem, stamp));

        match fs::rename(path, &target).await {
            Ok(()) => {
                tracing::warn!(
                    reason,
                    from = %path.display(),
                    to = %target.display(),
                    "Corrupt cache quarantined"
                );
                Some(target)
            }
            // a concurrent load already moved it
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => {
                tracing::error!(reason, path = %path.display(), error = %e, "Failed to quarantine cache file");
                None
            }
        }
    }

    /// Staleness check: same host and `now <= timestamp + ttl`
    pub fn is_valid(payload: &CachePayload, host: &str, ttl_seconds: u64) -> bool {
        if payload.host != host {
            tracing::debug!(cached = %payload.host, requested = %host, "Cache invalid: host mismatch");
            return false;
        }

        let Some(captured_at) = parse_timestamp(&payload.timestamp) else {
            tracing::debug!(timestamp = %payload.timestamp, "Cache invalid: unparseable timestamp");
            return false;
        };

        let ttl = chrono::Duration::seconds(ttl_seconds.min(MAX_TTL_SECONDS) as i64);
        Utc::now() <= captured_at + ttl
    }

    /// Precomputed stats, recomputed when missing or inconsistent; zeroed without a payload
    pub fn get_stats(payload: Option<&CachePayload>) -> CategoryStats {
        match payload {
            None => CategoryStats::default(),
            Some(p) if p.stats.is_consistent(p.channels.len()) => p.stats,
            Some(p) => CategoryStats::from_channels(&p.channels),
        }
    }

    pub fn get_group_counts(payload: Option<&CachePayload>) -> BTreeMap<String, usize> {
        match payload {
            None => BTreeMap::new(),
            Some(p) if p.group_counts.values().sum::<usize>() == p.channels.len() => p.group_counts.clone(),
            Some(p) => Aggregates::compute(&p.channels).group_counts,
        }
    }

    /// Refresh outcome as seen by status readers
    pub fn metadata(&self) -> RefreshMetadata {
        let meta = self.metadata.lock().unwrap_or_else(|e| e.into_inner()).clone();
        RefreshMetadata {
            status: Some(meta.status.unwrap_or(RefreshStatus::Missing)),
            ..meta
        }
    }

    pub fn record_loading(&self) {
        self.update_metadata(|meta| meta.status = Some(RefreshStatus::Loading));
    }

    pub fn record_failure(&self, error: &str) {
        self.update_metadata(|meta| {
            meta.status = Some(RefreshStatus::Failed);
            meta.error = Some(error.to_string());
        });
    }

    fn update_metadata(&self, f: impl FnOnce(&mut RefreshMetadata)) {
        let mut meta = self.metadata.lock().unwrap_or_else(|e| e.into_inner());
        f(&mut meta);
    }
}

async fn write_synced(path: &Path, body: &[u8]) -> std::io::Result<()> {
    let mut file = File::create(path).await?;
    file.write_all(body).await?;
    file.flush().await?;
    file.sync_all().await
}

/// Parse RFC 3339, falling back to a naive ISO timestamp read as UTC
pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(value) {
        return Some(ts.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| Utc.from_utc_datetime(&naive))
}

fn string_field(obj: &Map<String, Value>, key: &str) -> Option<String> {
    obj.get(key).and_then(Value::as_str).map(str::to_string)
}

/// Structural validation plus normalize-on-read. `Err` carries the quarantine reason.
fn normalize_stored(value: Value) -> Result<CachePayload, &'static str> {
    let Value::Object(mut obj) = value else {
        return Err("not_an_object");
    };

    let items = match obj.remove("channels") {
        Some(Value::Array(items)) => items,
        Some(_) => return Err("channels_not_a_list"),
        None => return Err("channels_missing"),
    };

    let schema_version = obj
        .get("cache_header")
        .and_then(|h| h.get("schema_version"))
        .and_then(Value::as_u64)
        .unwrap_or(u64::from(CACHE_SCHEMA_VERSION));
    if schema_version > u64::from(CACHE_SCHEMA_VERSION) {
        tracing::warn!(schema_version, supported = CACHE_SCHEMA_VERSION, "Cache written by a newer schema");
        return Err("unsupported_schema_version");
    }

    let total = items.len();
    let channels: Vec<Channel> = items.iter().filter_map(Channel::from_stored).collect();
    if channels.len() != total {
        tracing::warn!(dropped = total - channels.len(), "Dropped non-object cache entries");
    }

    let aggregates = Aggregates::compute(&channels);
    let stored_stats = obj
        .get("stats")
        .and_then(|v| serde_json::from_value::<CategoryStats>(v.clone()).ok());
    if stored_stats != Some(aggregates.stats) {
        tracing::debug!(channels = channels.len(), "Backfilled cache stats");
    }

    let cache_header = obj
        .get("cache_header")
        .and_then(|v| serde_json::from_value::<CacheHeader>(v.clone()).ok())
        .unwrap_or_else(CacheHeader::current);

    let timestamp = string_field(&obj, "timestamp").unwrap_or_default();
    let last_refresh_status = obj
        .get("last_refresh_status")
        .and_then(|v| serde_json::from_value::<RefreshStatus>(v.clone()).ok())
        .unwrap_or(RefreshStatus::Success);
    let last_successful_refresh = string_field(&obj, "last_successful_refresh")
        .or_else(|| Some(timestamp.clone()).filter(|t| !t.is_empty()));

    Ok(CachePayload {
        host: string_field(&obj, "host").unwrap_or_default(),
        timestamp,
        channel_count: channels.len(),
        channels,
        stats: aggregates.stats,
        categories: aggregates.categories,
        group_counts: aggregates.group_counts,
        cache_header,
        last_refresh_status,
        last_refresh_error: string_field(&obj, "last_refresh_error"),
        last_successful_refresh,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Category;
    use serde_json::json;
    use tempfile::TempDir;

    fn sample_channels() -> Vec<Channel> {
        vec![
            Channel::new("CNN", "News", None, "http://x/cnn.ts"),
            Channel::new("Matrix", "VOD | Action", None, "http://x/matrix.mp4"),
            Channel::new("Friends S01", "TV Shows", None, "http://x/friends.mp4"),
            Channel::new("Mystery", "", None, ""),
        ]
    }

    fn corrupt_files(dir: &Path) -> Vec<String> {
        std::fs::read_dir(dir)
            .unwrap()
            .filter_map(|e| e.ok())
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .filter(|name| name.contains(".corrupt-"))
            .collect()
    }

    #[tokio::test]
    async fn test_save_then_load() {
        let dir = TempDir::new().unwrap();
        let store = CacheStore::new(dir.path());

        let saved = store.save("example.com", sample_channels()).await.unwrap();
        assert_eq!(saved.channel_count, 4);

        let loaded = store.load().await.unwrap().unwrap();
        assert_eq!(loaded.channel_count, loaded.channels.len());
        assert_eq!(loaded.stats.total, loaded.channel_count);
        assert_eq!(loaded.stats.tv, 1);
        assert_eq!(loaded.stats.movies, 1);
        assert_eq!(loaded.stats.series, 1);
        assert_eq!(loaded.stats.other, 1);
        assert_eq!(loaded.host, "example.com");
        assert_eq!(loaded.channels[3].url, "about:blank");
        assert!(!store.tmp_path().exists());
    }

    #[tokio::test]
    async fn test_save_updates_metadata() {
        let dir = TempDir::new().unwrap();
        let store = CacheStore::new(dir.path());
        assert_eq!(store.metadata().status, Some(RefreshStatus::Missing));

        store.record_failure("boom");
        let saved = store.save("example.com", sample_channels()).await.unwrap();

        let meta = store.metadata();
        assert_eq!(meta.status, Some(RefreshStatus::Success));
        assert!(meta.error.is_none());
        assert_eq!(meta.last_successful_refresh, Some(saved.timestamp));
    }

    #[tokio::test]
    async fn test_load_missing_file() {
        let dir = TempDir::new().unwrap();
        let store = CacheStore::new(dir.path().join("nested"));
        assert!(store.load().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_channels_not_a_list_is_quarantined() {
        let dir = TempDir::new().unwrap();
        let store = CacheStore::new(dir.path());
        std::fs::write(store.cache_path(), r#"{"channels": "not-a-list"}"#).unwrap();

        assert!(store.load().await.unwrap().is_none());
        assert!(!store.cache_path().exists());
        let quarantined = corrupt_files(dir.path());
        assert_eq!(quarantined.len(), 1);
        assert!(quarantined[0].starts_with("channels.corrupt-"));
        assert!(quarantined[0].ends_with(".json"));

        assert!(store.load().await.unwrap().is_none());
        assert_eq!(corrupt_files(dir.path()).len(), 1);
    }

    #[tokio::test]
    async fn test_malformed_json_is_quarantined() {
        let dir = TempDir::new().unwrap();
        let store = CacheStore::new(dir.path());
        std::fs::write(store.cache_path(), "{\"channels\": [").unwrap();

        assert!(store.load().await.unwrap().is_none());
        assert_eq!(corrupt_files(dir.path()).len(), 1);
    }

    #[tokio::test]
    async fn test_newer_schema_is_quarantined() {
        let dir = TempDir::new().unwrap();
        let store = CacheStore::new(dir.path());
        let body = json!({
            "host": "example.com",
            "timestamp": "2024-01-01T00:00:00+00:00",
            "channels": [],
            "cache_header": {"schema_version": CACHE_SCHEMA_VERSION + 1, "created_by": "future", "pid": 1}
        });
        std::fs::write(store.cache_path(), body.to_string()).unwrap();

        assert!(store.load().await.unwrap().is_none());
        assert_eq!(corrupt_files(dir.path()).len(), 1);
    }

    #[tokio::test]
    async fn test_legacy_file_is_backfilled() {
        let dir = TempDir::new().unwrap();
        let store = CacheStore::new(dir.path());
        let body = json!({
            "host": "example.com",
            "timestamp": "2024-01-01T00:00:00",
            "channels": [
                {"name": "CNN", "group": "News", "category": "tv", "url": "http://x/cnn.ts"},
                {"name": "Old", "group": "Cinema", "url": "http://x/old.mp4"},
                "garbage"
            ],
            "stats": {"tv": 10, "movies": 0, "series": 0, "other": 0, "total": 10}
        });
        std::fs::write(store.cache_path(), body.to_string()).unwrap();

        let payload = store.load().await.unwrap().unwrap();
        assert_eq!(payload.channel_count, 2);
        assert_eq!(payload.stats.total, 2);
        assert_eq!(payload.stats.tv, 1);
        assert_eq!(payload.stats.movies, 1);
        assert_eq!(payload.channels[1].category, Category::Movies);
        assert_eq!(payload.group_counts.get("Cinema"), Some(&1));
        assert_eq!(payload.cache_header.schema_version, CACHE_SCHEMA_VERSION);
        assert_eq!(payload.last_refresh_status, RefreshStatus::Success);
        assert_eq!(payload.last_successful_refresh.as_deref(), Some("2024-01-01T00:00:00"));

        let meta = store.metadata();
        assert_eq!(meta.status, Some(RefreshStatus::Success));
    }

    #[tokio::test]
    async fn test_load_does_not_override_mirror() {
        let dir = TempDir::new().unwrap();
        let store = CacheStore::new(dir.path());
        store.save("example.com", sample_channels()).await.unwrap();
        store.record_failure("IPTV request timed out");

        store.load().await.unwrap().unwrap();
        let meta = store.metadata();
        assert_eq!(meta.status, Some(RefreshStatus::Failed));
        assert_eq!(meta.error.as_deref(), Some("IPTV request timed out"));
    }

    #[tokio::test]
    async fn test_load_fills_missing_mirror_fields() {
        let dir = TempDir::new().unwrap();
        let saved = CacheStore::new(dir.path())
            .save("example.com", sample_channels())
            .await
            .unwrap();

        // fresh process: a refresh starts and fails before the cache is read
        let store = CacheStore::new(dir.path());
        store.record_loading();
        store.record_failure("IPTV request timed out");

        store.load().await.unwrap().unwrap();
        let meta = store.metadata();
        assert_eq!(meta.status, Some(RefreshStatus::Failed));
        assert_eq!(meta.error.as_deref(), Some("IPTV request timed out"));
        assert_eq!(meta.last_successful_refresh, Some(saved.timestamp));
    }

    #[test]
    fn test_is_valid() {
        let payload = CachePayload::build("example.com", sample_channels(), Utc::now());
        assert!(CacheStore::is_valid(&payload, "example.com", 60));
        assert!(!CacheStore::is_valid(&payload, "other.com", 60));

        let old = CachePayload::build(
            "example.com",
            sample_channels(),
            Utc::now() - chrono::Duration::seconds(120),
        );
        assert!(!CacheStore::is_valid(&old, "example.com", 60));
        assert!(CacheStore::is_valid(&old, "example.com", 3600));

        let mut broken = payload.clone();
        broken.timestamp = "yesterday".to_string();
        assert!(!CacheStore::is_valid(&broken, "example.com", 60));
    }

    #[test]
    fn test_parse_timestamp_formats() {
        assert!(parse_timestamp("2024-05-01T10:00:00+00:00").is_some());
        assert!(parse_timestamp("2024-05-01T10:00:00Z").is_some());
        assert!(parse_timestamp("2024-05-01T10:00:00.123456").is_some());
        assert!(parse_timestamp("").is_none());
    }

    #[test]
    fn test_get_stats() {
        assert_eq!(CacheStore::get_stats(None), CategoryStats::default());

        let mut payload = CachePayload::build("example.com", sample_channels(), Utc::now());
        assert_eq!(CacheStore::get_stats(Some(&payload)).total, 4);

        payload.stats = CategoryStats { tv: 9, ..CategoryStats::default() };
        let stats = CacheStore::get_stats(Some(&payload));
        assert_eq!(stats.total, 4);
        assert_eq!(stats.tv, 1);
    }

    #[test]
    fn test_get_group_counts() {
        assert!(CacheStore::get_group_counts(None).is_empty());

        let mut payload = CachePayload::build("example.com", sample_channels(), Utc::now());
        payload.group_counts.clear();
        let groups = CacheStore::get_group_counts(Some(&payload));
        assert_eq!(groups.get("News"), Some(&1));
        assert_eq!(groups.get("Unknown"), Some(&1));
    }
}
