//! Prometheus metrics for the refresh pipeline
//!
//! Registered in the default registry; `GET /metrics` gathers them.

use lazy_static::lazy_static;
use prometheus::{register_int_counter_vec, register_int_gauge, IntCounterVec, IntGauge};

lazy_static! {
    /// Completed refresh runs by outcome (success / failed)
    pub static ref REFRESH_RUNS: IntCounterVec = register_int_counter_vec!(
        "iptv_refresh_runs_total",
        "Completed channel refresh runs",
        &["outcome"]
    )
    .unwrap();

    /// Playlist download attempts by result (ok or failure tag)
    pub static ref FETCH_ATTEMPTS: IntCounterVec = register_int_counter_vec!(
        "iptv_fetch_attempts_total",
        "Playlist download attempts",
        &["result"]
    )
    .unwrap();

    /// Channels in the last saved snapshot
    pub static ref CACHED_CHANNELS: IntGauge = register_int_gauge!(
        "iptv_cached_channels",
        "Channels in the current cache snapshot"
    )
    .unwrap();
}

pub fn record_fetch_attempt(result: &str) {
    FETCH_ATTEMPTS.with_label_values(&[result]).inc();
}

pub fn record_refresh(outcome: &str) {
    REFRESH_RUNS.with_label_values(&[outcome]).inc();
}

pub fn set_cached_channels(count: usize) {
    CACHED_CHANNELS.set(count as i64);
}
