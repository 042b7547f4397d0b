use std::env;
use std::str::FromStr;

use crate::models::Credentials;

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    // Server
    pub port: u16,
    pub max_page_size: usize,

    // Cache
    pub cache_dir: String,
    pub cache_ttl_seconds: u64,

    // Provider account (optional, can be set later via /login)
    pub iptv_host: Option<String>,
    pub iptv_username: Option<String>,
    pub iptv_password: Option<String>,

    // Fetching
    pub user_agent: String,
    pub verify_ssl: bool,
    pub connect_timeout_secs: u64,
    pub read_timeout_secs: u64,
    pub fetch_max_attempts: u32,
    pub fetch_backoff_base_ms: u64,

    // Refresh
    pub heartbeat_interval_secs: u64,
    pub refresh_on_startup: bool,
    pub channel_filter_keywords: Vec<String>,
}

fn parsed_or<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn flag_or(key: &str, default: bool) -> bool {
    match env::var(key) {
        Ok(v) => match v.trim().to_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => true,
            "0" | "false" | "no" | "off" => false,
            _ => default,
        },
        Err(_) => default,
    }
}

fn optional(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Comma-separated list, blanks dropped
pub fn split_keywords(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .map(str::to_string)
        .collect()
}

impl Config {
    /// Load configuration from environment variables with defaults
    pub fn from_env() -> Self {
        Self {
            // Server
            port: parsed_or("PORT", 8000),
            max_page_size: parsed_or("MAX_PAGE_SIZE", 100),

            // Cache
            cache_dir: env::var("CACHE_DIR").unwrap_or_else(|_| ".channel-cache".to_string()),
            cache_ttl_seconds: parsed_or("CACHE_TTL_SECONDS", 21_600), // 6 hours

            // Provider account
            iptv_host: optional("IPTV_HOST"),
            iptv_username: optional("IPTV_USERNAME"),
            iptv_password: optional("IPTV_PASSWORD"),

            // Fetching - player user agent to avoid provider blocks
            user_agent: env::var("USER_AGENT").unwrap_or_else(|_| "IPTVSmartersPro".to_string()),
            verify_ssl: flag_or("VERIFY_SSL", true),
            connect_timeout_secs: parsed_or("CONNECT_TIMEOUT_SECS", 10),
            read_timeout_secs: parsed_or("READ_TIMEOUT_SECS", 90),
            fetch_max_attempts: parsed_or("FETCH_MAX_ATTEMPTS", 3),
            fetch_backoff_base_ms: parsed_or("FETCH_BACKOFF_BASE_MS", 1000),

            // Refresh
            heartbeat_interval_secs: parsed_or("HEARTBEAT_INTERVAL_SECS", 5),
            refresh_on_startup: flag_or("REFRESH_ON_STARTUP", true),
            channel_filter_keywords: env::var("CHANNEL_FILTER_KEYWORDS")
                .map(|v| split_keywords(&v))
                .unwrap_or_default(),
        }
    }

    /// Startup credentials, when all three variables are set
    pub fn credentials(&self) -> Option<Credentials> {
        match (&self.iptv_host, &self.iptv_username, &self.iptv_password) {
            (Some(host), Some(username), Some(password)) => {
                Some(Credentials::new(host.as_str(), username.as_str(), password.as_str()))
            }
            _ => None,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::from_env()
    }
}
