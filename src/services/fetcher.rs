//! Playlist download with retry/backoff and typed failure classification.
//!
//! A [`Transport`] performs one HTTP attempt; [`PlaylistFetcher`] owns the
//! retry loop and is exposed to the refresh coordinator as a [`PlaylistSource`].

use async_trait::async_trait;
use reqwest::{header, Client, StatusCode};
use std::error::Error as StdError;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info, warn};
use url::Url;

use crate::config::Config;
use crate::models::Credentials;
use crate::services::metrics;

/// Failure reason of a single download attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchErrorKind {
    SslError,
    Timeout,
    ConnectionError,
    HttpStatus(u16),
    EmptyBody,
    RequestError,
    UnexpectedError,
}

impl FetchErrorKind {
    /// Transient failures worth another attempt
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            FetchErrorKind::SslError
                | FetchErrorKind::Timeout
                | FetchErrorKind::ConnectionError
                | FetchErrorKind::HttpStatus(_)
                | FetchErrorKind::EmptyBody
        )
    }

    /// Bounded metric label (status codes stay in the logs)
    pub fn label(&self) -> &'static str {
        match self {
            FetchErrorKind::SslError => "ssl_error",
            FetchErrorKind::Timeout => "timeout",
            FetchErrorKind::ConnectionError => "connection_error",
            FetchErrorKind::HttpStatus(_) => "http_status",
            FetchErrorKind::EmptyBody => "empty_body",
            FetchErrorKind::RequestError => "request_error",
            FetchErrorKind::UnexpectedError => "unexpected_error",
        }
    }
}

impl std::fmt::Display for FetchErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FetchErrorKind::SslError => write!(f, "ssl_error"),
            FetchErrorKind::Timeout => write!(f, "timeout"),
            FetchErrorKind::ConnectionError => write!(f, "connection_error"),
            FetchErrorKind::HttpStatus(code) => write!(f, "http_status:{}", code),
            FetchErrorKind::EmptyBody => write!(f, "empty_body"),
            FetchErrorKind::RequestError => write!(f, "request_error"),
            FetchErrorKind::UnexpectedError => write!(f, "unexpected_error"),
        }
    }
}

/// Download failure: the reason tag plus a human-readable message
#[derive(Debug, Clone, thiserror::Error)]
#[error("{message}")]
pub struct FetchError {
    pub kind: FetchErrorKind,
    pub message: String,
    /// Attempts made when this error was surfaced
    pub attempts: u32,
}

impl FetchError {
    pub fn new(kind: FetchErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            attempts: 0,
        }
    }

    pub fn ssl() -> Self {
        Self::new(FetchErrorKind::SslError, "SSL verification failed (self-signed certificate)")
    }

    pub fn timeout() -> Self {
        Self::new(FetchErrorKind::Timeout, "IPTV request timed out")
    }

    pub fn connection() -> Self {
        Self::new(FetchErrorKind::ConnectionError, "IPTV server closed the connection")
    }

    pub fn http_status(code: u16) -> Self {
        Self::new(
            FetchErrorKind::HttpStatus(code),
            format!("IPTV server returned HTTP {}", code),
        )
    }

    pub fn empty_body() -> Self {
        Self::new(FetchErrorKind::EmptyBody, "Empty M3U playlist received from IPTV provider")
    }

    pub fn request(detail: impl std::fmt::Display) -> Self {
        Self::new(FetchErrorKind::RequestError, format!("IPTV request failed: {}", detail))
    }

    pub fn unexpected(detail: impl std::fmt::Display) -> Self {
        Self::new(FetchErrorKind::UnexpectedError, format!("Unexpected IPTV error: {}", detail))
    }
}

/// Source of raw playlist text (the coordinator's view of the fetcher)
#[async_trait]
pub trait PlaylistSource: Send + Sync {
    async fn fetch(&self, credentials: &Credentials) -> Result<String, FetchError>;
}

/// One HTTP GET returning a non-empty text body
#[async_trait]
pub trait Transport: Send + Sync {
    async fn get_text(&self, url: &str) -> Result<String, FetchError>;
}

/// Connection settings for [`HttpTransport`]
#[derive(Debug, Clone)]
pub struct HttpSettings {
    pub user_agent: String,
    pub connect_timeout: Duration,
    pub read_timeout: Duration,
    pub verify_ssl: bool,
}

impl HttpSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            user_agent: config.user_agent.clone(),
            connect_timeout: Duration::from_secs(config.connect_timeout_secs),
            read_timeout: Duration::from_secs(config.read_timeout_secs),
            verify_ssl: config.verify_ssl,
        }
    }
}

/// reqwest-backed transport with a player-like header set
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new(settings: &HttpSettings) -> Result<Self, reqwest::Error> {
        let mut headers = header::HeaderMap::new();
        headers.insert(header::ACCEPT, header::HeaderValue::from_static("*/*"));
        headers.insert(header::CONNECTION, header::HeaderValue::from_static("close"));

        let client = Client::builder()
            .user_agent(settings.user_agent.as_str())
            .default_headers(headers)
            .connect_timeout(settings.connect_timeout)
            .timeout(settings.read_timeout)
            .gzip(true)
            .deflate(true)
            .danger_accept_invalid_certs(!settings.verify_ssl)
            .build()?;

        Ok(Self { client })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn get_text(&self, url: &str) -> Result<String, FetchError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| classify_reqwest_error(&e))?;

        let status = response.status();
        debug!(status = status.as_u16(), "M3U response status");
        if status != StatusCode::OK {
            return Err(FetchError::http_status(status.as_u16()));
        }

        let text = response.text().await.map_err(|e| classify_reqwest_error(&e))?;
        if text.trim().is_empty() {
            return Err(FetchError::empty_body());
        }

        Ok(text)
    }
}

fn error_chain<'a>(err: &'a (dyn StdError + 'static)) -> impl Iterator<Item = &'a (dyn StdError + 'static)> {
    std::iter::successors(Some(err), |e| (*e).source())
}

fn is_tls_failure(err: &reqwest::Error) -> bool {
    // the top-level message embeds the request URL; only inspect causes
    error_chain(err).skip(1).any(|e| {
        let msg = e.to_string().to_lowercase();
        msg.contains("certificate") || msg.contains("ssl") || msg.contains("tls") || msg.contains("handshake")
    })
}

/// Reset/abort at the socket, or the server closing before a complete response
fn is_connection_reset(err: &reqwest::Error) -> bool {
    error_chain(err).any(|e| {
        if let Some(hyper_err) = e.downcast_ref::<hyper::Error>() {
            return hyper_err.is_incomplete_message() || hyper_err.is_closed();
        }
        e.downcast_ref::<std::io::Error>().is_some_and(|io| {
            matches!(
                io.kind(),
                std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::ConnectionAborted
                    | std::io::ErrorKind::BrokenPipe
                    | std::io::ErrorKind::UnexpectedEof
            )
        })
    })
}

/// Map a reqwest error to a failure reason
pub fn classify_reqwest_error(err: &reqwest::Error) -> FetchError {
    if is_tls_failure(err) {
        FetchError::ssl()
    } else if err.is_timeout() {
        FetchError::timeout()
    } else if err.is_connect() || is_connection_reset(err) {
        FetchError::connection()
    } else if err.is_request() || err.is_body() || err.is_decode() || err.is_redirect() {
        FetchError::request(err)
    } else {
        FetchError::unexpected(err)
    }
}

/// Strip scheme, path and surrounding slashes from a provider host
pub fn normalize_host(host: &str) -> String {
    let trimmed = host.trim();
    let netloc = if trimmed.contains("://") {
        match Url::parse(trimmed) {
            Ok(url) => match (url.host_str(), url.port()) {
                (Some(h), Some(port)) => format!("{}:{}", h, port),
                (Some(h), None) => h.to_string(),
                (None, _) => trimmed.to_string(),
            },
            Err(_) => trimmed
                .split_once("://")
                .map(|(_, rest)| rest.split('/').next().unwrap_or_default().to_string())
                .unwrap_or_default(),
        }
    } else {
        trimmed.to_string()
    };

    netloc.trim().trim_matches('/').to_string()
}

/// Build the M3U playlist URL from credentials
pub fn build_playlist_url(credentials: &Credentials) -> String {
    format!(
        "http://{}/playlist/{}/{}/m3u",
        normalize_host(&credentials.host),
        urlencoding::encode(credentials.username.trim()),
        urlencoding::encode(credentials.password.trim())
    )
}

fn masked_url(credentials: &Credentials) -> String {
    let password = urlencoding::encode(credentials.password.trim()).into_owned();
    build_playlist_url(credentials).replace(&format!("/{}/m3u", password), "/***/m3u")
}

/// Playlist fetcher with bounded exponential backoff
pub struct PlaylistFetcher<T: Transport> {
    transport: T,
    max_attempts: u32,
    backoff_base: Duration,
}

impl PlaylistFetcher<HttpTransport> {
    /// Fetcher over a real HTTP client configured from `Config`
    pub fn from_config(config: &Config) -> Result<Self, reqwest::Error> {
        let transport = HttpTransport::new(&HttpSettings::from_config(config))?;
        Ok(Self::new(
            transport,
            config.fetch_max_attempts,
            Duration::from_millis(config.fetch_backoff_base_ms),
        ))
    }
}

impl<T: Transport> PlaylistFetcher<T> {
    pub fn new(transport: T, max_attempts: u32, backoff_base: Duration) -> Self {
        Self {
            transport,
            max_attempts: max_attempts.max(1),
            backoff_base,
        }
    }

    /// Delay after the given failed attempt (1-indexed): base, 2*base, 4*base...
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let multiplier = 1u32.checked_shl(attempt.saturating_sub(1)).unwrap_or(u32::MAX);
        self.backoff_base.saturating_mul(multiplier)
    }

    async fn fetch_with_retry(&self, credentials: &Credentials) -> Result<String, FetchError> {
        if !credentials.is_complete() {
            return Err(FetchError::new(FetchErrorKind::RequestError, "Incomplete IPTV credentials"));
        }

        let url = build_playlist_url(credentials);
        info!(url = %masked_url(credentials), max_attempts = self.max_attempts, "M3U download start");

        for attempt in 1..=self.max_attempts {
            match self.transport.get_text(&url).await {
                Ok(text) => {
                    metrics::record_fetch_attempt("ok");
                    info!(attempt, bytes = text.len(), "M3U download complete");
                    return Ok(text);
                }
                Err(mut err) => {
                    err.attempts = attempt;
                    metrics::record_fetch_attempt(err.kind.label());

                    if !err.kind.is_retryable() || attempt >= self.max_attempts {
                        warn!(attempt, reason = %err.kind, error = %err, "M3U download failed");
                        return Err(err);
                    }

                    let delay = self.backoff_delay(attempt);
                    warn!(
                        attempt,
                        max = self.max_attempts,
                        reason = %err.kind,
                        delay_ms = delay.as_millis() as u64,
                        "M3U download attempt failed, retrying"
                    );
                    sleep(delay).await;
                }
            }
        }

        // max_attempts is at least 1, so the loop always returns
        Err(FetchError::unexpected("retry loop exited without result"))
    }
}

#[async_trait]
impl<T: Transport> PlaylistSource for PlaylistFetcher<T> {
    async fn fetch(&self, credentials: &Credentials) -> Result<String, FetchError> {
        self.fetch_with_retry(credentials).await
    }
}
