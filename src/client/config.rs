//! Client configuration.

use crate::error::{ClientError, Result};
use std::time::Duration;
use url::Url;

/// Environment variable holding the backend API base URL.
pub const API_BASE_ENV: &str = "API_BASE_URL";

/// Configuration shared by the request client and the update stream.
///
/// Durations are stored in milliseconds so the struct can be built with
/// struct-update syntax:
///
/// ```
/// use resilient_client::client::ClientConfig;
///
/// let config = ClientConfig {
///     max_attempts: 5,
///     retry_delay_ms: 250,
///     ..Default::default()
/// };
/// assert_eq!(config.request_timeout_ms, 30_000);
/// ```
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Backend API base. Always ends with `/`.
    pub api_base: Url,
    /// Hard deadline for one `send` call.
    pub request_timeout_ms: u64,
    /// Default total attempts for `send_with_retry`.
    pub max_attempts: u32,
    /// Backoff unit: attempt `n` waits `2^n * retry_delay_ms`.
    pub retry_delay_ms: u64,
    /// Fixed delay before the update stream reconnects.
    pub reconnect_delay_ms: u64,
    /// Name of the cookie carrying the CSRF token.
    pub csrf_cookie_name: String,
    /// Deepest nesting the tenant scan will descend into.
    pub max_scan_depth: usize,
    /// Capacity of the job batch broadcast channel.
    pub stream_buffer: usize,
    /// Log retries and reconnects.
    pub enable_logging: bool,
}

impl ClientConfig {
    /// Configuration for the given API base with default policy.
    pub fn new(api_base: &str) -> Result<Self> {
        Ok(ClientConfig {
            api_base: normalize_base(api_base)?,
            ..Default::default()
        })
    }

    /// Configuration whose API base comes from `API_BASE_URL`.
    pub fn from_env() -> Result<Self> {
        let base = std::env::var(API_BASE_ENV)
            .map_err(|_| ClientError::Config(format!("{} is not set", API_BASE_ENV)))?;
        Self::new(&base)
    }

    /// Resolve a path against the API base. Absolute `http(s)` URLs pass through.
    pub fn endpoint(&self, path: &str) -> Result<Url> {
        if path.starts_with("http://") || path.starts_with("https://") {
            return Ok(Url::parse(path)?);
        }
        Ok(self.api_base.join(path.trim_start_matches('/'))?)
    }

    /// Hard deadline as a `Duration`.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Reconnect delay as a `Duration`.
    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfig {
            api_base: Url::parse("http://localhost:8000/api/").expect("static url is valid"),
            request_timeout_ms: 30_000,
            max_attempts: 3,
            retry_delay_ms: 1_000,
            reconnect_delay_ms: 5_000,
            csrf_cookie_name: "csrf_token".to_string(),
            max_scan_depth: 64,
            stream_buffer: 100,
            enable_logging: true,
        }
    }
}

fn normalize_base(base: &str) -> Result<Url> {
    let mut url = Url::parse(base.trim())?;
    if url.cannot_be_a_base() {
        return Err(ClientError::Config(format!("{} cannot be used as an API base", base)));
    }
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}
