//! Resilient request client.
//!
//! Every call made by page code goes through [`ResilientClient`]. A single
//! [`send`](ResilientClient::send) applies, in order:
//!
//! 1. a hard deadline over the whole call (30 s by default)
//! 2. `X-CSRF-Token` injection on mutating methods
//! 3. dispatch with `Authorization: Bearer <token>`
//! 4. one refresh-and-retry on 401
//! 5. the rate-limit warning on 429
//! 6. the tenant-isolation scan on 2xx JSON bodies
//! 7. body sanitization on 5xx
//!
//! Transport failures are logged and returned as [`ClientError::Network`];
//! retrying them is the job of [`send_with_retry`](ResilientClient::send_with_retry),
//! which also backs off on 503 and reports 403 to the user.
//!
//! # Examples
//!
//! ```ignore
//! use resilient_client::{AppContext, ApiRequest, ClientConfig, StaticSession, Session};
//! use std::sync::Arc;
//!
//! let session = Arc::new(StaticSession::new(Session::new("token").with_tenant("acme")));
//! let context = AppContext::new(ClientConfig::from_env()?, session)?;
//!
//! let response = context.client().get("jobs").await?;
//! if response.is_success() {
//!     let jobs: Vec<serde_json::Value> = response.json()?;
//! }
//! ```

use crate::client::config::ClientConfig;
use crate::client::csrf::CsrfTokenSource;
use crate::client::sanitize::sanitize_response;
use crate::client::tenant::TenantScan;
use crate::client::utils::{
    exponential_backoff, is_auth_expired_status, is_backoff_status, is_forbidden_status,
    is_rate_limited_status,
};
use crate::error::{ClientError, Result};
use crate::notify::{NotificationSink, Severity, ACCESS_RESTRICTED_MESSAGE, DEFAULT_DURATION};
use crate::protocol::{bearer_value, constants, is_mutating_method};
use crate::session::{Session, SessionProvider};
use crate::types::{ApiRequest, ApiResponse};
use bytes::Bytes;
use http::header::{HeaderValue, AUTHORIZATION};
use http::{HeaderMap, Method};
use reqwest::cookie::Jar;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, timeout};
use url::Url;

/// Build the transport shared by the request client, the CSRF source and the
/// update stream. Cookies set by the backend land in `cookies`.
///
/// No transport-level timeout is set: request deadlines are enforced per call,
/// and the update stream is long-lived.
pub fn build_http_client(cookies: Arc<Jar>) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .cookie_provider(cookies)
        .connect_timeout(Duration::from_secs(10))
        .pool_idle_timeout(Duration::from_secs(90))
        .build()
        .map_err(|err| ClientError::Config(err.to_string()))
}

/// HTTP client that survives token expiry, transient outages and rate limits.
#[derive(Clone)]
pub struct ResilientClient {
    http: reqwest::Client,
    config: Arc<ClientConfig>,
    session: Arc<dyn SessionProvider>,
    notifier: Arc<dyn NotificationSink>,
    csrf: CsrfTokenSource,
}

impl ResilientClient {
    /// Create a client over an existing transport and cookie jar.
    pub fn new(
        http: reqwest::Client,
        cookies: Arc<Jar>,
        config: Arc<ClientConfig>,
        session: Arc<dyn SessionProvider>,
        notifier: Arc<dyn NotificationSink>,
    ) -> Self {
        let csrf = CsrfTokenSource::new(http.clone(), cookies, config.clone());
        ResilientClient {
            http,
            config,
            session,
            notifier,
            csrf,
        }
    }

    /// Create a client with its own transport and cookie jar.
    pub fn with_config(
        config: ClientConfig,
        session: Arc<dyn SessionProvider>,
        notifier: Arc<dyn NotificationSink>,
    ) -> Result<Self> {
        let cookies = Arc::new(Jar::default());
        let http = build_http_client(cookies.clone())?;
        Ok(Self::new(http, cookies, Arc::new(config), session, notifier))
    }

    /// GET `path` with the default retry policy.
    pub async fn get(&self, path: &str) -> Result<ApiResponse> {
        self.retry(ApiRequest::get(path)).await
    }

    /// POST `body` as JSON to `path` with the default retry policy.
    pub async fn post_json<T: Serialize + ?Sized>(&self, path: &str, body: &T) -> Result<ApiResponse> {
        self.retry(ApiRequest::post(path).with_json(body)?).await
    }

    /// PUT `body` as JSON to `path` with the default retry policy.
    pub async fn put_json<T: Serialize + ?Sized>(&self, path: &str, body: &T) -> Result<ApiResponse> {
        self.retry(ApiRequest::put(path).with_json(body)?).await
    }

    /// DELETE `path` with the default retry policy.
    pub async fn delete(&self, path: &str) -> Result<ApiResponse> {
        self.retry(ApiRequest::delete(path)).await
    }

    /// `send_with_retry` using the configured attempt count.
    pub async fn retry(&self, request: ApiRequest) -> Result<ApiResponse> {
        self.send_with_retry(request, self.config.max_attempts).await
    }

    /// Perform one logical call under the hard deadline.
    ///
    /// # Errors
    ///
    /// - [`ClientError::Timeout`] when the deadline elapses; the in-flight
    ///   transport call is dropped
    /// - [`ClientError::Network`] when the transport fails
    /// - [`ClientError::Security`] when a 2xx body belongs to another tenant
    ///
    /// 401, 403, 429 and 5xx are returned as responses, not errors.
    pub async fn send(&self, request: ApiRequest) -> Result<ApiResponse> {
        let deadline = request
            .options
            .timeout
            .unwrap_or_else(|| self.config.request_timeout());
        let method = request.method.clone();
        let path = request.path.clone();

        match timeout(deadline, self.send_inner(request)).await {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!(%method, %path, ?deadline, "request timed out");
                Err(ClientError::Timeout(deadline))
            }
        }
    }

    /// Call [`send`](Self::send) up to `max_attempts` times.
    ///
    /// - 503 responses and retryable errors wait `2^attempt * retry_delay_ms`
    ///   before the next attempt; the last 503 is returned as-is
    /// - a 403 response shows the "access restricted" toast
    /// - security errors are returned immediately
    pub async fn send_with_retry(&self, request: ApiRequest, max_attempts: u32) -> Result<ApiResponse> {
        let max_attempts = max_attempts.max(1);
        let mut last_error = None;

        for attempt in 0..max_attempts {
            let is_last = attempt + 1 == max_attempts;

            match self.send(request.clone()).await {
                Ok(response) if is_backoff_status(response.status) && !is_last => {
                    self.backoff(attempt, "service unavailable").await;
                }
                Ok(response) => {
                    if is_forbidden_status(response.status) {
                        self.notifier.add_toast(
                            ACCESS_RESTRICTED_MESSAGE,
                            Severity::Warning,
                            Some(DEFAULT_DURATION),
                        );
                    }
                    return Ok(response);
                }
                Err(err) if err.is_retryable() => {
                    if !is_last {
                        self.backoff(attempt, &err).await;
                    }
                    last_error = Some(err);
                }
                Err(err) => return Err(err),
            }
        }

        Err(last_error.unwrap_or(ClientError::RetryExhausted))
    }

    async fn backoff(&self, attempt: u32, reason: impl std::fmt::Display) {
        let delay = exponential_backoff(attempt, self.config.retry_delay_ms);
        if self.config.enable_logging {
            tracing::warn!(
                "Request failed (attempt {}), retrying after {:?}: {}",
                attempt + 1,
                delay,
                reason
            );
        }
        sleep(delay).await;
    }

    async fn send_inner(&self, request: ApiRequest) -> Result<ApiResponse> {
        let ApiRequest {
            method,
            path,
            mut headers,
            body,
            options,
        } = request;
        let url = self.config.endpoint(&path)?;

        // The tenant scan needs the session even when no token is sent.
        let mut session = self.session.current().await;
        if let Some(active) = session.as_ref().filter(|_| !options.skip_auth) {
            headers.insert(AUTHORIZATION, bearer_value(&active.access_token)?);
        }

        if is_mutating_method(&method) {
            self.attach_csrf(&mut headers).await;
        }

        let mut response = self.dispatch(&method, &url, &headers, body.as_ref()).await?;

        if is_auth_expired_status(response.status()) && !options.skip_auth {
            match self.session.refresh().await {
                Ok(Some(refreshed)) => {
                    tracing::debug!(%method, %url, "token refreshed, replaying request");
                    headers.insert(AUTHORIZATION, bearer_value(&refreshed.access_token)?);
                    session = Some(refreshed);
                    response = self.dispatch(&method, &url, &headers, body.as_ref()).await?;
                }
                Ok(None) => tracing::warn!(%method, %url, "session refresh produced no token"),
                Err(err) => tracing::warn!(%method, %url, error = %err, "session refresh failed"),
            }
        }

        let status = response.status();
        let response_headers = response.headers().clone();
        let bytes = response.bytes().await.map_err(|err| {
            tracing::error!(%method, %url, error = %err, "failed reading response body");
            ClientError::Network(err)
        })?;

        let envelope = ApiResponse {
            status,
            headers: response_headers,
            body: bytes,
            sanitized: false,
        };

        if is_rate_limited_status(status) {
            self.notifier.show_rate_limit_warning();
        }

        if status.is_success() {
            self.verify_tenant(session.as_ref(), &envelope, &url)?;
        }

        if status.is_server_error() {
            return Ok(sanitize_response(envelope));
        }

        Ok(envelope)
    }

    async fn attach_csrf(&self, headers: &mut HeaderMap) {
        let Some(token) = self.csrf.resolve().await else {
            tracing::debug!("no CSRF token available, sending without one");
            return;
        };
        match HeaderValue::from_str(&token) {
            Ok(value) => {
                headers.insert(constants::headers::X_CSRF_TOKEN, value);
            }
            Err(err) => tracing::warn!(error = %err, "CSRF token is not a valid header value"),
        }
    }

    async fn dispatch(
        &self,
        method: &Method,
        url: &Url,
        headers: &HeaderMap,
        body: Option<&Bytes>,
    ) -> Result<reqwest::Response> {
        let mut builder = self
            .http
            .request(method.clone(), url.clone())
            .headers(headers.clone());
        if let Some(body) = body {
            builder = builder.body(body.clone());
        }

        builder.send().await.map_err(|err| {
            tracing::error!(%method, %url, error = %err, "transport failure");
            ClientError::Network(err)
        })
    }

    fn verify_tenant(&self, session: Option<&Session>, response: &ApiResponse, url: &Url) -> Result<()> {
        let Some(tenant) = session.and_then(|s| s.tenant_id.as_deref()) else {
            return Ok(());
        };

        TenantScan::new(tenant, self.config.max_scan_depth)
            .verify_body(&response.body)
            .map_err(|violation| {
                tracing::error!(%url, %violation, "tenant isolation violation");
                ClientError::Security(violation)
            })
    }

    /// Get the client configuration
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// The CSRF token source used for mutating calls.
    pub fn csrf(&self) -> &CsrfTokenSource {
        &self.csrf
    }
}
