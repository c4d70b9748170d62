//! CSRF token resolution.
//!
//! A token is looked up in the shared cookie jar first. When the cookie is
//! absent, one unauthenticated `GET {API_BASE}/csrf` is issued and the
//! `csrf_token` field of its JSON body is used. The bootstrapped token is stored
//! back into the jar so later mutating calls find it there.
//!
//! Resolution never retries and never fails the caller: a missing token is a
//! valid outcome, and the backend remains the authority on whether a mutating
//! call without one is accepted.

use crate::client::config::ClientConfig;
use crate::error::{ClientError, Result};
use crate::protocol::{constants, cookie_value};
use reqwest::cookie::{CookieStore, Jar};
use serde_json::Value;
use std::sync::Arc;
use tokio::time::timeout;

/// Resolves the CSRF token for mutating requests.
#[derive(Clone)]
pub struct CsrfTokenSource {
    http: reqwest::Client,
    cookies: Arc<Jar>,
    config: Arc<ClientConfig>,
}

impl CsrfTokenSource {
    /// Create a source reading from `cookies` and bootstrapping through `http`.
    pub fn new(http: reqwest::Client, cookies: Arc<Jar>, config: Arc<ClientConfig>) -> Self {
        CsrfTokenSource { http, cookies, config }
    }

    /// Token from the cookie jar, if the API origin has one.
    pub fn from_cookie(&self) -> Option<String> {
        let header = self.cookies.cookies(&self.config.api_base)?;
        let header = header.to_str().ok()?;
        cookie_value(header, &self.config.csrf_cookie_name)
    }

    /// Cookie first, then a single bootstrap call. `None` if both come up empty.
    pub async fn resolve(&self) -> Option<String> {
        if let Some(token) = self.from_cookie() {
            return Some(token);
        }

        match self.bootstrap().await {
            Ok(Some(token)) => Some(token),
            Ok(None) => {
                tracing::warn!("CSRF bootstrap response carried no token");
                None
            }
            Err(err) => {
                tracing::warn!(error = %err, "CSRF bootstrap failed, continuing without token");
                None
            }
        }
    }

    async fn bootstrap(&self) -> Result<Option<String>> {
        let url = self.config.endpoint(constants::endpoints::CSRF)?;
        let deadline = self.config.request_timeout();

        let response = timeout(deadline, self.http.get(url).send())
            .await
            .map_err(|_| ClientError::Timeout(deadline))??;

        if !response.status().is_success() {
            tracing::warn!(status = response.status().as_u16(), "CSRF endpoint rejected bootstrap");
            return Ok(None);
        }

        let body: Value = timeout(deadline, response.json())
            .await
            .map_err(|_| ClientError::Timeout(deadline))??;

        let token = body
            .get(constants::CSRF_TOKEN_FIELD)
            .and_then(Value::as_str)
            .filter(|token| !token.is_empty())
            .map(str::to_string);

        if let Some(token) = &token {
            let cookie = format!("{}={}; Path=/", self.config.csrf_cookie_name, token);
            self.cookies.add_cookie_str(&cookie, &self.config.api_base);
        }

        Ok(token)
    }
}
