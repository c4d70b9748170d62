//! Outbound request descriptor.

use crate::error::Result;
use bytes::Bytes;
use http::header::{HeaderName, HeaderValue, CONTENT_TYPE};
use http::{HeaderMap, Method};
use serde::Serialize;
use std::time::Duration;

/// Caller-supplied options for a single call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestOptions {
    /// Overrides the configured hard deadline for this call.
    pub timeout: Option<Duration>,
    /// Send the call without an `Authorization` header.
    pub skip_auth: bool,
}

/// A logical API call: method, target, headers, body and options.
///
/// `path` is resolved against the configured API base unless it is already an
/// absolute `http(s)` URL. The body is held as [`Bytes`] so a call can be
/// re-issued cheaply on 401 refresh or retry.
///
/// # Examples
///
/// ```
/// use resilient_client::ApiRequest;
/// use serde_json::json;
///
/// let request = ApiRequest::post("jobs")
///     .with_json(&json!({"job_type": "export"}))
///     .unwrap();
/// assert!(request.body.is_some());
/// ```
#[derive(Debug, Clone)]
pub struct ApiRequest {
    /// HTTP method.
    pub method: Method,
    /// Path relative to the API base, or an absolute URL.
    pub path: String,
    /// Request headers (case-insensitive names).
    pub headers: HeaderMap,
    /// Optional request body.
    pub body: Option<Bytes>,
    /// Per-call options.
    pub options: RequestOptions,
}

impl ApiRequest {
    /// Create a request with an arbitrary method.
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        ApiRequest {
            method,
            path: path.into(),
            headers: HeaderMap::new(),
            body: None,
            options: RequestOptions::default(),
        }
    }

    /// Create a GET request.
    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    /// Create a POST request.
    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    /// Create a PUT request.
    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::PUT, path)
    }

    /// Create a DELETE request.
    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    /// Set a header, replacing any previous value.
    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Set a raw body.
    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Serialize `value` as the JSON body and set `Content-Type: application/json`.
    pub fn with_json<T: Serialize + ?Sized>(mut self, value: &T) -> Result<Self> {
        let body = serde_json::to_vec(value)?;
        self.body = Some(Bytes::from(body));
        self.headers
            .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        Ok(self)
    }

    /// Override the hard deadline for this call.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.options.timeout = Some(timeout);
        self
    }

    /// Send the call unauthenticated.
    pub fn without_auth(mut self) -> Self {
        self.options.skip_auth = true;
        self
    }
}
