//! Error types for the resilient client.
//!
//! Every fallible operation in the crate returns [`Result<T>`], an alias over
//! [`ClientError`]. HTTP status codes such as 401, 403, 429 and 5xx are *not*
//! errors: they come back as [`ApiResponse`](crate::ApiResponse) values and the
//! caller branches on the status.
//!
//! # Taxonomy
//!
//! | Variant | Raised when | Retried by `send_with_retry` |
//! |---------|-------------|------------------------------|
//! | [`ClientError::Timeout`] | The hard per-call deadline elapsed | yes |
//! | [`ClientError::Network`] | The transport failed (DNS, reset, refused) | yes |
//! | [`ClientError::Security`] | A response leaked another tenant's data | never |
//! | everything else | Misconfiguration or malformed input | no |
//!
//! Security errors are deliberately distinguishable through
//! [`ClientError::is_security`] so application code can force a logout.

use std::time::Duration;
use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, ClientError>;

/// Errors surfaced by the request client and the update stream.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The call exceeded its hard deadline and was cancelled.
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    /// The underlying transport failed before a response was received.
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// A successful response failed the tenant-isolation scan.
    #[error(transparent)]
    Security(#[from] SecurityError),

    /// A URL could not be built from the configured base.
    #[error("invalid url: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// A header name or value could not be encoded.
    #[error("invalid header: {0}")]
    Header(String),

    /// A payload could not be serialized or deserialized.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// The update stream endpoint answered with a non-success status.
    #[error("update stream rejected with status {0}")]
    StreamStatus(u16),

    /// The client could not be configured.
    #[error("configuration error: {0}")]
    Config(String),

    /// The retry loop ended without recording any error.
    #[error("retry loop exhausted without capturing an error")]
    RetryExhausted,
}

impl ClientError {
    /// Whether the retry wrapper may attempt the call again.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ClientError::Timeout(_) | ClientError::Network(_))
    }

    /// Whether this is a tenant-isolation violation.
    pub fn is_security(&self) -> bool {
        matches!(self, ClientError::Security(_))
    }
}

impl From<http::header::InvalidHeaderValue> for ClientError {
    fn from(err: http::header::InvalidHeaderValue) -> Self {
        ClientError::Header(err.to_string())
    }
}

impl From<http::header::InvalidHeaderName> for ClientError {
    fn from(err: http::header::InvalidHeaderName) -> Self {
        ClientError::Header(err.to_string())
    }
}

/// A tenant-isolation violation detected in a response body.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SecurityError {
    /// A nested `tenant_id` did not match the session's tenant.
    #[error("tenant isolation violation at {path}: expected tenant {expected}, found {found}")]
    TenantMismatch {
        /// Tenant bound to the active session.
        expected: String,
        /// Tenant found in the response.
        found: String,
        /// JSON pointer of the offending field.
        path: String,
    },

    /// The payload nested deeper than the scan is allowed to descend.
    #[error("tenant scan aborted: payload nests deeper than {limit} levels")]
    ScanDepthExceeded {
        /// Configured maximum depth.
        limit: usize,
    },
}
