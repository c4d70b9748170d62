//! Utility functions for the request client.
//!
//! - Retry delay calculation
//! - Status code classification

use http::StatusCode;
use std::time::Duration;

/// Exponential backoff delay: `base_ms * 2^attempt`.
///
/// `attempt` is zero-based, so with a one second base the waits are 1 s, 2 s,
/// 4 s... The exponent is capped at 10.
pub fn exponential_backoff(attempt: u32, base_ms: u64) -> Duration {
    let delay_ms = base_ms.saturating_mul(2_u64.pow(attempt.min(10)));
    Duration::from_millis(delay_ms)
}

/// Check if status is retried with backoff by `send_with_retry`.
pub fn is_backoff_status(status: StatusCode) -> bool {
    status == StatusCode::SERVICE_UNAVAILABLE
}

/// Check if status indicates the token is no longer accepted.
pub fn is_auth_expired_status(status: StatusCode) -> bool {
    status == StatusCode::UNAUTHORIZED
}

/// Check if status indicates access denied for an authenticated user.
pub fn is_forbidden_status(status: StatusCode) -> bool {
    status == StatusCode::FORBIDDEN
}

/// Check if status indicates rate limiting.
pub fn is_rate_limited_status(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS
}
