//! 5xx response sanitization.
//!
//! Backend errors can carry stack traces, file paths or panic messages. None of
//! that may reach page code. Every response with status 500 or above is
//! rewritten to the fixed envelope
//!
//! ```json
//! {"error": "Internal Server Error", "message": "<safe>", "code": "SERVER_ERROR"}
//! ```
//!
//! keeping only the original status code. The backend's `message` (or `detail`)
//! field is kept when it looks like a deliberate, user-facing sentence; anything
//! carrying internal markers, or nothing at all, becomes [`GENERIC_SERVER_MESSAGE`].

use crate::protocol::constants::{SERVER_ERROR_CODE, SERVER_ERROR_TITLE};
use crate::types::ApiResponse;
use bytes::Bytes;
use http::header::{HeaderValue, CONTENT_ENCODING, CONTENT_LENGTH, CONTENT_TYPE};
use regex::Regex;
use serde_json::{json, Value};
use std::sync::LazyLock;

/// Message used whenever the backend's own message cannot be shown.
pub const GENERIC_SERVER_MESSAGE: &str = "An unexpected server error occurred. Please try again later.";

/// Longest backend message passed through verbatim.
pub const MAX_MESSAGE_LEN: usize = 300;

static INTERNAL_MARKERS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?ix)
        traceback\s+\(most\s+recent\s+call\s+last\)
        | \bfile\s+"[^"]+",\s+line\s+\d+
        | \bat\s+[\w$.<>\[\]]+\s*\([^)]*:\d+(?::\d+)?\)
        | \bat\s+[\w$.]+\.java:\d+
        | panicked\s+at
        | stack\s+backtrace
        | exception\s+in\s+thread
        | \.(?:rs|py|js|ts|java|go|rb|php|cs):\d+
        | node_modules/
        | \bsqlstate\b
        "#,
    )
    .expect("internal marker pattern is valid")
});

/// Whether a message looks like it leaks server internals.
///
/// # Examples
///
/// ```
/// use resilient_client::client::contains_internal_markers;
///
/// assert!(contains_internal_markers("Traceback (most recent call last):\n  File \"app.py\", line 3"));
/// assert!(!contains_internal_markers("Export service is temporarily unavailable"));
/// ```
pub fn contains_internal_markers(message: &str) -> bool {
    INTERNAL_MARKERS.is_match(message)
}

/// The message to show for a 5xx body.
pub fn safe_message(body: &[u8]) -> String {
    let parsed: Option<Value> = serde_json::from_slice(body).ok();
    let candidate = parsed.as_ref().and_then(|value| {
        ["message", "detail"]
            .iter()
            .find_map(|field| value.get(*field).and_then(Value::as_str))
    });

    match candidate.map(str::trim) {
        Some(message)
            if !message.is_empty()
                && message.len() <= MAX_MESSAGE_LEN
                && !contains_internal_markers(message) =>
        {
            message.to_string()
        }
        _ => GENERIC_SERVER_MESSAGE.to_string(),
    }
}

/// Serialize the safe 5xx envelope.
pub fn server_error_body(message: &str) -> Bytes {
    let envelope = json!({
        "error": SERVER_ERROR_TITLE,
        "message": message,
        "code": SERVER_ERROR_CODE,
    });
    Bytes::from(envelope.to_string())
}

/// Replace the body of a 5xx response with the safe envelope.
///
/// Responses below 500 are returned untouched.
pub fn sanitize_response(mut response: ApiResponse) -> ApiResponse {
    if !response.status.is_server_error() {
        return response;
    }

    let message = safe_message(&response.body);
    if message == GENERIC_SERVER_MESSAGE {
        tracing::debug!(status = response.status.as_u16(), "replaced backend error message");
    }

    response.body = server_error_body(&message);
    response.headers.remove(CONTENT_LENGTH);
    response.headers.remove(CONTENT_ENCODING);
    response
        .headers
        .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    response.sanitized = true;
    response
}
