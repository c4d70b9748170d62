//! Header parsing and formatting.

use crate::error::Result;
use http::{HeaderValue, Method};

/// Whether a method can change server state and therefore needs a CSRF token.
///
/// GET, HEAD, OPTIONS and TRACE are safe; every other method, including
/// extension methods, is treated as mutating.
///
/// # Examples
///
/// ```
/// use http::Method;
/// use resilient_client::protocol::is_mutating_method;
///
/// assert!(is_mutating_method(&Method::POST));
/// assert!(!is_mutating_method(&Method::GET));
/// ```
pub fn is_mutating_method(method: &Method) -> bool {
    !matches!(
        *method,
        Method::GET | Method::HEAD | Method::OPTIONS | Method::TRACE
    )
}

/// Build an `Authorization` header value for a bearer token.
///
/// The value is marked sensitive so it is redacted from `Debug` output.
pub fn bearer_value(token: &str) -> Result<HeaderValue> {
    let mut value = HeaderValue::from_str(&format!("Bearer {}", token))?;
    value.set_sensitive(true);
    Ok(value)
}

/// Find a cookie by exact name in a `Cookie` header value (`a=1; b=2`).
///
/// Returns `None` when the cookie is absent or empty.
///
/// # Examples
///
/// ```
/// use resilient_client::protocol::cookie_value;
///
/// assert_eq!(cookie_value("session=x; csrf_token=abc", "csrf_token"), Some("abc".to_string()));
/// assert_eq!(cookie_value("xcsrf_token=abc", "csrf_token"), None);
/// ```
pub fn cookie_value(header: &str, name: &str) -> Option<String> {
    header
        .split(';')
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value.trim().trim_matches('"').to_string())
        .filter(|value| !value.is_empty())
}
