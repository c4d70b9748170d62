//! Resilient HTTP client and job update stream.
//!
//! This module provides the network boundary every page depends on:
//!
//! - **Resilient requests**: hard timeout, CSRF injection, 401 refresh-and-retry,
//!   503 backoff, 5xx sanitization, tenant-isolation scan
//! - **Update stream**: one long-lived server-sent events connection that
//!   reconnects after a fixed delay and feeds the shared job store
//!
//! # Module Organization
//!
//! ```text
//! client/
//! ├── fetch        - ResilientClient: send, send_with_retry, get/post/put/delete
//! ├── csrf         - CSRF token resolution (cookie, then bootstrap call)
//! ├── tenant       - Tenant-isolation scan over JSON bodies
//! ├── sanitize     - 5xx body rewriting
//! ├── parser       - Incremental server-sent events parser
//! ├── subscription - UpdateStream state machine and batch fan-out
//! ├── config       - Client configuration
//! └── utils        - Backoff and status helpers
//! ```
//!
//! # Key Types
//!
//! | Type | Description |
//! |------|-------------|
//! | [`ResilientClient`] | Request client wrapping every outbound call |
//! | [`CsrfTokenSource`] | Resolves the CSRF token for mutating calls |
//! | [`TenantScan`] | Rejects responses carrying another tenant's records |
//! | [`UpdateStream`] | Self-healing job update stream |
//! | [`EventParser`] | Streaming `text/event-stream` parser |
//! | [`ClientConfig`] | Client configuration options |
//!
//! # Examples
//!
//! ## Configuring
//!
//! ```
//! use resilient_client::client::ClientConfig;
//!
//! let config = ClientConfig {
//!     max_attempts: 5,
//!     reconnect_delay_ms: 2_000,
//!     ..ClientConfig::new("https://app.example.com/api").unwrap()
//! };
//! assert_eq!(config.endpoint("csrf").unwrap().as_str(), "https://app.example.com/api/csrf");
//! ```
//!
//! ## Backoff
//!
//! ```
//! use resilient_client::client::exponential_backoff;
//! use std::time::Duration;
//!
//! assert_eq!(exponential_backoff(0, 1000), Duration::from_secs(1));
//! assert_eq!(exponential_backoff(1, 1000), Duration::from_secs(2));
//! ```

mod config;
mod csrf;
mod fetch;
mod parser;
mod sanitize;
mod subscription;
mod tenant;
mod utils;

pub use config::{ClientConfig, API_BASE_ENV};
pub use csrf::CsrfTokenSource;
pub use fetch::{build_http_client, ResilientClient};
pub use parser::{EventParser, SseEvent, DEFAULT_EVENT, MAX_LINE_LEN};
pub use sanitize::{
    contains_internal_markers, safe_message, sanitize_response, server_error_body,
    GENERIC_SERVER_MESSAGE, MAX_MESSAGE_LEN,
};
pub use subscription::{JobUpdateStream, StreamState, UpdateStream};
pub use tenant::{JsonNode, TenantScan};
pub use utils::*;
