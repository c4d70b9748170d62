//! Wire-level constants and header helpers.
//!
//! Everything the client and the backend have to agree on lives here: header
//! names, well-known endpoint paths, the server-sent event name, and the shape
//! of the synthesized 5xx envelope.
//!
//! # Contract
//!
//! | Item | Value |
//! |------|-------|
//! | Auth header | `Authorization: Bearer <token>` |
//! | CSRF header | `X-CSRF-Token: <token>` (mutating methods only) |
//! | CSRF bootstrap | `GET {API_BASE}/csrf` → `{"csrf_token": "..."}` |
//! | Update stream | `GET {API_BASE}/jobs/stream`, event `job_update` |
//! | 5xx envelope | `{"error", "message", "code": "SERVER_ERROR"}` |

mod headers;

pub use headers::{bearer_value, cookie_value, is_mutating_method};

/// Protocol constants.
pub mod constants {
    /// Header names used by the client.
    pub mod headers {
        use http::HeaderName;

        /// CSRF token header attached to mutating requests.
        pub const X_CSRF_TOKEN: HeaderName = HeaderName::from_static("x-csrf-token");

        /// Resume header sent when reconnecting the update stream.
        pub const LAST_EVENT_ID: HeaderName = HeaderName::from_static("last-event-id");
    }

    /// Endpoint paths relative to the API base.
    pub mod endpoints {
        /// CSRF bootstrap endpoint.
        pub const CSRF: &str = "csrf";

        /// Job update stream endpoint.
        pub const JOB_STREAM: &str = "jobs/stream";
    }

    /// Server-sent event name carrying job update batches.
    pub const JOB_UPDATE_EVENT: &str = "job_update";

    /// JSON field carrying the CSRF token in the bootstrap response.
    pub const CSRF_TOKEN_FIELD: &str = "csrf_token";

    /// JSON field identifying the owning tenant of a record.
    pub const TENANT_FIELD: &str = "tenant_id";

    /// Media type of server-sent event streams.
    pub const EVENT_STREAM_MEDIA_TYPE: &str = "text/event-stream";

    /// `error` field of the synthesized 5xx envelope.
    pub const SERVER_ERROR_TITLE: &str = "Internal Server Error";

    /// `code` field of the synthesized 5xx envelope.
    pub const SERVER_ERROR_CODE: &str = "SERVER_ERROR";
}
