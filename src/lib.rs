#![warn(missing_docs)]

//! # Resilient Client: the network boundary of a multi-tenant web app
//!
//! This crate wraps every outbound API call and the long-lived job update
//! stream so that page code does not have to care about expired tokens,
//! flaky backends, rate limits or leaked data from other tenants.
//!
//! ## Overview
//!
//! Two cooperating clients share one transport, one cookie jar and two
//! session-wide stores:
//!
//! 1. **[`ResilientClient`]** - request/response calls with policy applied
//! 2. **[`UpdateStream`]** - a server-sent events connection that heals itself
//!
//! ## Request Policy
//!
//! - **Hard timeout**: 30 s per call, covering CSRF bootstrap and 401 replay
//! - **CSRF**: `X-CSRF-Token` on every mutating method, from cookie or bootstrap
//! - **401**: one token refresh, one replay
//! - **429**: de-duplicated rate-limit toast, response passed through
//! - **503**: exponential backoff (1 s, 2 s, ...) in `send_with_retry`
//! - **403**: "access restricted" toast in `send_with_retry`
//! - **5xx**: body replaced with `{"error", "message", "code": "SERVER_ERROR"}`
//! - **2xx**: tenant-isolation scan; a foreign `tenant_id` is a [`SecurityError`]
//!
//! ## Usage
//!
//! ```ignore
//! use resilient_client::{AppContext, ClientConfig, Session, StaticSession};
//! use futures::StreamExt;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let session = Arc::new(StaticSession::new(Session::new("token").with_tenant("acme")));
//!     let context = AppContext::new(ClientConfig::new("https://app.example.com/api")?, session)?;
//!
//!     // Requests
//!     let response = context.client().post_json("jobs", &serde_json::json!({"job_type": "export"})).await?;
//!     println!("Status: {}", response.status);
//!
//!     // Job updates
//!     let mut batches = context.updates().subscribe();
//!     context.start_session().await;
//!     while let Some(batch) = batches.next().await {
//!         println!("{} updates, {} active", batch.len(), context.jobs().active_count());
//!     }
//!
//!     context.teardown();
//!     Ok(())
//! }
//! ```
//!
//! ## Module Structure
//!
//! - **[client]** - Request client, CSRF, tenant scan, sanitization, update stream
//! - **[context]** - Application root owning the shared stores
//! - **[error]** - Error types and result handling
//! - **[notify]** - Notification sink contract and toast store
//! - **[protocol]** - Header names, endpoints and wire constants
//! - **[session]** - Session provider contract
//! - **[store]** - Keyed job record store
//! - **[types]** - Request, response and job types

pub mod client;
pub mod context;
pub mod error;
pub mod notify;
pub mod protocol;
pub mod session;
pub mod store;
pub mod types;

pub use client::{ClientConfig, ResilientClient, StreamState, UpdateStream};
pub use context::AppContext;
pub use error::{ClientError, Result, SecurityError};
pub use notify::{NotificationSink, Severity, ToastStore};
pub use session::{Session, SessionProvider, StaticSession};
pub use store::JobStore;
pub use types::{ApiRequest, ApiResponse, JobStatus, JobUpdate, RequestOptions};

#[cfg(test)]
mod tests;
