//! Core request, response and job types.
//!
//! - [`ApiRequest`] / [`RequestOptions`] describe one logical call
//! - [`ApiResponse`] is what every call returns, successful or not
//! - [`JobUpdate`] / [`JobStatus`] are the records streamed by the backend

mod job;
mod request;
mod response;

pub use job::{JobStatus, JobUpdate};
pub use request::{ApiRequest, RequestOptions};
pub use response::ApiResponse;
