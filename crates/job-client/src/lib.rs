//! Client for the FMS job-storage-service (`jss/1.0/job`).
//!
//! Job records are JSON documents keyed by an opaque id. Updates go through
//! the service's patch endpoint; the `append` flag selects whether list
//! fields are merged or replaced.

mod client;

#[cfg(test)]
pub(crate) mod mock_http;

pub use client::{DEFAULT_POLL_INTERVAL, DEFAULT_POLL_TIMEOUT, JobClient};

use std::time::Duration;

/// Errors from the job client.
#[derive(Debug, thiserror::Error)]
pub enum JobClientError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error {status}: {body}")]
    Api { status: u16, body: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("job not found: {0}")]
    NotFound(String),

    #[error("job {job_id} not visible after {waited:?}")]
    Timeout { job_id: String, waited: Duration },

    #[error("invalid base URL: {0}")]
    InvalidBaseUrl(String),
}
