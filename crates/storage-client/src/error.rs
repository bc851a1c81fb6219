//! Storage and catalog client errors.

/// Errors from the file-storage-service and catalog clients.
#[derive(Debug, thiserror::Error)]
pub enum StorageClientError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error {status}: {body}")]
    Api { status: u16, body: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid base URL: {0}")]
    InvalidBaseUrl(String),
}

impl StorageClientError {
    /// HTTP status of an API error, if this is one.
    pub fn status(&self) -> Option<u16> {
        match self {
            StorageClientError::Api { status, .. } => Some(*status),
            _ => None,
        }
    }
}
