//! Upload error taxonomy.

use fms_job_client::JobClientError;
use fms_protocol::JobStatus;
use fms_storage_client::{CatalogError, StorageClientError};
use fms_transfer::TransferError;

/// Errors produced by the upload coordinator.
#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    /// The request itself is wrong. Never retried.
    #[error("invalid upload request: {0}")]
    Validation(String),

    #[error("transfer error: {0}")]
    Transfer(#[source] TransferError),

    #[error("storage service error: {0}")]
    Storage(#[from] StorageClientError),

    #[error("job service error: {0}")]
    Job(#[from] JobClientError),

    #[error("catalog error: {0}")]
    Catalog(#[from] CatalogError),

    #[error("chunk {chunk_number} rejected by server ({error_count} errors)")]
    ChunkRejected { chunk_number: u64, error_count: u32 },

    /// Required job data is missing; the job cannot be replayed.
    #[error("unrecoverable: {0}")]
    Unrecoverable(String),

    /// The exact content is already stored server-side.
    #[error("{file_name} already uploaded (md5 {md5})")]
    AlreadyUploaded { file_name: String, md5: String },

    #[error("job {job_id} is {status} and cannot be retried")]
    NotRetryable { job_id: String, status: JobStatus },

    #[error("upload cancelled")]
    Cancelled,

    #[error("retry of job {job_id} failed for {} file(s)", .failures.len())]
    RetryFailed {
        job_id: String,
        failures: Vec<FileFailure>,
    },
}

/// One failed file of a retry.
#[derive(Debug)]
pub struct FileFailure {
    /// Original path of the file.
    pub path: String,
    /// Replacement job, if one was created before the failure.
    pub new_job_id: Option<String>,
    pub error: UploadError,
}

impl From<TransferError> for UploadError {
    fn from(e: TransferError) -> Self {
        match e {
            TransferError::Cancelled => UploadError::Cancelled,
            other => UploadError::Transfer(other),
        }
    }
}

impl From<std::io::Error> for UploadError {
    fn from(e: std::io::Error) -> Self {
        UploadError::Transfer(TransferError::Io(e))
    }
}

impl UploadError {
    /// Returns `true` if the job this error is recorded on should become
    /// UNRECOVERABLE rather than FAILED.
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            UploadError::Validation(_)
                | UploadError::Unrecoverable(_)
                | UploadError::Transfer(TransferError::InvalidPath(_))
        )
    }

    /// Returns `true` if a later `retry_upload` may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            UploadError::Validation(_)
            | UploadError::Unrecoverable(_)
            | UploadError::AlreadyUploaded { .. }
            | UploadError::NotRetryable { .. } => false,
            UploadError::Transfer(TransferError::InvalidPath(_)) => false,
            UploadError::RetryFailed { failures, .. } => {
                failures.iter().any(|f| f.error.is_retryable())
            }
            _ => true,
        }
    }
}
