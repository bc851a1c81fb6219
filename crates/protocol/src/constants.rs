use std::time::Duration;

/// Base path of the file-storage-service upload API.
pub const UPLOAD_BASE_PATH: &str = "file-storage-service/2.0/upload";

/// Base path of the job-storage-service job API.
pub const JOB_BASE_PATH: &str = "jss/1.0/job";

/// Base path of the metadata catalog query API.
pub const CATALOG_BASE_PATH: &str = "metadata-management-service/1.0/filemetadata";

/// Default chunk size for local reads and chunked uploads: 4 MiB.
pub const DEFAULT_CHUNK_SIZE: usize = 4 * 1024 * 1024;

/// Timeout for single request/response calls against the FMS services.
pub const HTTP_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Timeout for a single chunk upload.
///
/// Chunks carry up to `chunk_size` bytes and the server hashes each one
/// before answering.
pub const HTTP_CHUNK_TIMEOUT: Duration = Duration::from_secs(300);

// ---------------------------------------------------------------------------
// Job stages (free-form `currentStage` markers)
// ---------------------------------------------------------------------------

/// Stage while the file is being hashed ahead of a chunked upload.
pub const STAGE_HASHING: &str = "hashing";

/// Stage while bytes are copied into the server upload directory.
pub const STAGE_COPYING: &str = "copying";

/// Stage while chunks are streamed to the storage service.
pub const STAGE_UPLOADING_CHUNKS: &str = "uploading chunks";

/// Stage after the client handed the file to the server.
pub const STAGE_WAITING_FOR_SERVER: &str = "waiting for server-side processing";

/// Stage of a failed job that has been superseded by a replacement job.
pub const STAGE_REPLACED: &str = "replaced by retry";
