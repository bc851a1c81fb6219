//! Wire types shared by the FMS upload clients and the upload coordinator.
//!
//! All JSON bodies use camelCase field names. Job records tolerate unknown
//! service fields so older stored jobs survive a round trip.

pub mod constants;
pub mod job;
pub mod storage;
pub mod types;

// Re-export primary types for convenience.
pub use job::{CreateJobRequest, CreateJobResponse, JobPatch, JobStatus, ServiceFields, UploadJob, path_key};
pub use storage::{
    ChunkStatus, FssRequestFile, RegisterUploadRequest, RegisterUploadResponse, RemoteUploadStatus,
    StartUploadRequest, StartUploadResponse, UploadChunkResponse, UploadCompleteRequest,
    UploadFinalizeResponse, UploadMetadataResponse, UploadStatusResponse,
};
pub use types::{Annotation, CustomMetadata, FileDescriptor, UploadProgress, UploadRequest};
