//! Request and response bodies of the file-storage-service upload API.

use serde::{Deserialize, Serialize};

use crate::job::ServiceFields;
use crate::types::UploadRequest;

/// Body of `POST /` (start upload).
///
/// The server creates the tracking job and allocates an upload directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartUploadRequest {
    pub job_name: String,
    pub user: String,
    pub file_path: String,
    pub service_fields: ServiceFields,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartUploadResponse {
    pub job_id: String,
    pub upload_directory: String,
}

/// Per-file payload sent with `uploadComplete`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FssRequestFile {
    pub file_name: String,
    pub md5hex: String,
    pub file_type: String,
    pub metadata: UploadRequest,
    pub should_be_in_archive: bool,
    pub should_be_in_local: bool,
}

/// Body of `POST /uploadComplete`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadCompleteRequest {
    pub job_id: String,
    pub files: Vec<FssRequestFile>,
}

/// One entry of the `uploadComplete` response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadMetadataResponse {
    pub file_id: String,
    #[serde(default)]
    pub file_name: String,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Body of `POST /registerUpload`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterUploadRequest {
    pub file_name: String,
    pub file_size: u64,
    pub md5: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterUploadResponse {
    pub upload_id: String,
    pub chunk_size: u64,
}

/// Response of `POST /uploadChunk/{uploadId}/{chunkNumber}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadChunkResponse {
    pub chunk_number: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_id: Option<String>,
    pub upload_id: String,
    #[serde(default)]
    pub error_count: u32,
}

/// Response of `PATCH /finalize/{uploadId}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadFinalizeResponse {
    pub upload_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_id: Option<String>,
}

/// Server-side state of a chunked upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RemoteUploadStatus {
    Working,
    Retry,
    Complete,
    Inactive,
    Canceled,
    Failed,
}

/// Server-side state of a single chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChunkStatus {
    Pending,
    Complete,
    Failed,
}

/// Response of `GET /{uploadId}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadStatusResponse {
    pub upload_status: RemoteUploadStatus,
    #[serde(default)]
    pub chunk_statuses: Vec<ChunkStatus>,
}

impl UploadStatusResponse {
    /// Number of chunks the server has acknowledged.
    pub fn completed_chunks(&self) -> usize {
        self.chunk_statuses
            .iter()
            .filter(|s| **s == ChunkStatus::Complete)
            .count()
    }
}
