//! Job records kept by the job tracking service.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::types::UploadRequest;

/// Lifecycle state of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Waiting,
    Working,
    Retrying,
    Blocked,
    Succeeded,
    Failed,
    Unrecoverable,
}

impl JobStatus {
    /// Returns `true` if a job in this state may be replaced by a retry.
    pub fn is_retry_eligible(self) -> bool {
        matches!(self, JobStatus::Failed | JobStatus::Waiting)
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            JobStatus::Waiting => "WAITING",
            JobStatus::Working => "WORKING",
            JobStatus::Retrying => "RETRYING",
            JobStatus::Blocked => "BLOCKED",
            JobStatus::Succeeded => "SUCCEEDED",
            JobStatus::Failed => "FAILED",
            JobStatus::Unrecoverable => "UNRECOVERABLE",
        };
        f.write_str(s)
    }
}

/// Upload-specific state stored on a job.
///
/// Known fields are typed; anything else a stored job carries is kept in
/// `extra` and written back untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceFields {
    /// Original upload requests, required to replay the job.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub files: Vec<UploadRequest>,
    /// Shared by a job and all of its replacements.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_id: Option<String>,
    /// Set on a replacement job, points at the job it replaced.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_job_id: Option<String>,
    /// Set on a replaced job, points at its replacements.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub replacement_job_ids: Vec<String>,
    /// Content hash per original file, keyed by [`path_key`].
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub md5: HashMap<String, String>,
    /// File modification time observed when `md5` was recorded, keyed by [`path_key`].
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub last_modified: HashMap<String, DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cancelled: Option<bool>,
    /// Upload id issued by `registerUpload` when the chunked protocol is used.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fss_upload_id: Option<String>,
    /// Fields this client does not interpret.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl ServiceFields {
    /// Returns `true` if the fragment would not change anything.
    pub fn is_empty(&self) -> bool {
        *self == ServiceFields::default()
    }

    /// Merges `patch` into `self`.
    ///
    /// Scalars overwrite, maps merge by key, lists concatenate without
    /// duplicates when `append` is set and are replaced otherwise.
    pub fn merge(&mut self, patch: &ServiceFields, append: bool) {
        if !patch.files.is_empty() {
            if append {
                for file in &patch.files {
                    if !self.files.contains(file) {
                        self.files.push(file.clone());
                    }
                }
            } else {
                self.files = patch.files.clone();
            }
        }
        if !patch.replacement_job_ids.is_empty() {
            if append {
                for id in &patch.replacement_job_ids {
                    if !self.replacement_job_ids.contains(id) {
                        self.replacement_job_ids.push(id.clone());
                    }
                }
            } else {
                self.replacement_job_ids = patch.replacement_job_ids.clone();
            }
        }
        if patch.group_id.is_some() {
            self.group_id.clone_from(&patch.group_id);
        }
        if patch.original_job_id.is_some() {
            self.original_job_id.clone_from(&patch.original_job_id);
        }
        if patch.error.is_some() {
            self.error.clone_from(&patch.error);
        }
        if patch.cancelled.is_some() {
            self.cancelled = patch.cancelled;
        }
        if patch.fss_upload_id.is_some() {
            self.fss_upload_id.clone_from(&patch.fss_upload_id);
        }
        self.md5
            .extend(patch.md5.iter().map(|(k, v)| (k.clone(), v.clone())));
        self.last_modified
            .extend(patch.last_modified.iter().map(|(k, v)| (k.clone(), *v)));
        for (k, v) in &patch.extra {
            self.extra.insert(k.clone(), v.clone());
        }
    }
}

/// A durable record of one file transfer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadJob {
    pub job_id: String,
    #[serde(default)]
    pub job_name: String,
    #[serde(default)]
    pub user: String,
    pub status: JobStatus,
    #[serde(default)]
    pub current_stage: String,
    #[serde(default)]
    pub service_fields: ServiceFields,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified: Option<DateTime<Utc>>,
}

impl UploadJob {
    /// Applies a patch the way the job service does.
    pub fn apply_patch(&mut self, patch: &JobPatch, append: bool) {
        if let Some(status) = patch.status {
            self.status = status;
        }
        if let Some(stage) = &patch.current_stage {
            self.current_stage.clone_from(stage);
        }
        if let Some(fields) = &patch.service_fields {
            self.service_fields.merge(fields, append);
        }
        self.modified = Some(Utc::now());
    }
}

/// Partial update of a job.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<JobStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_stage: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_fields: Option<ServiceFields>,
}

impl JobPatch {
    pub fn status(status: JobStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    pub fn stage(stage: impl Into<String>) -> Self {
        Self {
            current_stage: Some(stage.into()),
            ..Self::default()
        }
    }

    pub fn fields(fields: ServiceFields) -> Self {
        Self {
            service_fields: Some(fields),
            ..Self::default()
        }
    }

    /// A FAILED/UNRECOVERABLE transition carrying an error message.
    pub fn failure(status: JobStatus, error: impl Into<String>) -> Self {
        Self {
            status: Some(status),
            current_stage: None,
            service_fields: Some(ServiceFields {
                error: Some(error.into()),
                ..ServiceFields::default()
            }),
        }
    }

    pub fn with_stage(mut self, stage: impl Into<String>) -> Self {
        self.current_stage = Some(stage.into());
        self
    }
}

/// Body of `POST /job`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateJobRequest {
    pub job_name: String,
    pub user: String,
    pub service: String,
    pub status: JobStatus,
    #[serde(default)]
    pub current_stage: String,
    #[serde(default)]
    pub service_fields: ServiceFields,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateJobResponse {
    pub job_id: String,
}

/// Key used for the per-file `md5` and `lastModified` maps.
///
/// Lowercase hex SHA-256 of the original path string.
pub fn path_key(original_path: &str) -> String {
    hex::encode(Sha256::digest(original_path.as_bytes()))
}
