//! Upload coordinator: start, upload, cancel.
//!
//! Retry lives in `retry.rs`.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, error, info, warn};

use fms_protocol::constants::{
    STAGE_COPYING, STAGE_HASHING, STAGE_UPLOADING_CHUNKS, STAGE_WAITING_FOR_SERVER,
};
use fms_protocol::{
    FssRequestFile, JobPatch, JobStatus, RegisterUploadRequest, RegisterUploadResponse,
    ServiceFields, StartUploadRequest, UploadCompleteRequest, UploadRequest,
    UploadStatusResponse, path_key,
};
use fms_transfer::{
    CopyOptions, HashSink, JobLease, ProgressCallback, ProgressThrottle, WorkerRegistry,
    copy_and_hash,
    validate_file_name,
};

use crate::chunked::RemoteChunkSink;
use crate::error::UploadError;
use crate::options::{CoordinatorOptions, UploadMode};
use crate::services::{FileCatalog, JobTracker, StorageService};

/// Job and destination returned by [`UploadCoordinator::start_upload`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartedUpload {
    pub job_id: String,
    /// Server-allocated directory the file is copied into.
    pub upload_directory: PathBuf,
}

/// Result of a successful [`UploadCoordinator::upload_file`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadOutcome {
    pub job_id: String,
    /// Lowercase hex MD5 of the uploaded bytes.
    pub md5: String,
    pub bytes: u64,
    /// File ids reported by the storage service, if any.
    pub file_ids: Vec<String>,
}

/// Drives uploads against the storage, job and catalog services.
///
/// Holds no job state between calls. Every read of a job goes to the job
/// service, and every write is a patch.
pub struct UploadCoordinator {
    pub(crate) storage: Arc<dyn StorageService>,
    pub(crate) jobs: Arc<dyn JobTracker>,
    pub(crate) catalog: Arc<dyn FileCatalog>,
    workers: WorkerRegistry,
    options: CoordinatorOptions,
}

impl UploadCoordinator {
    pub fn new(
        storage: Arc<dyn StorageService>,
        jobs: Arc<dyn JobTracker>,
        catalog: Arc<dyn FileCatalog>,
        options: CoordinatorOptions,
    ) -> Self {
        Self {
            storage,
            jobs,
            catalog,
            workers: WorkerRegistry::new(),
            options,
        }
    }

    pub fn options(&self) -> &CoordinatorOptions {
        &self.options
    }

    /// Transfer workers currently running, keyed by job id.
    pub fn workers(&self) -> &WorkerRegistry {
        &self.workers
    }

    /// Validates `request`, registers it with the storage service and waits
    /// until the new job is visible in the job service.
    ///
    /// `extra` is merged into the job's service fields. The request itself
    /// is recorded under `files` unless `extra` already carries files.
    pub async fn start_upload(
        &self,
        file_path: &Path,
        request: &UploadRequest,
        extra: ServiceFields,
    ) -> Result<StartedUpload, UploadError> {
        validate_request(file_path, request).await?;

        let mut service_fields = extra;
        if service_fields.files.is_empty() {
            service_fields.files.push(request.clone());
        }
        let start = StartUploadRequest {
            job_name: request.file_name(),
            user: self.options.user.clone(),
            file_path: request.file.original_path.clone(),
            service_fields,
        };

        let resp = self.storage.start_upload(&start).await?;
        self.jobs.wait_for_job_to_exist(&resp.job_id).await?;

        info!(
            job_id = %resp.job_id,
            path = %file_path.display(),
            upload_directory = %resp.upload_directory,
            "upload started"
        );
        Ok(StartedUpload {
            job_id: resp.job_id,
            upload_directory: PathBuf::from(resp.upload_directory),
        })
    }

    /// Moves the bytes of `file_path` to the server and hands the file over.
    ///
    /// The job stays registered with the worker registry for the whole call,
    /// so [`cancel_upload`](Self::cancel_upload) stops it at the next step.
    /// A job already cancelled is not started. On failure the job is
    /// patched to FAILED with the error message before the error is
    /// returned.
    pub async fn upload_file(
        &self,
        job_id: &str,
        file_path: &Path,
        request: &UploadRequest,
        upload_directory: &Path,
        on_progress: Option<ProgressCallback>,
    ) -> Result<UploadOutcome, UploadError> {
        let lease = self.workers.lease(job_id);
        let result = self
            .run_upload(&lease, file_path, request, upload_directory, on_progress)
            .await;

        match result {
            Ok(outcome) => {
                info!(
                    job_id,
                    bytes = outcome.bytes,
                    md5 = %outcome.md5,
                    "upload handed to server"
                );
                Ok(outcome)
            }
            Err(UploadError::Cancelled) => {
                info!(job_id, "upload stopped by cancel");
                if let Err(e) = self.jobs.update_job(job_id, &cancel_patch(), true).await {
                    warn!(job_id, error = %e, "failed to record cancellation");
                }
                Err(UploadError::Cancelled)
            }
            Err(e) => {
                error!(job_id, error = %e, "upload failed");
                self.record_failure(job_id, JobStatus::Failed, &e).await;
                Err(e)
            }
        }
    }

    async fn run_upload(
        &self,
        lease: &JobLease,
        file_path: &Path,
        request: &UploadRequest,
        upload_directory: &Path,
        on_progress: Option<ProgressCallback>,
    ) -> Result<UploadOutcome, UploadError> {
        let job_id = lease.job_id();
        let job = self.jobs.get_job(job_id).await?;
        if job.status == JobStatus::Failed && job.service_fields.cancelled == Some(true) {
            debug!(job_id, "job was cancelled before upload started");
            return Err(UploadError::Cancelled);
        }
        validate_request(file_path, request).await?;
        lease.check()?;

        match self.options.mode {
            UploadMode::Copy => {
                self.copy_upload(lease, file_path, request, upload_directory, on_progress)
                    .await
            }
            UploadMode::Chunked => {
                self.chunked_upload(lease, file_path, request, on_progress)
                    .await
            }
        }
    }

    /// `start_upload` followed by `upload_file` for the request's own path.
    pub async fn upload(
        &self,
        request: &UploadRequest,
        on_progress: Option<ProgressCallback>,
    ) -> Result<UploadOutcome, UploadError> {
        let path = PathBuf::from(&request.file.original_path);
        let started = self
            .start_upload(&path, request, ServiceFields::default())
            .await?;
        self.upload_file(
            &started.job_id,
            &path,
            request,
            &started.upload_directory,
            on_progress,
        )
        .await
    }

    /// Marks the job FAILED with `cancelled = true` and stops its local transfer.
    ///
    /// Returns whether a local transfer was running. A transfer stopped
    /// after registering a chunked upload forwards the cancel to the server. Once the file has been
    /// handed to the server, cancellation is only forwarded best-effort.
    pub async fn cancel_upload(&self, job_id: &str) -> Result<bool, UploadError> {
        let stopped = self.workers.cancel(job_id);
        self.jobs.update_job(job_id, &cancel_patch(), true).await?;
        info!(job_id, worker_stopped = stopped, "upload cancelled");

        match self.jobs.get_job(job_id).await {
            Ok(job) => {
                if let Some(upload_id) = job.service_fields.fss_upload_id {
                    if let Err(e) = self.storage.cancel_upload(&upload_id).await {
                        warn!(job_id, upload_id = %upload_id, error = %e, "server-side cancel failed");
                    }
                }
            }
            Err(e) => warn!(job_id, error = %e, "could not read job after cancel"),
        }
        Ok(stopped)
    }

    /// Server-side state of a chunked upload, or `None` for copy uploads.
    pub async fn upload_status(
        &self,
        job_id: &str,
    ) -> Result<Option<UploadStatusResponse>, UploadError> {
        let job = self.jobs.get_job(job_id).await?;
        match job.service_fields.fss_upload_id {
            Some(upload_id) => Ok(Some(self.storage.get_status(&upload_id).await?)),
            None => Ok(None),
        }
    }

    async fn copy_upload(
        &self,
        lease: &JobLease,
        file_path: &Path,
        request: &UploadRequest,
        upload_directory: &Path,
        on_progress: Option<ProgressCallback>,
    ) -> Result<UploadOutcome, UploadError> {
        let job_id = lease.job_id();
        self.patch(
            job_id,
            JobPatch::status(JobStatus::Working).with_stage(STAGE_COPYING),
        )
        .await?;
        let modified = modified_time(file_path).await?;

        let file_name = request.file_name();
        let options = CopyOptions {
            chunk_size: self.options.chunk_size,
            progress_interval: Some(self.options.progress_interval),
        };
        let copy = copy_and_hash(
            &self.workers,
            job_id,
            file_path,
            upload_directory,
            &file_name,
            options,
            on_progress,
        )
        .await?;
        lease.check()?;
        self.record_hash(job_id, request, &copy.md5, modified)
            .await?;

        let complete = UploadCompleteRequest {
            job_id: job_id.to_string(),
            files: vec![FssRequestFile {
                file_name,
                md5hex: copy.md5.clone(),
                file_type: request.file.file_type.clone(),
                metadata: request.clone(),
                should_be_in_archive: self.options.should_be_in_archive,
                should_be_in_local: self.options.should_be_in_local,
            }],
        };
        lease.check()?;
        let metadata = self.storage.upload_complete(&complete).await?;
        self.patch(job_id, JobPatch::stage(STAGE_WAITING_FOR_SERVER))
            .await?;

        Ok(UploadOutcome {
            job_id: job_id.to_string(),
            md5: copy.md5,
            bytes: copy.bytes_copied,
            file_ids: metadata.into_iter().map(|m| m.file_id).collect(),
        })
    }

    async fn chunked_upload(
        &self,
        lease: &JobLease,
        file_path: &Path,
        request: &UploadRequest,
        on_progress: Option<ProgressCallback>,
    ) -> Result<UploadOutcome, UploadError> {
        let job_id = lease.job_id();
        self.patch(
            job_id,
            JobPatch::status(JobStatus::Working).with_stage(STAGE_HASHING),
        )
        .await?;
        let modified = modified_time(file_path).await?;

        let (hasher, hashed) = self
            .workers
            .read(job_id, file_path.to_path_buf(), self.options.chunk_size, HashSink::new())
            .wait()
            .await?;
        let md5 = hasher.finalize_hex();
        lease.check()?;
        self.record_hash(job_id, request, &md5, modified).await?;

        lease.check()?;
        let registered = self
            .storage
            .register_upload(&RegisterUploadRequest {
                file_name: request.file_name(),
                file_size: hashed.bytes,
                md5: md5.clone(),
            })
            .await?;
        let upload_id = registered.upload_id.clone();

        let result = self
            .send_chunks(lease, file_path, registered, hashed.bytes, on_progress)
            .await;
        if matches!(result, Err(UploadError::Cancelled)) {
            if let Err(e) = self.storage.cancel_upload(&upload_id).await {
                warn!(job_id, upload_id = %upload_id, error = %e, "server-side cancel failed");
            }
        }
        let (bytes, file_ids) = result?;

        Ok(UploadOutcome {
            job_id: job_id.to_string(),
            md5,
            bytes,
            file_ids,
        })
    }

    /// Streams the file to a registered FSS upload and finalizes it.
    async fn send_chunks(
        &self,
        lease: &JobLease,
        file_path: &Path,
        registered: RegisterUploadResponse,
        expected_bytes: u64,
        on_progress: Option<ProgressCallback>,
    ) -> Result<(u64, Vec<String>), UploadError> {
        let job_id = lease.job_id();
        let upload_id = registered.upload_id;
        lease.check()?;
        let fields = ServiceFields {
            fss_upload_id: Some(upload_id.clone()),
            ..ServiceFields::default()
        };
        self.patch(job_id, JobPatch::fields(fields).with_stage(STAGE_UPLOADING_CHUNKS))
            .await?;

        let chunk_size = usize::try_from(registered.chunk_size)
            .ok()
            .filter(|&n| n > 0)
            .unwrap_or(self.options.chunk_size);
        debug!(job_id, upload_id = %upload_id, chunk_size, "streaming chunks");

        let progress = ProgressThrottle::new(
            on_progress,
            file_path.to_string_lossy(),
            expected_bytes,
            Some(self.options.progress_interval),
        );
        let sink = RemoteChunkSink::new(Arc::clone(&self.storage), upload_id.clone(), progress);
        let (sink, _) = self
            .workers
            .read(job_id, file_path.to_path_buf(), chunk_size, sink)
            .wait()
            .await?;
        let bytes = sink.finish();
        if bytes != expected_bytes {
            return Err(std::io::Error::other(format!(
                "file changed during upload: hashed {expected_bytes} bytes, sent {bytes}"
            ))
            .into());
        }

        lease.check()?;
        let finalized = self.storage.finalize(&upload_id).await?;
        self.patch(job_id, JobPatch::stage(STAGE_WAITING_FOR_SERVER))
            .await?;
        Ok((bytes, finalized.file_id.into_iter().collect()))
    }

    /// Records the digest and mtime that let a retry skip unchanged content.
    async fn record_hash(
        &self,
        job_id: &str,
        request: &UploadRequest,
        md5: &str,
        modified: DateTime<Utc>,
    ) -> Result<(), UploadError> {
        let key = path_key(&request.file.original_path);
        let fields = ServiceFields {
            md5: HashMap::from([(key.clone(), md5.to_string())]),
            last_modified: HashMap::from([(key, modified)]),
            ..ServiceFields::default()
        };
        self.patch(job_id, JobPatch::fields(fields)).await
    }

    pub(crate) async fn patch(&self, job_id: &str, patch: JobPatch) -> Result<(), UploadError> {
        self.jobs.update_job(job_id, &patch, true).await?;
        Ok(())
    }

    /// Persists `error` on the job. A failure to do so is only logged.
    pub(crate) async fn record_failure(&self, job_id: &str, status: JobStatus, error: &UploadError) {
        let patch = JobPatch::failure(status, error.to_string());
        if let Err(e) = self.jobs.update_job(job_id, &patch, true).await {
            warn!(job_id, status = %status, error = %e, "failed to record job failure");
        }
    }
}

fn cancel_patch() -> JobPatch {
    JobPatch {
        status: Some(JobStatus::Failed),
        current_stage: None,
        service_fields: Some(ServiceFields {
            cancelled: Some(true),
            error: Some("cancelled by user".into()),
            ..ServiceFields::default()
        }),
    }
}

async fn validate_request(file_path: &Path, request: &UploadRequest) -> Result<(), UploadError> {
    let file = &request.file;
    if file.file_type.trim().is_empty() {
        return Err(UploadError::Validation("missing file type".into()));
    }
    if file.original_path.is_empty() {
        return Err(UploadError::Validation("missing original path".into()));
    }
    if Path::new(&file.original_path) != file_path {
        return Err(UploadError::Validation(format!(
            "original path {} does not match {}",
            file.original_path,
            file_path.display()
        )));
    }
    validate_file_name(&request.file_name()).map_err(|e| UploadError::Validation(e.to_string()))?;

    match tokio::fs::metadata(file_path).await {
        Ok(meta) if meta.is_file() => Ok(()),
        Ok(_) => Err(UploadError::Validation(format!(
            "not a regular file: {}",
            file_path.display()
        ))),
        Err(e) => Err(UploadError::Validation(format!(
            "cannot read {}: {e}",
            file_path.display()
        ))),
    }
}

pub(crate) async fn modified_time(path: &Path) -> Result<DateTime<Utc>, UploadError> {
    let modified = tokio::fs::metadata(path).await?.modified()?;
    Ok(DateTime::<Utc>::from(modified))
}
