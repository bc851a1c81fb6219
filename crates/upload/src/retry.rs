//! Retry of failed jobs.
//!
//! A failed job is never reused. Each of its files is replayed as a new job
//! linked to it through `originalJobId`/`replacementJobIds` and a shared
//! `groupId`.

use std::path::{Path, PathBuf};

use futures_util::future::join_all;
use tracing::{debug, info, warn};

use fms_protocol::constants::STAGE_REPLACED;
use fms_protocol::{JobPatch, JobStatus, ServiceFields, UploadJob, UploadRequest, path_key};
use fms_transfer::ProgressCallback;

use crate::coordinator::{UploadCoordinator, UploadOutcome, modified_time};
use crate::error::{FileFailure, UploadError};

impl UploadCoordinator {
    /// Replays every file of a failed job as a new job.
    ///
    /// Only FAILED and WAITING jobs are retried; any other status is rejected
    /// without touching the job. All files are attempted even if some fail,
    /// and any failure makes the whole call fail with
    /// [`UploadError::RetryFailed`]. Files that did succeed stay uploaded.
    pub async fn retry_upload(
        &self,
        job_id: &str,
        on_progress: Option<ProgressCallback>,
    ) -> Result<Vec<UploadOutcome>, UploadError> {
        let job = self.jobs.get_job(job_id).await?;
        if !job.status.is_retry_eligible() {
            return Err(UploadError::NotRetryable {
                job_id: job_id.to_string(),
                status: job.status,
            });
        }

        if job.service_fields.files.is_empty() {
            let err = UploadError::Unrecoverable(format!("job {job_id} has no files to retry"));
            self.record_failure(job_id, JobStatus::Unrecoverable, &err)
                .await;
            return Err(err);
        }

        let group_id = job
            .service_fields
            .group_id
            .clone()
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        info!(job_id, group_id = %group_id, files = job.service_fields.files.len(), "retrying job");

        let attempts = job.service_fields.files.iter().map(|request| {
            let on_progress = on_progress.clone();
            let group_id = group_id.as_str();
            let job = &job;
            async move {
                let result = self.retry_file(job, request, group_id, on_progress).await;
                (request, result)
            }
        });
        let results = join_all(attempts).await;

        let mut outcomes = Vec::new();
        let mut failures = Vec::new();
        for (request, result) in results {
            match result {
                Ok(outcome) => outcomes.push(outcome),
                Err((new_job_id, error)) => failures.push(FileFailure {
                    path: request.file.original_path.clone(),
                    new_job_id,
                    error,
                }),
            }
        }

        if failures.is_empty() {
            info!(job_id, replaced_by = outcomes.len(), "retry complete");
            Ok(outcomes)
        } else {
            warn!(
                job_id,
                failed = failures.len(),
                succeeded = outcomes.len(),
                "retry failed"
            );
            Err(UploadError::RetryFailed {
                job_id: job_id.to_string(),
                failures,
            })
        }
    }

    /// Retries one file. On error, returns the replacement job id if one had
    /// already been created.
    async fn retry_file(
        &self,
        job: &UploadJob,
        request: &UploadRequest,
        group_id: &str,
        on_progress: Option<ProgressCallback>,
    ) -> Result<UploadOutcome, (Option<String>, UploadError)> {
        self.check_duplicate(job, request)
            .await
            .map_err(|e| (None, e))?;

        let path = PathBuf::from(&request.file.original_path);
        let extra = ServiceFields {
            group_id: Some(group_id.to_string()),
            original_job_id: Some(job.job_id.clone()),
            ..ServiceFields::default()
        };
        let started = self
            .start_upload(&path, request, extra)
            .await
            .map_err(|e| (None, e))?;
        let new_job_id = started.job_id.clone();

        let result: Result<UploadOutcome, UploadError> = async {
            let replaced = ServiceFields {
                replacement_job_ids: vec![new_job_id.clone()],
                error: Some(format!("replaced by job {new_job_id}")),
                ..ServiceFields::default()
            };
            self.patch(
                &job.job_id,
                JobPatch::fields(replaced).with_stage(STAGE_REPLACED),
            )
            .await?;
            debug!(job_id = %job.job_id, new_job_id = %new_job_id, "replacement recorded");

            self.upload_file(
                &new_job_id,
                &path,
                request,
                &started.upload_directory,
                on_progress,
            )
            .await
        }
        .await;

        match result {
            Ok(outcome) => Ok(outcome),
            Err(UploadError::Cancelled) => Err((Some(new_job_id), UploadError::Cancelled)),
            Err(e) => {
                self.record_failure(&new_job_id, failure_status(&e), &e)
                    .await;
                Err((Some(new_job_id), e))
            }
        }
    }

    /// Fails with [`UploadError::AlreadyUploaded`] if the file is unchanged
    /// since its hash was recorded and the catalog already holds that content.
    async fn check_duplicate(
        &self,
        job: &UploadJob,
        request: &UploadRequest,
    ) -> Result<(), UploadError> {
        let key = path_key(&request.file.original_path);
        let fields = &job.service_fields;
        let (Some(md5), Some(recorded)) = (fields.md5.get(&key), fields.last_modified.get(&key))
        else {
            return Ok(());
        };

        // A missing file is reported by start_upload.
        let Ok(current) = modified_time(Path::new(&request.file.original_path)).await else {
            return Ok(());
        };
        if current.timestamp_millis() != recorded.timestamp_millis() {
            debug!(path = %request.file.original_path, "file modified since last attempt");
            return Ok(());
        }

        let file_name = request.file_name();
        if self
            .catalog
            .file_exists_by_md5_and_name(md5, &file_name)
            .await?
        {
            info!(path = %request.file.original_path, md5 = %md5, "content already uploaded");
            return Err(UploadError::AlreadyUploaded {
                file_name,
                md5: md5.clone(),
            });
        }
        Ok(())
    }
}

/// Status a replacement job is left in after `error`.
fn failure_status(error: &UploadError) -> JobStatus {
    if error.is_structural() {
        JobStatus::Unrecoverable
    } else {
        JobStatus::Failed
    }
}
