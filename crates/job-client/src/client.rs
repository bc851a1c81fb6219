use std::time::Duration;

use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use reqwest::{RequestBuilder, StatusCode};
use tokio::time::Instant;
use tracing::{debug, info};

use fms_protocol::constants::{HTTP_REQUEST_TIMEOUT, JOB_BASE_PATH};
use fms_protocol::{CreateJobRequest, CreateJobResponse, JobPatch, UploadJob};

use crate::JobClientError;

/// Default delay between visibility polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Default time to wait for a job to become visible.
pub const DEFAULT_POLL_TIMEOUT: Duration = Duration::from_secs(30);

const SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// Job-storage-service client.
#[derive(Clone)]
pub struct JobClient {
    http: reqwest::Client,
    base_url: String,
    poll_interval: Duration,
    poll_timeout: Duration,
}

impl JobClient {
    /// Creates a client rooted at the FMS host, e.g. `https://fms.example.org`.
    pub fn new(base_url: &str) -> Result<Self, JobClientError> {
        let root = base_url.trim_end_matches('/');
        reqwest::Url::parse(root)
            .map_err(|e| JobClientError::InvalidBaseUrl(format!("{root}: {e}")))?;

        let http = reqwest::Client::builder()
            .timeout(HTTP_REQUEST_TIMEOUT)
            .build()?;

        Ok(Self {
            http,
            base_url: format!("{root}/{JOB_BASE_PATH}"),
            poll_interval: DEFAULT_POLL_INTERVAL,
            poll_timeout: DEFAULT_POLL_TIMEOUT,
        })
    }

    /// Overrides the visibility polling interval and timeout.
    pub fn with_polling(mut self, interval: Duration, timeout: Duration) -> Self {
        self.poll_interval = interval;
        self.poll_timeout = timeout;
        self
    }

    fn job_url(&self, job_id: &str) -> String {
        format!(
            "{}/{}",
            self.base_url,
            utf8_percent_encode(job_id, SEGMENT)
        )
    }

    /// Creates a job record.
    pub async fn create_job(
        &self,
        request: &CreateJobRequest,
    ) -> Result<CreateJobResponse, JobClientError> {
        debug!(job_name = %request.job_name, status = %request.status, "creating job");
        let body = send(self.http.post(&self.base_url).json(request)).await?;
        Ok(serde_json::from_slice(&body)?)
    }

    /// Patches a job. With `append`, list fields are merged instead of replaced.
    pub async fn update_job(
        &self,
        job_id: &str,
        patch: &JobPatch,
        append: bool,
    ) -> Result<(), JobClientError> {
        debug!(job_id, append, status = ?patch.status, stage = ?patch.current_stage, "updating job");
        let req = self
            .http
            .patch(self.job_url(job_id))
            .query(&[("append", append)])
            .json(patch);
        send(req).await.map_err(|e| not_found(e, job_id))?;
        Ok(())
    }

    /// Fetches a job. A 404 maps to [`JobClientError::NotFound`].
    pub async fn get_job(&self, job_id: &str) -> Result<UploadJob, JobClientError> {
        let body = send(self.http.get(self.job_url(job_id)))
            .await
            .map_err(|e| not_found(e, job_id))?;
        Ok(serde_json::from_slice(&body)?)
    }

    /// Polls [`get_job`](Self::get_job) until the job is visible.
    ///
    /// Only "not found" is retried; any other error ends the wait.
    pub async fn wait_for_job_to_exist(&self, job_id: &str) -> Result<(), JobClientError> {
        let started = Instant::now();
        let mut attempts = 0u32;
        loop {
            attempts += 1;
            match self.get_job(job_id).await {
                Ok(_) => {
                    if attempts > 1 {
                        info!(job_id, attempts, "job became visible");
                    }
                    return Ok(());
                }
                Err(JobClientError::NotFound(_)) => {}
                Err(e) => return Err(e),
            }

            let waited = started.elapsed();
            if waited + self.poll_interval > self.poll_timeout {
                return Err(JobClientError::Timeout {
                    job_id: job_id.to_string(),
                    waited,
                });
            }
            debug!(job_id, attempts, "job not visible yet");
            tokio::time::sleep(self.poll_interval).await;
        }
    }
}

fn not_found(e: JobClientError, job_id: &str) -> JobClientError {
    match e {
        JobClientError::Api { status: 404, .. } => JobClientError::NotFound(job_id.to_string()),
        other => other,
    }
}

async fn send(req: RequestBuilder) -> Result<Vec<u8>, JobClientError> {
    let resp = req.send().await?;
    let status = resp.status();

    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        return Err(JobClientError::Api {
            status: status.as_u16(),
            body,
        });
    }
    if status == StatusCode::NO_CONTENT {
        return Ok(Vec::new());
    }

    Ok(resp.bytes().await?.to_vec())
}
