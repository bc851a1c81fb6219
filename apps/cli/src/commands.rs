//! Subcommands.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing::info;

use fms_job_client::JobClient;
use fms_protocol::{Annotation, CustomMetadata, JobStatus, UploadProgress, UploadRequest};
use fms_storage_client::{CatalogClient, StorageClient};
use fms_upload::{ProgressCallback, UploadCoordinator, UploadError, UploadMode};

use crate::config::{self, CliConfig};

#[derive(Parser, Debug)]
#[command(name = "fms-upload")]
#[command(about = "Upload files to the FMS and manage upload jobs", long_about = None)]
pub struct Cli {
    #[command(flatten)]
    pub overrides: Overrides,

    #[command(subcommand)]
    pub command: Command,
}

/// Flags that take precedence over the configuration file.
#[derive(Args, Debug, Default)]
pub struct Overrides {
    /// Host serving the file-storage-service
    #[arg(long, global = true, env = "FMS_STORAGE_URL")]
    pub storage_url: Option<String>,
    /// Host serving the job-storage-service
    #[arg(long, global = true, env = "FMS_JOB_URL")]
    pub job_url: Option<String>,
    /// Host serving the metadata catalog
    #[arg(long, global = true, env = "FMS_CATALOG_URL")]
    pub catalog_url: Option<String>,
    /// User recorded on new jobs
    #[arg(long, global = true)]
    pub user: Option<String>,
    /// Upload mode: copy or chunked
    #[arg(long, global = true)]
    pub mode: Option<UploadMode>,
    /// Local read size in bytes
    #[arg(long, global = true)]
    pub chunk_size: Option<usize>,
}

impl Overrides {
    pub fn apply(self, config: &mut CliConfig) {
        if let Some(v) = self.storage_url {
            config.storage_url = v;
        }
        if let Some(v) = self.job_url {
            config.job_url = v;
        }
        if let Some(v) = self.catalog_url {
            config.catalog_url = v;
        }
        if let Some(v) = self.user {
            config.user = v;
        }
        if let Some(v) = self.mode {
            config.mode = v;
        }
        if let Some(v) = self.chunk_size {
            config.chunk_size = v;
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Upload a file
    Upload {
        path: PathBuf,
        /// FMS file type (e.g. image, csv)
        #[arg(short = 't', long = "type")]
        file_type: String,
        /// Store the file under this name instead of its basename
        #[arg(long)]
        name: Option<String>,
        /// Annotation as NAME=VALUE[,VALUE...]; repeatable
        #[arg(short, long = "annotation", value_parser = parse_annotation)]
        annotations: Vec<Annotation>,
        #[arg(long)]
        template_id: Option<i64>,
    },
    /// Replay a failed job as new jobs
    Retry { job_id: String },
    /// Cancel an upload
    Cancel { job_id: String },
    /// Show a job's status and, for chunked uploads, the server-side state
    Status { job_id: String },
    /// Print a job record as JSON
    Job { job_id: String },
    /// Show the configuration path and effective configuration
    Config {
        /// Write the effective configuration to the configuration file
        #[arg(long, default_value_t = false)]
        init: bool,
    },
}

/// Parses `NAME=VALUE[,VALUE...]`.
fn parse_annotation(s: &str) -> Result<Annotation, String> {
    let (name, values) = s
        .split_once('=')
        .ok_or_else(|| format!("expected NAME=VALUE, got {s:?}"))?;
    let name = name.trim();
    if name.is_empty() {
        return Err(format!("annotation name is empty in {s:?}"));
    }
    Ok(Annotation {
        name: name.to_string(),
        values: values
            .split(',')
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(String::from)
            .collect(),
    })
}

fn build_request(
    path: &Path,
    file_type: String,
    name: Option<String>,
    annotations: Vec<Annotation>,
    template_id: Option<i64>,
) -> UploadRequest {
    let mut request = UploadRequest::new(path.to_string_lossy(), file_type);
    if let Some(name) = name {
        request.file.file_name = name;
    }
    if !annotations.is_empty() || template_id.is_some() {
        request.custom_metadata = Some(CustomMetadata {
            annotations,
            template_id,
        });
    }
    request
}

struct Clients {
    storage: Arc<StorageClient>,
    jobs: Arc<JobClient>,
    catalog: Arc<CatalogClient>,
}

impl Clients {
    fn new(config: &CliConfig) -> Result<Self> {
        let storage = StorageClient::new(&config.storage_url).context("storage client")?;
        let jobs = JobClient::new(&config.job_url)
            .context("job client")?
            .with_polling(config.poll_interval(), config.poll_timeout());
        let catalog = CatalogClient::new(&config.catalog_url).context("catalog client")?;
        Ok(Self {
            storage: Arc::new(storage),
            jobs: Arc::new(jobs),
            catalog: Arc::new(catalog),
        })
    }

    fn coordinator(&self, config: &CliConfig) -> UploadCoordinator {
        UploadCoordinator::new(
            self.storage.clone(),
            self.jobs.clone(),
            self.catalog.clone(),
            config.coordinator_options(),
        )
    }
}

fn progress_logger() -> ProgressCallback {
    Arc::new(|p: UploadProgress| {
        info!(
            path = %p.source_path,
            bytes = p.bytes_copied,
            total = p.total_bytes,
            percent = format_args!("{:.1}", p.percentage()),
            "progress"
        );
    })
}

pub async fn run(command: Command, config: CliConfig) -> Result<()> {
    match command {
        Command::Upload {
            path,
            file_type,
            name,
            annotations,
            template_id,
        } => {
            let path = std::path::absolute(&path)
                .with_context(|| format!("resolving {}", path.display()))?;
            let request = build_request(&path, file_type, name, annotations, template_id);
            let clients = Clients::new(&config)?;
            let outcome = clients
                .coordinator(&config)
                .upload(&request, Some(progress_logger()))
                .await?;
            println!("job {} uploaded {} bytes (md5 {})", outcome.job_id, outcome.bytes, outcome.md5);
        }
        Command::Retry { job_id } => {
            let clients = Clients::new(&config)?;
            match clients
                .coordinator(&config)
                .retry_upload(&job_id, Some(progress_logger()))
                .await
            {
                Ok(outcomes) => {
                    for outcome in outcomes {
                        println!("replaced by job {} (md5 {})", outcome.job_id, outcome.md5);
                    }
                }
                Err(UploadError::RetryFailed { job_id, failures }) => {
                    for failure in &failures {
                        let new_job = failure.new_job_id.as_deref().unwrap_or("-");
                        println!("{}: {} (new job {new_job})", failure.path, failure.error);
                    }
                    anyhow::bail!("retry of job {job_id} failed for {} file(s)", failures.len());
                }
                Err(e) => return Err(e.into()),
            }
        }
        Command::Cancel { job_id } => {
            let clients = Clients::new(&config)?;
            let stopped = clients.coordinator(&config).cancel_upload(&job_id).await?;
            println!("job {job_id} cancelled (local transfer stopped: {stopped})");
        }
        Command::Status { job_id } => {
            let clients = Clients::new(&config)?;
            let job = clients.jobs.get_job(&job_id).await?;
            println!("{}: {} {}", job.job_id, job.status, job.current_stage);
            if let Some(error) = &job.service_fields.error {
                println!("error: {error}");
            }
            if job.status == JobStatus::Failed && job.service_fields.cancelled == Some(true) {
                println!("cancelled by user");
            }
            if let Some(remote) = clients.coordinator(&config).upload_status(&job_id).await? {
                println!(
                    "server: {:?}, {}/{} chunks complete",
                    remote.upload_status,
                    remote.completed_chunks(),
                    remote.chunk_statuses.len()
                );
            }
        }
        Command::Job { job_id } => {
            let clients = Clients::new(&config)?;
            let job = clients.jobs.get_job(&job_id).await?;
            println!("{}", serde_json::to_string_pretty(&job)?);
        }
        Command::Config { init } => {
            let path = config::config_path();
            if init {
                config.save_to(&path)?;
            }
            println!("# {}", path.display());
            print!("{}", toml::to_string_pretty(&config)?);
        }
    }
    Ok(())
}
