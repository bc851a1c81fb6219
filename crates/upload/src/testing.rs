//! In-memory doubles of the remote services.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::future::BoxFuture;

use fms_job_client::JobClientError;
use fms_protocol::{
    ChunkStatus, JobPatch, JobStatus, RegisterUploadRequest, RegisterUploadResponse,
    RemoteUploadStatus, ServiceFields, StartUploadRequest, StartUploadResponse,
    UploadChunkResponse, UploadCompleteRequest, UploadFinalizeResponse,
    UploadJob, UploadMetadataResponse, UploadProgress, UploadRequest, UploadStatusResponse,
};
use fms_storage_client::{CatalogError, StorageClientError};
use fms_transfer::ProgressCallback;

use crate::coordinator::UploadCoordinator;
use crate::options::CoordinatorOptions;
use crate::services::{FileCatalog, JobTracker, StorageService};

/// Ordered log of calls shared by all doubles and progress callbacks.
pub(crate) type Events = Arc<Mutex<Vec<String>>>;

pub(crate) fn events() -> Events {
    Arc::new(Mutex::new(Vec::new()))
}

pub(crate) fn api_error(status: u16) -> StorageClientError {
    StorageClientError::Api {
        status,
        body: "mock failure".into(),
    }
}

/// Job service that applies patches the way the real one does.
pub(crate) struct MockJobs {
    pub events: Events,
    pub jobs: Mutex<HashMap<String, UploadJob>>,
    pub updates: Mutex<Vec<(String, JobPatch, bool)>>,
}

impl MockJobs {
    pub fn new(events: Events) -> Self {
        Self {
            events,
            jobs: Mutex::new(HashMap::new()),
            updates: Mutex::new(Vec::new()),
        }
    }

    pub fn insert(&self, job: UploadJob) {
        self.jobs.lock().unwrap().insert(job.job_id.clone(), job);
    }

    pub fn job(&self, job_id: &str) -> UploadJob {
        self.jobs.lock().unwrap()[job_id].clone()
    }

    pub fn job_count(&self) -> usize {
        self.jobs.lock().unwrap().len()
    }
}

impl JobTracker for MockJobs {
    fn get_job<'a>(&'a self, job_id: &'a str) -> BoxFuture<'a, Result<UploadJob, JobClientError>> {
        self.events.lock().unwrap().push(format!("get_job {job_id}"));
        let job = self.jobs.lock().unwrap().get(job_id).cloned();
        Box::pin(async move { job.ok_or_else(|| JobClientError::NotFound(job_id.to_string())) })
    }

    fn update_job<'a>(
        &'a self,
        job_id: &'a str,
        patch: &'a JobPatch,
        append: bool,
    ) -> BoxFuture<'a, Result<(), JobClientError>> {
        self.events.lock().unwrap().push(format!("update_job {job_id}"));
        self.updates
            .lock()
            .unwrap()
            .push((job_id.to_string(), patch.clone(), append));
        let result = match self.jobs.lock().unwrap().get_mut(job_id) {
            Some(job) => {
                job.apply_patch(patch, append);
                Ok(())
            }
            None => Err(JobClientError::NotFound(job_id.to_string())),
        };
        Box::pin(async move { result })
    }

    fn wait_for_job_to_exist<'a>(
        &'a self,
        job_id: &'a str,
    ) -> BoxFuture<'a, Result<(), JobClientError>> {
        self.events.lock().unwrap().push(format!("wait_for_job {job_id}"));
        let exists = self.jobs.lock().unwrap().contains_key(job_id);
        Box::pin(async move {
            if exists {
                Ok(())
            } else {
                Err(JobClientError::NotFound(job_id.to_string()))
            }
        })
    }
}

/// Storage service that allocates upload directories under `root` and
/// creates a WAITING job in `jobs` for every started upload.
pub(crate) struct MockStorage {
    pub events: Events,
    jobs: Arc<MockJobs>,
    root: PathBuf,
    next_job: AtomicU64,
    pub started: Mutex<Vec<StartUploadRequest>>,
    pub completed: Mutex<Vec<UploadCompleteRequest>>,
    pub chunks: Mutex<Vec<(u64, usize)>>,
    pub cancelled: Mutex<Vec<String>>,
    /// Chunk size returned by `register_upload`.
    pub server_chunk_size: u64,
    pub fail_upload_complete: bool,
    pub fail_start: bool,
    /// Chunk number answered with a non-zero `errorCount`.
    pub reject_chunk: Option<u64>,
    /// Delay before `register_upload` answers.
    pub register_delay: Duration,
    /// Runs once a started upload has its job.
    pub after_start: Mutex<Option<Box<dyn Fn() + Send + Sync>>>,
}

impl MockStorage {
    pub fn new(events: Events, jobs: Arc<MockJobs>, root: &Path) -> Self {
        Self {
            events,
            jobs,
            root: root.to_path_buf(),
            next_job: AtomicU64::new(1),
            started: Mutex::new(Vec::new()),
            completed: Mutex::new(Vec::new()),
            chunks: Mutex::new(Vec::new()),
            cancelled: Mutex::new(Vec::new()),
            server_chunk_size: 1024,
            fail_upload_complete: false,
            fail_start: false,
            reject_chunk: None,
            register_delay: Duration::ZERO,
            after_start: Mutex::new(None),
        }
    }

    pub fn start_count(&self) -> usize {
        self.started.lock().unwrap().len()
    }

    fn log(&self, event: String) {
        self.events.lock().unwrap().push(event);
    }
}

impl StorageService for MockStorage {
    fn start_upload<'a>(
        &'a self,
        request: &'a StartUploadRequest,
    ) -> BoxFuture<'a, Result<StartUploadResponse, StorageClientError>> {
        self.log("start_upload".into());
        self.started.lock().unwrap().push(request.clone());
        Box::pin(async move {
            if self.fail_start {
                return Err(api_error(500));
            }
            let n = self.next_job.fetch_add(1, Ordering::Relaxed);
            let job_id = format!("new-job-{n}");
            let upload_directory = self.root.join(&job_id);
            std::fs::create_dir_all(&upload_directory).unwrap();

            self.jobs.insert(UploadJob {
                job_id: job_id.clone(),
                job_name: request.job_name.clone(),
                user: request.user.clone(),
                status: JobStatus::Waiting,
                current_stage: String::new(),
                service_fields: request.service_fields.clone(),
                created: None,
                modified: None,
            });
            if let Some(hook) = self.after_start.lock().unwrap().as_ref() {
                hook();
            }

            Ok(StartUploadResponse {
                job_id,
                upload_directory: upload_directory.to_string_lossy().into_owned(),
            })
        })
    }

    fn upload_complete<'a>(
        &'a self,
        request: &'a UploadCompleteRequest,
    ) -> BoxFuture<'a, Result<Vec<UploadMetadataResponse>, StorageClientError>> {
        self.log(format!("upload_complete {}", request.job_id));
        self.completed.lock().unwrap().push(request.clone());
        Box::pin(async move {
            if self.fail_upload_complete {
                return Err(api_error(502));
            }
            Ok(request
                .files
                .iter()
                .map(|f| UploadMetadataResponse {
                    file_id: format!("file-{}", f.md5hex),
                    file_name: f.file_name.clone(),
                    extra: serde_json::Map::new(),
                })
                .collect())
        })
    }

    fn register_upload<'a>(
        &'a self,
        request: &'a RegisterUploadRequest,
    ) -> BoxFuture<'a, Result<RegisterUploadResponse, StorageClientError>> {
        self.log(format!("register_upload {}", request.file_name));
        let chunk_size = self.server_chunk_size;
        let delay = self.register_delay;
        Box::pin(async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            Ok(RegisterUploadResponse {
                upload_id: "fss-1".into(),
                chunk_size,
            })
        })
    }

    fn upload_chunk<'a>(
        &'a self,
        upload_id: &'a str,
        chunk_number: u64,
        data: Vec<u8>,
    ) -> BoxFuture<'a, Result<UploadChunkResponse, StorageClientError>> {
        self.log(format!("upload_chunk {chunk_number}"));
        self.chunks.lock().unwrap().push((chunk_number, data.len()));
        let error_count = u32::from(self.reject_chunk == Some(chunk_number));
        Box::pin(async move {
            Ok(UploadChunkResponse {
                chunk_number,
                file_id: None,
                upload_id: upload_id.to_string(),
                error_count,
            })
        })
    }

    fn finalize<'a>(
        &'a self,
        upload_id: &'a str,
    ) -> BoxFuture<'a, Result<UploadFinalizeResponse, StorageClientError>> {
        self.log(format!("finalize {upload_id}"));
        Box::pin(async move {
            Ok(UploadFinalizeResponse {
                upload_id: upload_id.to_string(),
                file_id: Some("file-chunked".into()),
            })
        })
    }

    fn cancel_upload<'a>(
        &'a self,
        upload_id: &'a str,
    ) -> BoxFuture<'a, Result<(), StorageClientError>> {
        self.log(format!("cancel_upload {upload_id}"));
        self.cancelled.lock().unwrap().push(upload_id.to_string());
        Box::pin(async move { Ok(()) })
    }

    fn get_status<'a>(
        &'a self,
        upload_id: &'a str,
    ) -> BoxFuture<'a, Result<UploadStatusResponse, StorageClientError>> {
        self.log(format!("get_status {upload_id}"));
        Box::pin(async move {
            Ok(UploadStatusResponse {
                upload_status: RemoteUploadStatus::Working,
                chunk_statuses: vec![ChunkStatus::Complete, ChunkStatus::Pending],
            })
        })
    }
}

/// Catalog that answers every lookup with `exists`.
pub(crate) struct MockCatalog {
    pub events: Events,
    pub exists: bool,
    pub queries: Mutex<Vec<(String, String)>>,
}

impl MockCatalog {
    pub fn new(events: Events, exists: bool) -> Self {
        Self {
            events,
            exists,
            queries: Mutex::new(Vec::new()),
        }
    }
}

impl FileCatalog for MockCatalog {
    fn file_exists_by_md5_and_name<'a>(
        &'a self,
        md5: &'a str,
        file_name: &'a str,
    ) -> BoxFuture<'a, Result<bool, CatalogError>> {
        self.events
            .lock()
            .unwrap()
            .push(format!("catalog {md5} {file_name}"));
        self.queries
            .lock()
            .unwrap()
            .push((md5.to_string(), file_name.to_string()));
        let exists = self.exists;
        Box::pin(async move { Ok(exists) })
    }
}

/// A coordinator wired to in-memory services over a temp directory.
pub(crate) struct Harness {
    pub dir: tempfile::TempDir,
    pub events: Events,
    pub jobs: Arc<MockJobs>,
    pub storage: Arc<MockStorage>,
    pub catalog: Arc<MockCatalog>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with(|_| {}, false)
    }

    /// Builds a harness, letting `configure` adjust the storage double.
    pub fn with(configure: impl FnOnce(&mut MockStorage), catalog_exists: bool) -> Self {
        let dir = tempfile::TempDir::new().unwrap();
        let events = events();
        let jobs = Arc::new(MockJobs::new(Arc::clone(&events)));
        let uploads = dir.path().join("fms");
        std::fs::create_dir_all(&uploads).unwrap();

        let mut storage = MockStorage::new(Arc::clone(&events), Arc::clone(&jobs), &uploads);
        configure(&mut storage);
        let catalog = MockCatalog::new(Arc::clone(&events), catalog_exists);

        Self {
            dir,
            events,
            jobs,
            storage: Arc::new(storage),
            catalog: Arc::new(catalog),
        }
    }

    pub fn coordinator(&self, options: CoordinatorOptions) -> UploadCoordinator {
        UploadCoordinator::new(
            self.storage.clone(),
            self.jobs.clone(),
            self.catalog.clone(),
            options,
        )
    }

    /// Writes a source file and returns it with a matching request.
    pub fn write_file(&self, name: &str, data: &[u8]) -> (PathBuf, UploadRequest) {
        let src = self.dir.path().join("src");
        std::fs::create_dir_all(&src).unwrap();
        let path = src.join(name);
        std::fs::write(&path, data).unwrap();
        let request = UploadRequest::new(path.to_string_lossy(), "image");
        (path, request)
    }

    /// Inserts a job in `status` covering `files`.
    pub fn insert_job(&self, job_id: &str, status: JobStatus, files: Vec<UploadRequest>) {
        self.jobs.insert(UploadJob {
            job_id: job_id.to_string(),
            job_name: "old upload".into(),
            user: "tester".into(),
            status,
            current_stage: String::new(),
            service_fields: ServiceFields {
                files,
                ..ServiceFields::default()
            },
            created: None,
            modified: None,
        });
    }

    /// Progress callback that appends `progress <bytes>` to the event log.
    pub fn recorder(&self) -> ProgressCallback {
        let events = Arc::clone(&self.events);
        Arc::new(move |p: UploadProgress| {
            events
                .lock()
                .unwrap()
                .push(format!("progress {}", p.bytes_copied));
        })
    }

    pub fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }

    /// Bytes reported through [`recorder`](Self::recorder), in order.
    pub fn progress(&self) -> Vec<u64> {
        self.events()
            .iter()
            .filter_map(|e| e.strip_prefix("progress "))
            .map(|n| n.parse().unwrap())
            .collect()
    }
}
