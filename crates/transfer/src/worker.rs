//! Background transfer workers, one per job.

use std::collections::HashMap;
use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use futures_util::TryStreamExt;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::TransferError;
use crate::chunked::ChunkReader;
use crate::types::{Chunk, TransferSummary};

/// Consumer of the chunks produced by a transfer worker.
///
/// The worker awaits `accept` for chunk *n* before it reads chunk *n + 1*,
/// so at most one chunk is in memory per transfer.
pub trait ChunkSink: Send + 'static {
    type Error: From<TransferError> + Send + 'static;

    fn accept(
        &mut self,
        chunk: Chunk,
    ) -> Pin<Box<dyn Future<Output = Result<(), Self::Error>> + Send + '_>>;
}

struct WorkerEntry {
    generation: u64,
    cancel: CancellationToken,
    /// Held by a [`JobLease`] rather than a single read.
    leased: bool,
}

/// Registry of in-flight transfer workers keyed by job id.
///
/// Entries are inserted by [`read`](Self::read) and removed when the
/// worker finishes, fails or is cancelled. Starting a read for a job id
/// that already has a worker cancels the old one.
///
/// A [`lease`](Self::lease) keeps the job registered across several reads
/// and the steps between them. Reads under a lease run on child tokens of
/// the lease, so [`cancel`](Self::cancel) reaches whichever step is running.
#[derive(Default)]
pub struct WorkerRegistry {
    workers: Arc<Mutex<HashMap<String, WorkerEntry>>>,
    next_generation: AtomicU64,
}

impl WorkerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawns a worker that reads `path` and feeds every chunk to `sink`.
    pub fn read<S: ChunkSink>(
        &self,
        job_id: &str,
        path: PathBuf,
        chunk_size: usize,
        sink: S,
    ) -> TransferHandle<S> {
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        let cancel = {
            let mut workers = lock(&self.workers);
            match workers.get(job_id) {
                Some(entry) if entry.leased => entry.cancel.child_token(),
                _ => {
                    let cancel = CancellationToken::new();
                    let entry = WorkerEntry {
                        generation,
                        cancel: cancel.clone(),
                        leased: false,
                    };
                    if let Some(previous) = workers.insert(job_id.to_string(), entry) {
                        warn!(job_id, "replacing active transfer worker");
                        previous.cancel.cancel();
                    }
                    cancel
                }
            }
        };

        let workers = Arc::clone(&self.workers);
        let id = job_id.to_string();
        let token = cancel.clone();
        let join = tokio::spawn(async move {
            let result = tokio::select! {
                biased;
                _ = token.cancelled() => Err(S::Error::from(TransferError::Cancelled)),
                result = drive(path, chunk_size, sink) => result,
            };

            let mut workers = lock(&workers);
            if workers.get(&id).is_some_and(|e| e.generation == generation) {
                workers.remove(&id);
            }
            result
        });

        TransferHandle {
            job_id: job_id.to_string(),
            cancel,
            join,
        }
    }

    /// Registers `job_id` until the returned lease is dropped.
    ///
    /// An existing lease or worker for the same job is cancelled.
    pub fn lease(&self, job_id: &str) -> JobLease {
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        let cancel = CancellationToken::new();
        let entry = WorkerEntry {
            generation,
            cancel: cancel.clone(),
            leased: true,
        };
        if let Some(previous) = lock(&self.workers).insert(job_id.to_string(), entry) {
            warn!(job_id, "replacing active transfer");
            previous.cancel.cancel();
        }
        JobLease {
            job_id: job_id.to_string(),
            generation,
            cancel,
            workers: Arc::clone(&self.workers),
        }
    }

    /// Cancels the worker for `job_id`. Returns `false` if none was active.
    ///
    /// The sink may have accepted any prefix of the file when this returns.
    pub fn cancel(&self, job_id: &str) -> bool {
        match lock(&self.workers).remove(job_id) {
            Some(entry) => {
                debug!(job_id, "cancelling transfer worker");
                entry.cancel.cancel();
                true
            }
            None => false,
        }
    }

    pub fn is_active(&self, job_id: &str) -> bool {
        lock(&self.workers).contains_key(job_id)
    }

    /// Job ids with a running worker.
    pub fn active_jobs(&self) -> Vec<String> {
        let mut ids: Vec<String> = lock(&self.workers).keys().cloned().collect();
        ids.sort();
        ids
    }
}

fn lock(
    workers: &Mutex<HashMap<String, WorkerEntry>>,
) -> MutexGuard<'_, HashMap<String, WorkerEntry>> {
    workers.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

async fn drive<S: ChunkSink>(
    path: PathBuf,
    chunk_size: usize,
    mut sink: S,
) -> Result<(S, TransferSummary), S::Error> {
    let reader = ChunkReader::open(&path, chunk_size).await?;
    let stream = reader.into_stream();
    futures_util::pin_mut!(stream);

    let mut summary = TransferSummary::default();
    while let Some(chunk) = stream.try_next().await? {
        summary.chunks += 1;
        summary.bytes += chunk.len() as u64;
        sink.accept(chunk).await?;
    }
    Ok((sink, summary))
}

/// Registration of a job for the whole of a multi-step transfer.
///
/// Dropping the lease unregisters the job unless a newer lease or worker
/// has replaced it.
pub struct JobLease {
    job_id: String,
    generation: u64,
    cancel: CancellationToken,
    workers: Arc<Mutex<HashMap<String, WorkerEntry>>>,
}

impl JobLease {
    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Fails with [`TransferError::Cancelled`] once the job was cancelled.
    pub fn check(&self) -> Result<(), TransferError> {
        if self.is_cancelled() {
            Err(TransferError::Cancelled)
        } else {
            Ok(())
        }
    }
}

impl Drop for JobLease {
    fn drop(&mut self) {
        let mut workers = lock(&self.workers);
        if workers
            .get(&self.job_id)
            .is_some_and(|e| e.generation == self.generation)
        {
            workers.remove(&self.job_id);
        }
    }
}

/// Handle to a spawned transfer worker.
pub struct TransferHandle<S: ChunkSink> {
    job_id: String,
    cancel: CancellationToken,
    join: JoinHandle<Result<(S, TransferSummary), S::Error>>,
}

impl<S: ChunkSink> TransferHandle<S> {
    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    /// Cancels this worker without touching the registry entry of a newer one.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Waits for the worker and returns the sink with the read totals.
    pub async fn wait(self) -> Result<(S, TransferSummary), S::Error> {
        match self.join.await {
            Ok(result) => result,
            Err(e) if e.is_cancelled() => Err(TransferError::Cancelled.into()),
            Err(e) => Err(TransferError::TaskFailed(e.to_string()).into()),
        }
    }
}
