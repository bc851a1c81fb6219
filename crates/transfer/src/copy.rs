//! Copy a file into an upload directory while hashing it.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::time::Duration;

use md5::{Digest, Md5};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use crate::TransferError;
use crate::progress::{ProgressCallback, ProgressThrottle};
use crate::types::Chunk;
use crate::validation::validate_file_name;
use crate::worker::{ChunkSink, WorkerRegistry};

/// Tuning knobs for [`copy_and_hash`].
#[derive(Debug, Clone, Copy, Default)]
pub struct CopyOptions {
    /// Read size; 0 selects the default chunk size.
    pub chunk_size: usize,
    /// Minimum time between progress callbacks; `None` selects 500 ms.
    pub progress_interval: Option<Duration>,
}

/// Outcome of [`copy_and_hash`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CopyResult {
    /// Lowercase hex MD5 of the copied bytes.
    pub md5: String,
    pub bytes_copied: u64,
    pub destination: PathBuf,
}

/// Sink that writes each chunk to the destination and hashes the same bytes.
pub struct CopySink {
    dest: tokio::fs::File,
    hasher: Md5,
    copied: u64,
    progress: ProgressThrottle,
}

impl CopySink {
    pub fn new(dest: tokio::fs::File, progress: ProgressThrottle) -> Self {
        Self {
            dest,
            hasher: Md5::new(),
            copied: 0,
            progress,
        }
    }

    /// Flushes the destination and the final progress value.
    async fn finish(mut self) -> Result<(String, u64), TransferError> {
        self.dest.flush().await?;
        self.dest.sync_all().await?;
        self.progress.flush();
        Ok((hex::encode(self.hasher.finalize()), self.copied))
    }
}

impl ChunkSink for CopySink {
    type Error = TransferError;

    fn accept(
        &mut self,
        chunk: Chunk,
    ) -> Pin<Box<dyn Future<Output = Result<(), TransferError>> + Send + '_>> {
        Box::pin(async move {
            self.dest.write_all(&chunk.data).await?;
            self.hasher.update(&chunk.data);
            self.copied += chunk.len() as u64;
            self.progress.report(self.copied);
            Ok(())
        })
    }
}

/// Copies `source` to `dest_dir/file_name`, computing its MD5 in the same pass.
///
/// The read runs on a worker registered under `job_id`, so
/// [`WorkerRegistry::cancel`] stops the copy. A cancelled or failed copy
/// leaves a partial destination file behind.
pub async fn copy_and_hash(
    workers: &WorkerRegistry,
    job_id: &str,
    source: &Path,
    dest_dir: &Path,
    file_name: &str,
    options: CopyOptions,
    on_progress: Option<ProgressCallback>,
) -> Result<CopyResult, TransferError> {
    validate_file_name(file_name)?;

    let total_bytes = tokio::fs::metadata(source).await?.len();
    let destination = dest_dir.join(file_name);
    let dest = tokio::fs::File::create(&destination).await?;

    debug!(
        job_id,
        source = %source.display(),
        destination = %destination.display(),
        total_bytes,
        "starting copy"
    );

    let progress = ProgressThrottle::new(
        on_progress,
        source.to_string_lossy(),
        total_bytes,
        options.progress_interval,
    );
    let sink = CopySink::new(dest, progress);
    let (sink, summary) = workers
        .read(job_id, source.to_path_buf(), options.chunk_size, sink)
        .wait()
        .await?;
    let (md5, bytes_copied) = sink.finish().await?;

    info!(
        job_id,
        source = %source.display(),
        bytes = bytes_copied,
        chunks = summary.chunks,
        md5 = %md5,
        "copy complete"
    );

    Ok(CopyResult {
        md5,
        bytes_copied,
        destination,
    })
}
