//! Local side of an FMS upload.
//!
//! - [`ChunkReader`] reads a file in bounded chunks, one at a time.
//! - [`WorkerRegistry`] drives a reader on a background task per job and
//!   feeds every chunk to a [`ChunkSink`], awaiting it before the next read.
//! - [`copy_and_hash`] copies a file into a server upload directory while
//!   computing its MD5 in the same pass.

mod chunked;
mod copy;
mod progress;
mod types;
mod validation;
mod worker;

pub use chunked::{ChunkReader, HashSink, calculate_file_md5, md5_bytes};
pub use copy::{CopyOptions, CopyResult, CopySink, copy_and_hash};
pub use progress::{ProgressCallback, ProgressThrottle};
pub use types::{Chunk, TransferSummary};
pub use validation::validate_file_name;
pub use worker::{ChunkSink, JobLease, TransferHandle, WorkerRegistry};

pub use fms_protocol::constants::DEFAULT_CHUNK_SIZE;

/// Errors produced by the transfer crate.
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("transfer cancelled")]
    Cancelled,

    #[error("invalid file name: {0}")]
    InvalidPath(String),

    #[error("transfer task failed: {0}")]
    TaskFailed(String),
}
