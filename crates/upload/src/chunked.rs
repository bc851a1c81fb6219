//! Streams a file to the storage service's chunk endpoint.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tracing::debug;

use fms_transfer::{Chunk, ChunkSink, ProgressThrottle};

use crate::error::UploadError;
use crate::services::StorageService;

/// Chunk sink that posts every chunk to `uploadChunk/{uploadId}/{n}`.
///
/// Chunk numbers start at 1. A chunk the server reports errors for aborts
/// the transfer.
pub(crate) struct RemoteChunkSink {
    storage: Arc<dyn StorageService>,
    upload_id: String,
    sent: u64,
    progress: ProgressThrottle,
}

impl RemoteChunkSink {
    pub(crate) fn new(
        storage: Arc<dyn StorageService>,
        upload_id: String,
        progress: ProgressThrottle,
    ) -> Self {
        Self {
            storage,
            upload_id,
            sent: 0,
            progress,
        }
    }

    /// Delivers the final progress value and returns the bytes sent.
    pub(crate) fn finish(mut self) -> u64 {
        self.progress.flush();
        self.sent
    }
}

impl ChunkSink for RemoteChunkSink {
    type Error = UploadError;

    fn accept(
        &mut self,
        chunk: Chunk,
    ) -> Pin<Box<dyn Future<Output = Result<(), UploadError>> + Send + '_>> {
        Box::pin(async move {
            let chunk_number = chunk.sequence + 1;
            let len = chunk.len() as u64;
            let resp = self
                .storage
                .upload_chunk(&self.upload_id, chunk_number, chunk.data)
                .await?;

            if resp.error_count > 0 {
                return Err(UploadError::ChunkRejected {
                    chunk_number,
                    error_count: resp.error_count,
                });
            }
            debug!(upload_id = %self.upload_id, chunk_number, bytes = len, "chunk accepted");

            self.sent += len;
            self.progress.report(self.sent);
            Ok(())
        })
    }
}
