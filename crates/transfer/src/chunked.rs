use std::future::Future;
use std::path::Path;
use std::pin::Pin;

use futures_util::Stream;
use md5::{Digest, Md5};
use tokio::io::AsyncReadExt;

use crate::types::Chunk;
use crate::worker::ChunkSink;
use crate::{DEFAULT_CHUNK_SIZE, TransferError};

// ---------------------------------------------------------------------------
// Hash helpers
// ---------------------------------------------------------------------------

/// Computes MD5 of `data` and returns the hex-encoded digest.
pub fn md5_bytes(data: &[u8]) -> String {
    hex::encode(Md5::digest(data))
}

/// Computes MD5 of an entire file, reading it in `chunk_size` chunks.
pub async fn calculate_file_md5(path: &Path, chunk_size: usize) -> Result<String, TransferError> {
    let mut reader = ChunkReader::open(path, chunk_size).await?;
    let mut sink = HashSink::new();
    while let Some(chunk) = reader.next_chunk().await? {
        sink.update(&chunk.data);
    }
    Ok(sink.finalize_hex())
}

/// Chunk sink that only accumulates an MD5 digest.
#[derive(Default)]
pub struct HashSink {
    hasher: Md5,
    bytes: u64,
}

impl HashSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, data: &[u8]) {
        self.hasher.update(data);
        self.bytes += data.len() as u64;
    }

    /// Bytes hashed so far.
    pub fn bytes(&self) -> u64 {
        self.bytes
    }

    pub fn finalize_hex(self) -> String {
        hex::encode(self.hasher.finalize())
    }
}

impl ChunkSink for HashSink {
    type Error = TransferError;

    fn accept(
        &mut self,
        chunk: Chunk,
    ) -> Pin<Box<dyn Future<Output = Result<(), TransferError>> + Send + '_>> {
        Box::pin(async move {
            self.update(&chunk.data);
            Ok(())
        })
    }
}

// ---------------------------------------------------------------------------
// ChunkReader
// ---------------------------------------------------------------------------

/// Reads a file in fixed-size chunks, strictly in file order.
///
/// Nothing is read ahead: each call to [`next_chunk`](Self::next_chunk)
/// performs exactly one read of at most `chunk_size` bytes.
pub struct ChunkReader {
    file: tokio::fs::File,
    chunk_size: usize,
    offset: u64,
    sequence: u64,
    file_size: u64,
}

impl ChunkReader {
    /// Opens `path` for chunked reading.
    ///
    /// If `chunk_size` is 0, [`DEFAULT_CHUNK_SIZE`] is used.
    pub async fn open(path: &Path, chunk_size: usize) -> Result<Self, TransferError> {
        let file = tokio::fs::File::open(path).await?;
        let file_size = file.metadata().await?.len();
        let chunk_size = if chunk_size == 0 {
            DEFAULT_CHUNK_SIZE
        } else {
            chunk_size
        };
        Ok(Self {
            file,
            chunk_size,
            offset: 0,
            sequence: 0,
            file_size,
        })
    }

    /// Reads the next chunk. Returns `None` at EOF.
    ///
    /// A file that shrinks while being read fails with `UnexpectedEof`.
    pub async fn next_chunk(&mut self) -> Result<Option<Chunk>, TransferError> {
        let remaining = self.file_size - self.offset;
        if remaining == 0 {
            return Ok(None);
        }

        let read_size = remaining.min(self.chunk_size as u64) as usize;
        let mut buf = vec![0u8; read_size];
        self.file.read_exact(&mut buf).await?;

        let chunk = Chunk {
            sequence: self.sequence,
            offset: self.offset,
            data: buf,
        };
        self.offset += read_size as u64;
        self.sequence += 1;
        Ok(Some(chunk))
    }

    /// Turns the reader into a pull-based stream of chunks.
    ///
    /// The next read starts only when the stream is polled again.
    pub fn into_stream(self) -> impl Stream<Item = Result<Chunk, TransferError>> + Send {
        futures_util::stream::try_unfold(self, |mut reader| async move {
            Ok(reader.next_chunk().await?.map(|chunk| (chunk, reader)))
        })
    }

    /// Current byte offset.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Total file size in bytes.
    pub fn file_size(&self) -> u64 {
        self.file_size
    }

    /// Bytes remaining to read.
    pub fn remaining(&self) -> u64 {
        self.file_size - self.offset
    }

    /// Number of chunks the file splits into.
    pub fn chunk_count(&self) -> u64 {
        self.file_size.div_ceil(self.chunk_size as u64)
    }
}
