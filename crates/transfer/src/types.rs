/// A chunk of file data read from disk.
#[derive(Debug, Clone)]
pub struct Chunk {
    /// Zero-based position of this chunk in the file.
    pub sequence: u64,
    /// Byte offset within the file.
    pub offset: u64,
    /// Raw chunk data.
    pub data: Vec<u8>,
}

impl Chunk {
    /// Size of this chunk in bytes.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Totals of a finished read.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransferSummary {
    pub chunks: u64,
    pub bytes: u64,
}
