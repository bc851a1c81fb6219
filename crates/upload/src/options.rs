use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use fms_protocol::constants::DEFAULT_CHUNK_SIZE;

/// How file bytes reach the storage service.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UploadMode {
    /// Copy into the server-allocated upload directory, then `uploadComplete`.
    #[default]
    Copy,
    /// Register, stream chunks over HTTP, then finalize.
    Chunked,
}

impl FromStr for UploadMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "copy" => Ok(UploadMode::Copy),
            "chunked" => Ok(UploadMode::Chunked),
            other => Err(format!("unknown upload mode: {other} (expected copy or chunked)")),
        }
    }
}

/// Tuning for [`UploadCoordinator`](crate::UploadCoordinator).
#[derive(Debug, Clone)]
pub struct CoordinatorOptions {
    /// Local read size in bytes.
    pub chunk_size: usize,
    /// Minimum time between progress callbacks.
    pub progress_interval: Duration,
    pub should_be_in_archive: bool,
    pub should_be_in_local: bool,
    pub mode: UploadMode,
    /// User recorded on new jobs.
    pub user: String,
}

impl Default for CoordinatorOptions {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            progress_interval: Duration::from_millis(500),
            should_be_in_archive: true,
            should_be_in_local: false,
            mode: UploadMode::Copy,
            user: String::new(),
        }
    }
}
