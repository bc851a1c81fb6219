use std::sync::Arc;
use std::time::{Duration, Instant};

use fms_protocol::UploadProgress;

/// Default progress notification interval.
pub const DEFAULT_INTERVAL: Duration = Duration::from_millis(500);

/// Callback invoked with copy progress.
pub type ProgressCallback = Arc<dyn Fn(UploadProgress) + Send + Sync>;

/// Coalesces progress updates for one file to at most one per interval.
///
/// [`flush`](Self::flush) always delivers the latest value unless it was
/// already the last one delivered, so the final byte count is observed
/// exactly once.
pub struct ProgressThrottle {
    callback: Option<ProgressCallback>,
    source_path: String,
    total_bytes: u64,
    interval: Duration,
    current: u64,
    last_emit: Option<Instant>,
    last_reported: Option<u64>,
}

impl ProgressThrottle {
    /// Creates a throttle for `source_path`.
    ///
    /// If `interval` is `None`, defaults to 500 ms.
    pub fn new(
        callback: Option<ProgressCallback>,
        source_path: impl Into<String>,
        total_bytes: u64,
        interval: Option<Duration>,
    ) -> Self {
        Self {
            callback,
            source_path: source_path.into(),
            total_bytes,
            interval: interval.unwrap_or(DEFAULT_INTERVAL),
            current: 0,
            last_emit: None,
            last_reported: None,
        }
    }

    /// A throttle that never calls back.
    pub fn silent(source_path: impl Into<String>, total_bytes: u64) -> Self {
        Self::new(None, source_path, total_bytes, None)
    }

    /// Records `bytes_copied` and notifies if the interval has elapsed.
    pub fn report(&mut self, bytes_copied: u64) {
        self.current = self.current.max(bytes_copied);
        let due = self
            .last_emit
            .is_none_or(|at| at.elapsed() >= self.interval);
        if due {
            self.emit();
        }
    }

    /// Delivers the latest value if it has not been delivered yet.
    pub fn flush(&mut self) {
        if self.last_reported != Some(self.current) {
            self.emit();
        }
    }

    /// Bytes recorded so far.
    pub fn bytes_copied(&self) -> u64 {
        self.current
    }

    pub fn total_bytes(&self) -> u64 {
        self.total_bytes
    }

    fn emit(&mut self) {
        self.last_emit = Some(Instant::now());
        self.last_reported = Some(self.current);
        if let Some(cb) = &self.callback {
            cb(UploadProgress {
                source_path: self.source_path.clone(),
                bytes_copied: self.current,
                total_bytes: self.total_bytes,
            });
        }
    }
}
