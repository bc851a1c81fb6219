//! CLI configuration.
//!
//! Configuration is stored as TOML:
//! - Linux: `~/.config/fms-upload/config.toml`
//! - Windows: `%APPDATA%/fms-upload/config.toml`

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use fms_protocol::constants::DEFAULT_CHUNK_SIZE;
use fms_upload::{CoordinatorOptions, UploadMode};

/// CLI configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CliConfig {
    /// Host serving the file-storage-service.
    #[serde(default = "default_url")]
    pub storage_url: String,

    /// Host serving the job-storage-service.
    #[serde(default = "default_url")]
    pub job_url: String,

    /// Host serving the metadata catalog.
    #[serde(default = "default_url")]
    pub catalog_url: String,

    /// User recorded on new jobs.
    #[serde(default = "default_user")]
    pub user: String,

    #[serde(default)]
    pub mode: UploadMode,

    /// Local read size in bytes.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    #[serde(default = "default_progress_interval_ms")]
    pub progress_interval_ms: u64,

    /// Delay between job visibility polls.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Give up waiting for a new job after this many seconds.
    #[serde(default = "default_poll_timeout_secs")]
    pub poll_timeout_secs: u64,

    #[serde(default = "default_true")]
    pub should_be_in_archive: bool,

    #[serde(default)]
    pub should_be_in_local: bool,
}

fn default_url() -> String {
    "http://localhost:8080".into()
}

fn default_user() -> String {
    std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .unwrap_or_else(|_| "unknown".into())
}

fn default_chunk_size() -> usize {
    DEFAULT_CHUNK_SIZE
}

fn default_progress_interval_ms() -> u64 {
    500
}

fn default_poll_interval_ms() -> u64 {
    500
}

fn default_poll_timeout_secs() -> u64 {
    30
}

fn default_true() -> bool {
    true
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            storage_url: default_url(),
            job_url: default_url(),
            catalog_url: default_url(),
            user: default_user(),
            mode: UploadMode::default(),
            chunk_size: default_chunk_size(),
            progress_interval_ms: default_progress_interval_ms(),
            poll_interval_ms: default_poll_interval_ms(),
            poll_timeout_secs: default_poll_timeout_secs(),
            should_be_in_archive: true,
            should_be_in_local: false,
        }
    }
}

impl CliConfig {
    /// Loads the configuration file, falling back to defaults if it is
    /// missing or unreadable.
    pub fn load() -> Self {
        let path = config_path();
        if !path.exists() {
            return Self::default();
        }
        match Self::load_from(&path) {
            Ok(config) => config,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "ignoring unreadable configuration");
                Self::default()
            }
        }
    }

    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Writes the configuration, creating parent directories.
    pub fn save_to(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, toml::to_string_pretty(self)?)?;
        tracing::debug!(path = %path.display(), "configuration saved");
        Ok(())
    }

    pub fn coordinator_options(&self) -> CoordinatorOptions {
        CoordinatorOptions {
            chunk_size: self.chunk_size,
            progress_interval: Duration::from_millis(self.progress_interval_ms),
            should_be_in_archive: self.should_be_in_archive,
            should_be_in_local: self.should_be_in_local,
            mode: self.mode,
            user: self.user.clone(),
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn poll_timeout(&self) -> Duration {
        Duration::from_secs(self.poll_timeout_secs)
    }
}

/// Returns the platform-specific configuration file path.
pub fn config_path() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        let appdata =
            std::env::var("APPDATA").unwrap_or_else(|_| "C:\\Users\\Default\\AppData".into());
        PathBuf::from(appdata).join("fms-upload").join("config.toml")
    }

    #[cfg(not(target_os = "windows"))]
    {
        let base = std::env::var("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".into());
                PathBuf::from(home).join(".config")
            });
        base.join("fms-upload").join("config.toml")
    }
}
