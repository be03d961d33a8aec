//! Uploader configuration.
//!
//! Configuration is read from TOML:
//! - Linux: `~/.config/ossup/config.toml`
//! - Windows: `%APPDATA%/ossup/config.toml`
//!
//! Every field is optional; command line flags override the file.

use std::path::{Path, PathBuf};
use std::time::Duration;

use ossup_transfer::DEFAULT_CHUNK_SIZE;
use ossup_upload::types::{
    DEFAULT_MAX_RETRIES, DEFAULT_MULTIPART_THRESHOLD, DEFAULT_PART_RETRIES,
};
use ossup_upload::{RetryPolicy, UploadOptions};
use serde::{Deserialize, Serialize};

use crate::args::Args;

/// Uploader configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Directory for resume checkpoints.
    #[serde(default = "default_checkpoint_dir")]
    pub checkpoint_dir: PathBuf,

    /// Multipart chunk size in bytes.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: u64,

    /// Files at or above this size use multipart.
    #[serde(default = "default_multipart_threshold")]
    pub multipart_threshold: u64,

    /// Whole-operation retries.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Retries for a single part or simple put.
    #[serde(default = "default_part_retries")]
    pub part_retries: u32,

    /// Keep checkpoints so interrupted uploads resume.
    #[serde(default = "default_true")]
    pub resumable: bool,

    /// Base backoff between whole-operation attempts.
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    /// Backoff cap between whole-operation attempts.
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

fn default_checkpoint_dir() -> PathBuf {
    config_dir().join("checkpoints")
}

fn default_chunk_size() -> u64 {
    DEFAULT_CHUNK_SIZE
}

fn default_multipart_threshold() -> u64 {
    DEFAULT_MULTIPART_THRESHOLD
}

fn default_max_retries() -> u32 {
    DEFAULT_MAX_RETRIES
}

fn default_part_retries() -> u32 {
    DEFAULT_PART_RETRIES
}

fn default_true() -> bool {
    true
}

fn default_base_delay_ms() -> u64 {
    1_000
}

fn default_max_delay_ms() -> u64 {
    30_000
}

impl Default for Config {
    fn default() -> Self {
        Self {
            checkpoint_dir: default_checkpoint_dir(),
            chunk_size: default_chunk_size(),
            multipart_threshold: default_multipart_threshold(),
            max_retries: default_max_retries(),
            part_retries: default_part_retries(),
            resumable: default_true(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

impl Config {
    /// Loads `path`, or the default location if it exists, or defaults.
    ///
    /// An explicitly given file must exist.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let (path, required) = match path {
            Some(p) => (p.to_path_buf(), true),
            None => (config_dir().join("config.toml"), false),
        };

        if !path.exists() {
            if required {
                anyhow::bail!("config file not found: {}", path.display());
            }
            return Ok(Config::default());
        }

        let content = std::fs::read_to_string(&path)?;
        let config: Config = toml::from_str(&content)?;
        tracing::debug!(path = %path.display(), "configuration loaded");
        Ok(config)
    }

    /// Applies command line overrides.
    pub fn apply_args(&mut self, args: &Args) {
        if let Some(dir) = &args.checkpoint_dir {
            self.checkpoint_dir = dir.clone();
        }
        if let Some(size) = args.chunk_size {
            self.chunk_size = size;
        }
        if let Some(retries) = args.max_retries {
            self.max_retries = retries;
        }
        if args.no_resume {
            self.resumable = false;
        }
    }

    /// Upload tunables. Part retries keep the library's backoff curve.
    pub fn upload_options(&self) -> UploadOptions {
        let defaults = UploadOptions::default();
        UploadOptions {
            chunk_size: self.chunk_size,
            multipart_threshold: self.multipart_threshold,
            resumable: self.resumable,
            part_retry: RetryPolicy::new(
                self.part_retries,
                defaults.part_retry.base_delay(),
                defaults.part_retry.max_delay(),
            ),
            operation_retry: RetryPolicy::new(
                self.max_retries,
                Duration::from_millis(self.base_delay_ms),
                Duration::from_millis(self.max_delay_ms),
            ),
        }
    }
}

/// Returns the platform-specific configuration directory.
fn config_dir() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        let appdata =
            std::env::var("APPDATA").unwrap_or_else(|_| "C:\\Users\\Default\\AppData".into());
        PathBuf::from(appdata).join("ossup")
    }

    #[cfg(not(target_os = "windows"))]
    {
        let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".into());
        PathBuf::from(home).join(".config").join("ossup")
    }
}
