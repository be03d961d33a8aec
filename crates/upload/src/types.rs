//! Data types for the upload flow.

use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, Utc};
use ossup_transfer::DEFAULT_CHUNK_SIZE;
use serde::Serialize;

use crate::retry::RetryPolicy;

/// Files smaller than this go up in a single put: 1 MiB.
pub const DEFAULT_MULTIPART_THRESHOLD: u64 = 1024 * 1024;

/// Per-part retries.
pub const DEFAULT_PART_RETRIES: u32 = 3;

/// Whole-operation retries.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Tunables for one upload.
#[derive(Debug, Clone, PartialEq)]
pub struct UploadOptions {
    /// Bytes per part; raised to `MIN_CHUNK_SIZE` if smaller.
    pub chunk_size: u64,
    /// Size at or above which multipart is used.
    pub multipart_threshold: u64,
    /// Read and write checkpoints so an interrupted upload can resume.
    pub resumable: bool,
    /// Retry budget for a single part (and for the simple put).
    pub part_retry: RetryPolicy,
    /// Retry budget for the whole validate → finalize pipeline.
    pub operation_retry: RetryPolicy,
}

impl Default for UploadOptions {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            multipart_threshold: DEFAULT_MULTIPART_THRESHOLD,
            resumable: true,
            part_retry: RetryPolicy::new(
                DEFAULT_PART_RETRIES,
                Duration::from_millis(500),
                Duration::from_secs(5),
            ),
            operation_retry: RetryPolicy::new(
                DEFAULT_MAX_RETRIES,
                Duration::from_secs(1),
                Duration::from_secs(30),
            ),
        }
    }
}

/// What the caller asks for.
#[derive(Debug, Clone)]
pub struct UploadRequest {
    pub source_path: PathBuf,
    /// Destination prefix ("folder") inside the bucket.
    pub prefix: Option<String>,
    /// Use the bare file name instead of `<unix-seconds>_<name>`.
    pub keep_original_name: bool,
    pub options: UploadOptions,
}

impl UploadRequest {
    pub fn new(source_path: impl Into<PathBuf>) -> Self {
        Self {
            source_path: source_path.into(),
            prefix: None,
            keep_original_name: false,
            options: UploadOptions::default(),
        }
    }
}

/// A request resolved once before the first attempt: absolute path,
/// final key, content type and sanitized options.
#[derive(Debug, Clone)]
pub struct UploadTarget {
    pub source_path: PathBuf,
    /// Key for a fresh upload. A resumed session keeps its original key.
    pub object_key: String,
    /// Normalized prefix plus bare file name; locates resume checkpoints.
    pub destination: String,
    pub content_type: String,
    pub options: UploadOptions,
}

/// Pipeline states. `Failed` is reachable from every non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadState {
    Validating,
    SimpleUpload,
    MultipartPlanning,
    MultipartUploading,
    Finalizing,
    Done,
    Failed,
}

/// Resume details reported for resumable uploads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResumeInfo {
    /// The last attempt continued a checkpointed session.
    pub resumed: bool,
    /// Parts already present when that attempt started.
    pub resumed_parts: usize,
    pub total_parts: usize,
}

/// Result of one successful attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttemptOutcome {
    pub url: String,
    /// Key the object was actually written under.
    pub object_key: String,
    pub size: u64,
    pub progress: u8,
    pub resume: Option<ResumeInfo>,
}

/// Result handed back to the caller.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadOutput {
    pub url: String,
    pub origin_file_path: String,
    pub object_key: String,
    pub size: u64,
    pub content_type: String,
    pub uploaded_at: DateTime<Utc>,
    pub progress: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resume: Option<ResumeInfo>,
}
