//! Local side of a resumable multipart upload.
//!
//! Everything here is synchronous and transport-free: chunk planning,
//! range reads, whole-file fingerprints, checkpoint persistence and
//! progress bookkeeping. The async pipeline lives in `ossup-upload`.

mod checkpoint;
mod chunked;
mod progress;
mod types;
mod validation;

pub use checkpoint::{Checkpoint, CheckpointIdentity, CheckpointStore, is_reusable};
pub use chunked::{calculate_file_checksum, checksum_bytes, plan, read_range};
pub use progress::{NoProgress, ProgressReporter, ProgressSink, percent_complete};
pub use types::{ChunkRange, CompletedPart, UploadSession};
pub use validation::{normalize_prefix, validate_object_key};

/// Default chunk size: 1 MiB.
pub const DEFAULT_CHUNK_SIZE: u64 = 1024 * 1024;

/// Smallest chunk size a multipart session may use: 100 KiB.
///
/// Smaller parts would blow up the part count on large files.
pub const MIN_CHUNK_SIZE: u64 = 100 * 1024;

/// Errors produced by the transfer crate.
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid chunk size: {0}")]
    InvalidChunkSize(u64),

    #[error("file shrank: needed {needed} bytes, file has {actual}")]
    FileShrank { needed: u64, actual: u64 },

    #[error("invalid object key: {0}")]
    InvalidKey(String),
}
