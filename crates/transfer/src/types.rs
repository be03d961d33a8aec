use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::checkpoint::CheckpointIdentity;

/// One entry of a chunk plan: a contiguous byte range of the source file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkRange {
    /// 1-based part number, the resume key.
    pub part_number: u32,
    /// Byte offset within the file.
    pub start: u64,
    /// Length in bytes. Only the last part may be shorter than the chunk size.
    pub length: u64,
}

impl ChunkRange {
    /// Exclusive end offset.
    pub fn end(&self) -> u64 {
        self.start + self.length
    }
}

/// A part the remote store has acknowledged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletedPart {
    pub part_number: u32,
    pub etag: String,
}

/// Identity of one logical upload, captured when a multipart attempt starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadSession {
    pub source_path: PathBuf,
    /// Key the parts are written under. May carry a timestamp prefix.
    pub object_key: String,
    /// Prefix plus bare file name; stable across runs.
    pub destination: String,
    pub file_size: u64,
    pub chunk_size: u64,
    /// Whole-file SHA-256, hex encoded.
    pub fingerprint: String,
}

impl UploadSession {
    /// The fields a saved checkpoint must match to be reused.
    pub fn identity(&self) -> CheckpointIdentity {
        CheckpointIdentity {
            destination: self.destination.clone(),
            fingerprint: self.fingerprint.clone(),
            file_size: self.file_size,
            chunk_size: self.chunk_size,
        }
    }

    /// Number of parts this session splits the file into.
    pub fn part_count(&self) -> u64 {
        if self.chunk_size == 0 {
            return 0;
        }
        self.file_size.div_ceil(self.chunk_size)
    }
}
