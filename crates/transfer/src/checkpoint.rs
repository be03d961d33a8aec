//! Resumable multipart checkpoints.
//!
//! One JSON document per (source file, destination) pair, stored under a
//! checkpoint directory with a filename derived from the SHA-256 of the
//! pair. The destination is the un-timestamped key, so a later run finds
//! the checkpoint even though it would mint a new object key. Loading never fails hard: a missing or unreadable checkpoint
//! simply means "start a fresh session".

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::TransferError;
use crate::types::{CompletedPart, UploadSession};

/// Persisted state of one multipart session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Checkpoint {
    /// Server-assigned multipart upload id.
    pub upload_id: String,
    /// Key the session was initiated under; adopted on resume.
    pub object_key: String,
    /// Checkpoints written without one never match and are discarded.
    #[serde(default)]
    pub destination: String,
    pub fingerprint: String,
    pub file_size: u64,
    pub chunk_size: u64,
    /// Acknowledged parts, kept sorted and unique by part number.
    #[serde(default)]
    pub parts: Vec<CompletedPart>,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub source_path: String,
}

/// The fields that decide whether a checkpoint belongs to the current upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckpointIdentity {
    pub destination: String,
    pub fingerprint: String,
    pub file_size: u64,
    pub chunk_size: u64,
}

/// Returns `true` if a checkpoint saved as `saved` may be resumed by an
/// upload whose identity is `current`.
pub fn is_reusable(saved: &CheckpointIdentity, current: &CheckpointIdentity) -> bool {
    !saved.destination.is_empty()
        && saved.destination == current.destination
        && saved.fingerprint == current.fingerprint
        && saved.file_size == current.file_size
        && saved.chunk_size == current.chunk_size
}

impl Checkpoint {
    /// Creates an empty checkpoint for a freshly initiated remote session.
    pub fn new(session: &UploadSession, upload_id: String) -> Self {
        Self {
            upload_id,
            object_key: session.object_key.clone(),
            destination: session.destination.clone(),
            fingerprint: session.fingerprint.clone(),
            file_size: session.file_size,
            chunk_size: session.chunk_size,
            parts: Vec::new(),
            created_at: Utc::now(),
            source_path: session.source_path.to_string_lossy().into_owned(),
        }
    }

    pub fn identity(&self) -> CheckpointIdentity {
        CheckpointIdentity {
            destination: self.destination.clone(),
            fingerprint: self.fingerprint.clone(),
            file_size: self.file_size,
            chunk_size: self.chunk_size,
        }
    }

    /// Records an acknowledged part, replacing any earlier etag for it.
    pub fn record_part(&mut self, part_number: u32, etag: String) {
        match self
            .parts
            .binary_search_by_key(&part_number, |p| p.part_number)
        {
            Ok(i) => self.parts[i].etag = etag,
            Err(i) => self.parts.insert(i, CompletedPart { part_number, etag }),
        }
    }

    pub fn has_part(&self, part_number: u32) -> bool {
        self.parts
            .binary_search_by_key(&part_number, |p| p.part_number)
            .is_ok()
    }

    /// Parts ordered by part number, ready for completion.
    pub fn sorted_parts(&self) -> Vec<CompletedPart> {
        let mut parts = self.parts.clone();
        parts.sort_by_key(|p| p.part_number);
        parts.dedup_by_key(|p| p.part_number);
        parts
    }
}

/// Directory-backed checkpoint persistence.
#[derive(Debug, Clone)]
pub struct CheckpointStore {
    dir: PathBuf,
}

impl CheckpointStore {
    /// Creates a store rooted at `dir`. The directory is created lazily on save.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Deterministic checkpoint location for a (source file, destination) pair.
    pub fn location(&self, source_path: &Path, destination: &str) -> PathBuf {
        let mut hasher = Sha256::new();
        hasher.update(source_path.to_string_lossy().as_bytes());
        // Separator keeps ("ab", "c") and ("a", "bc") apart.
        hasher.update([0u8]);
        hasher.update(destination.as_bytes());
        let name = hex::encode(hasher.finalize());
        self.dir.join(format!("{name}.json"))
    }

    /// Loads a checkpoint, treating any failure as "no checkpoint".
    pub fn load(&self, path: &Path) -> Option<Checkpoint> {
        let data = match std::fs::read(path) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to read checkpoint");
                return None;
            }
        };

        match serde_json::from_slice::<Checkpoint>(&data) {
            Ok(mut checkpoint) => {
                // Hand-edited files may list parts out of order.
                checkpoint.parts.sort_by_key(|p| p.part_number);
                checkpoint.parts.dedup_by_key(|p| p.part_number);
                debug!(
                    path = %path.display(),
                    upload_id = %checkpoint.upload_id,
                    parts = checkpoint.parts.len(),
                    "loaded checkpoint"
                );
                Some(checkpoint)
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "ignoring corrupt checkpoint");
                None
            }
        }
    }

    /// Writes a checkpoint via a temp file and rename so a crash mid-write
    /// leaves the previous version intact.
    pub fn save(&self, checkpoint: &Checkpoint, path: &Path) -> Result<(), TransferError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let json = serde_json::to_vec_pretty(checkpoint)?;
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, path)?;

        debug!(
            path = %path.display(),
            parts = checkpoint.parts.len(),
            "persisted checkpoint"
        );
        Ok(())
    }

    /// Deletes a checkpoint. A missing file is not an error.
    pub fn remove(&self, path: &Path) {
        match std::fs::remove_file(path) {
            Ok(()) => debug!(path = %path.display(), "removed checkpoint"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(path = %path.display(), error = %e, "failed to remove checkpoint"),
        }
    }
}
