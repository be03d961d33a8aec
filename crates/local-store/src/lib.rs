//! Filesystem-backed [`ObjectStore`].
//!
//! Objects live under a root directory at their key. Multipart sessions
//! are staged in `<root>/.multipart/<upload_id>/`: a `session.json`
//! manifest plus one `part-NNNNN` file per uploaded part. Completing a
//! session concatenates the parts into the object and removes the staging
//! directory; aborting just removes it.

use std::path::{Component, Path, PathBuf};

use chrono::{DateTime, Utc};
use ossup_transfer::{CompletedPart, checksum_bytes, validate_object_key};
use ossup_upload::{ObjectStore, PutResult, StoreError, StoreFuture};
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

/// Directory under the root that holds in-progress multipart sessions.
pub const STAGING_DIR: &str = ".multipart";

const MANIFEST: &str = "session.json";

/// Manifest written when a multipart session starts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StagedUpload {
    key: String,
    content_type: String,
    created_at: DateTime<Utc>,
}

/// Stores objects as plain files under `root`.
#[derive(Debug, Clone)]
pub struct LocalStore {
    root: PathBuf,
}

impl LocalStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolves `key` to a path under the root, rejecting traversal and the
    /// staging directory.
    pub fn object_path(&self, key: &str) -> Result<PathBuf, StoreError> {
        validate_object_key(key).map_err(|e| invalid_argument(e.to_string()))?;
        let first = Path::new(key).components().find_map(|c| match c {
            Component::Normal(name) => Some(name),
            _ => None,
        });
        if first.is_none() {
            return Err(invalid_argument(format!("key names no object: {key}")));
        }
        if first.is_some_and(|name| name == STAGING_DIR) {
            return Err(invalid_argument(format!("key is reserved: {key}")));
        }
        Ok(self.root.join(key))
    }

    fn staging_path(&self, upload_id: &str) -> Result<PathBuf, StoreError> {
        let valid = !upload_id.is_empty()
            && upload_id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-');
        if !valid {
            return Err(StoreError::NoSuchUpload(upload_id.to_string()));
        }
        Ok(self.root.join(STAGING_DIR).join(upload_id))
    }

    /// Loads the manifest of a live session, or `NoSuchUpload`.
    async fn open_session(&self, upload_id: &str) -> Result<(PathBuf, StagedUpload), StoreError> {
        let dir = self.staging_path(upload_id)?;
        let data = match tokio::fs::read(dir.join(MANIFEST)).await {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StoreError::NoSuchUpload(upload_id.to_string()));
            }
            Err(e) => return Err(e.into()),
        };
        let manifest = serde_json::from_slice(&data).map_err(|e| StoreError::Service {
            code: "CorruptSession".into(),
            message: e.to_string(),
        })?;
        Ok((dir, manifest))
    }

    fn url_for(path: &Path) -> String {
        format!("file://{}", path.display())
    }
}

fn invalid_argument(message: String) -> StoreError {
    StoreError::InvalidArgument(message)
}

fn part_file(part_number: u32) -> String {
    format!("part-{part_number:05}")
}

/// Writes `data` next to `path` and renames it into place.
async fn write_atomic(path: &Path, data: &[u8]) -> Result<(), StoreError> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let tmp = tmp_path(path);
    tokio::fs::write(&tmp, data).await?;
    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".partial");
    path.with_file_name(name)
}

impl ObjectStore for LocalStore {
    fn put_object<'a>(
        &'a self,
        key: &'a str,
        body: Vec<u8>,
        _content_type: &'a str,
    ) -> StoreFuture<'a, PutResult> {
        Box::pin(async move {
            let path = self.object_path(key)?;
            write_atomic(&path, &body).await?;
            debug!(key, bytes = body.len(), "stored object");
            Ok(PutResult {
                url: Self::url_for(&path),
            })
        })
    }

    fn initiate_multipart<'a>(
        &'a self,
        key: &'a str,
        content_type: &'a str,
    ) -> StoreFuture<'a, String> {
        Box::pin(async move {
            self.object_path(key)?;
            let upload_id = uuid::Uuid::new_v4().to_string();
            let dir = self.staging_path(&upload_id)?;
            tokio::fs::create_dir_all(&dir).await?;

            let manifest = StagedUpload {
                key: key.to_string(),
                content_type: content_type.to_string(),
                created_at: Utc::now(),
            };
            let json = serde_json::to_vec_pretty(&manifest).map_err(|e| StoreError::Service {
                code: "InternalError".into(),
                message: e.to_string(),
            })?;
            write_atomic(&dir.join(MANIFEST), &json).await?;

            debug!(key, upload_id = %upload_id, "initiated multipart session");
            Ok(upload_id)
        })
    }

    fn upload_part<'a>(
        &'a self,
        key: &'a str,
        upload_id: &'a str,
        part_number: u32,
        body: Vec<u8>,
    ) -> StoreFuture<'a, String> {
        Box::pin(async move {
            if part_number == 0 {
                return Err(invalid_argument("part numbers start at 1".into()));
            }
            let (dir, manifest) = self.open_session(upload_id).await?;
            if manifest.key != key {
                return Err(invalid_argument(format!(
                    "session {upload_id} belongs to {}",
                    manifest.key
                )));
            }

            write_atomic(&dir.join(part_file(part_number)), &body).await?;
            Ok(checksum_bytes(&body))
        })
    }

    fn complete_multipart<'a>(
        &'a self,
        key: &'a str,
        upload_id: &'a str,
        parts: &'a [CompletedPart],
    ) -> StoreFuture<'a, PutResult> {
        Box::pin(async move {
            let (dir, manifest) = self.open_session(upload_id).await?;
            if manifest.key != key {
                return Err(invalid_argument(format!(
                    "session {upload_id} belongs to {}",
                    manifest.key
                )));
            }
            if parts.windows(2).any(|w| w[0].part_number >= w[1].part_number) {
                return Err(StoreError::Service {
                    code: "InvalidPartOrder".into(),
                    message: "parts must be in strictly ascending order".into(),
                });
            }

            let path = self.object_path(key)?;
            if let Some(parent) = path.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            let tmp = tmp_path(&path);
            let mut out = tokio::fs::File::create(&tmp).await?;
            let mut size: u64 = 0;
            for part in parts {
                let data = match tokio::fs::read(dir.join(part_file(part.part_number))).await {
                    Ok(data) => data,
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                        drop(out);
                        let _ = tokio::fs::remove_file(&tmp).await;
                        return Err(StoreError::Service {
                            code: "InvalidPart".into(),
                            message: format!("part {} was never uploaded", part.part_number),
                        });
                    }
                    Err(e) => return Err(e.into()),
                };
                if checksum_bytes(&data) != part.etag {
                    drop(out);
                    let _ = tokio::fs::remove_file(&tmp).await;
                    return Err(StoreError::Service {
                        code: "InvalidPart".into(),
                        message: format!("etag mismatch for part {}", part.part_number),
                    });
                }
                out.write_all(&data).await?;
                size += data.len() as u64;
            }
            out.flush().await?;
            drop(out);
            tokio::fs::rename(&tmp, &path).await?;
            tokio::fs::remove_dir_all(&dir).await?;

            info!(key, upload_id, parts = parts.len(), size, "assembled multipart object");
            Ok(PutResult {
                url: Self::url_for(&path),
            })
        })
    }

    fn abort_multipart<'a>(&'a self, key: &'a str, upload_id: &'a str) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            let (dir, _) = self.open_session(upload_id).await?;
            tokio::fs::remove_dir_all(&dir).await?;
            debug!(key, upload_id, "aborted multipart session");
            Ok(())
        })
    }
}
