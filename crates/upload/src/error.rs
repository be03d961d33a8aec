//! Upload error types.

use std::path::PathBuf;

use ossup_transfer::TransferError;

use crate::retry::{RetryError, Retryable};
use crate::store::StoreError;

/// Errors produced during an upload.
#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("invalid request: {0}")]
    Validation(String),

    #[error("source file not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("source is not a regular file: {}", .0.display())]
    NotAFile(PathBuf),

    #[error("source file changed during upload: {0}")]
    FileChanged(String),

    #[error("transfer error: {0}")]
    Transfer(#[from] TransferError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("checkpoint error: {0}")]
    Checkpoint(#[source] TransferError),

    #[error("task join error: {0}")]
    Join(#[from] tokio::task::JoinError),

    /// The remote session vanished; its checkpoint has been dropped and
    /// the next attempt starts a fresh session.
    #[error("multipart session {upload_id} was lost: {source}")]
    SessionLost {
        upload_id: String,
        #[source]
        source: Box<UploadError>,
    },

    #[error("{operation} failed after {attempts} attempt(s): {source}")]
    Retry {
        operation: String,
        attempts: u32,
        #[source]
        source: Box<UploadError>,
    },
}

impl UploadError {
    /// Innermost error beneath any retry or session annotations.
    pub fn root_cause(&self) -> &UploadError {
        match self {
            UploadError::Retry { source, .. } | UploadError::SessionLost { source, .. } => {
                source.root_cause()
            }
            other => other,
        }
    }

    /// Returns `true` if the remote store no longer knows the session.
    pub fn is_lost_session(&self) -> bool {
        matches!(
            self.root_cause(),
            UploadError::Store(StoreError::NoSuchUpload(_))
        )
    }
}

impl Retryable for UploadError {
    fn is_retryable(&self) -> bool {
        match self {
            UploadError::Validation(_)
            | UploadError::NotFound(_)
            | UploadError::NotAFile(_)
            | UploadError::Checkpoint(_)
            | UploadError::Join(_) => false,
            UploadError::Store(StoreError::NoSuchUpload(_) | StoreError::InvalidArgument(_)) => {
                false
            }
            UploadError::FileChanged(_) | UploadError::Store(_) | UploadError::SessionLost { .. } => {
                true
            }
            UploadError::Transfer(e) => matches!(
                e,
                TransferError::Io(_) | TransferError::FileShrank { .. }
            ),
            UploadError::Retry { source, .. } => source.is_retryable(),
        }
    }
}

impl From<RetryError<UploadError>> for UploadError {
    fn from(e: RetryError<UploadError>) -> Self {
        UploadError::Retry {
            operation: e.operation,
            attempts: e.attempts,
            source: Box::new(e.source),
        }
    }
}
