//! Upload entry point.
//!
//! Resolves a request into an [`UploadTarget`] once, then runs the attempt
//! pipeline under the whole-operation retry policy. Each retry starts again
//! at validation and resumes from whatever the checkpoint recorded. A lost
//! remote session is the one case where the next attempt starts over.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use ossup_transfer::{
    CheckpointStore, MIN_CHUNK_SIZE, ProgressReporter, ProgressSink, TransferError,
    validate_object_key,
};
use tracing::{error, info, warn};

use crate::error::UploadError;
use crate::key::{destination, detect_content_type, object_key};
use crate::session::UploadAttempt;
use crate::store::ObjectStore;
use crate::types::{UploadOutput, UploadRequest, UploadTarget};

/// Uploads files to an [`ObjectStore`], checkpointing multipart progress.
pub struct Uploader {
    store: Arc<dyn ObjectStore>,
    checkpoints: CheckpointStore,
}

impl Uploader {
    pub fn new(store: Arc<dyn ObjectStore>, checkpoints: CheckpointStore) -> Self {
        Self { store, checkpoints }
    }

    pub fn checkpoints(&self) -> &CheckpointStore {
        &self.checkpoints
    }

    /// Resolves the absolute source path, object key, destination and
    /// content type.
    ///
    /// The key may embed `now`. Checkpoints are located by the destination
    /// instead, so a later run still finds the session an earlier run left.
    pub fn prepare(
        &self,
        request: &UploadRequest,
        now: DateTime<Utc>,
    ) -> Result<UploadTarget, UploadError> {
        if request.source_path.as_os_str().is_empty() {
            return Err(UploadError::Validation("source path is required".into()));
        }

        let source_path =
            std::path::absolute(&request.source_path).map_err(TransferError::from)?;
        let key = object_key(
            &source_path,
            request.prefix.as_deref(),
            request.keep_original_name,
            now,
        )?;
        validate_object_key(&key).map_err(|e| UploadError::Validation(e.to_string()))?;
        let destination = destination(&source_path, request.prefix.as_deref())?;

        let mut options = request.options.clone();
        if options.chunk_size < MIN_CHUNK_SIZE {
            warn!(
                requested = options.chunk_size,
                minimum = MIN_CHUNK_SIZE,
                "chunk size below minimum, raising it"
            );
            options.chunk_size = MIN_CHUNK_SIZE;
        }

        Ok(UploadTarget {
            content_type: detect_content_type(&source_path).to_string(),
            source_path,
            object_key: key,
            destination,
            options,
        })
    }

    /// Uploads one file, retrying the whole pipeline on transient failures.
    pub async fn upload(
        &self,
        request: &UploadRequest,
        progress: &dyn ProgressSink,
    ) -> Result<UploadOutput, UploadError> {
        let target = self.prepare(request, Utc::now())?;
        info!(
            file = %target.source_path.display(),
            key = %target.object_key,
            content_type = %target.content_type,
            resumable = target.options.resumable,
            max_attempts = target.options.operation_retry.max_attempts(),
            "starting upload"
        );

        let reporter = ProgressReporter::new(progress);
        let store = self.store.as_ref();
        let checkpoints = target.options.resumable.then_some(&self.checkpoints);
        let (target_ref, reporter_ref) = (&target, &reporter);

        let result = target
            .options
            .operation_retry
            .run("upload", move |attempt| async move {
                let mut pass =
                    UploadAttempt::new(store, checkpoints, target_ref, reporter_ref, attempt);
                pass.run().await
            })
            .await;

        match result {
            Ok(outcome) => {
                info!(
                    key = %outcome.object_key,
                    size = outcome.size,
                    url = %outcome.url,
                    "upload complete"
                );
                Ok(UploadOutput {
                    url: outcome.url,
                    origin_file_path: target.source_path.display().to_string(),
                    object_key: outcome.object_key,
                    size: outcome.size,
                    content_type: target.content_type,
                    uploaded_at: Utc::now(),
                    progress: outcome.progress,
                    resume: outcome.resume,
                })
            }
            Err(e) => {
                error!(
                    key = %target.object_key,
                    attempts = e.attempts,
                    error = %e.source,
                    "upload failed"
                );
                Err(e.into())
            }
        }
    }
}
