//! One attempt of the upload pipeline, as an explicit state machine.
//!
//! Each state is a method that consumes the data it needs and returns the
//! next [`Step`]. Errors end the attempt in [`UploadState::Failed`]; the
//! caller decides whether to run another attempt.

use std::path::{Path, PathBuf};

use ossup_transfer::{
    Checkpoint, CheckpointStore, ChunkRange, ProgressReporter, UploadSession,
    calculate_file_checksum, is_reusable, plan, read_range, validate_object_key,
};
use tracing::{debug, info, warn};

use crate::error::UploadError;
use crate::store::ObjectStore;
use crate::types::{AttemptOutcome, ResumeInfo, UploadState, UploadTarget};

/// Metadata captured while validating the source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceFile {
    pub size: u64,
}

/// A multipart session in flight.
#[derive(Debug, Clone)]
pub struct MultipartSession {
    pub session: UploadSession,
    pub checkpoint: Checkpoint,
    /// Checkpoint file; `None` when the upload is not resumable.
    pub location: Option<PathBuf>,
    pub chunks: Vec<ChunkRange>,
    pub resumed: bool,
    pub resumed_parts: usize,
}

impl MultipartSession {
    pub fn upload_id(&self) -> &str {
        &self.checkpoint.upload_id
    }

    /// Key the remote session was initiated under.
    pub fn object_key(&self) -> &str {
        &self.session.object_key
    }

    pub fn total_parts(&self) -> usize {
        self.chunks.len()
    }
}

/// Transition result: the state to run next and the data it needs.
#[derive(Debug)]
pub enum Step {
    Validate,
    Simple(SourceFile),
    Plan(SourceFile),
    Upload(MultipartSession),
    Finalize(MultipartSession),
    Done(AttemptOutcome),
}

impl Step {
    pub fn state(&self) -> UploadState {
        match self {
            Step::Validate => UploadState::Validating,
            Step::Simple(_) => UploadState::SimpleUpload,
            Step::Plan(_) => UploadState::MultipartPlanning,
            Step::Upload(_) => UploadState::MultipartUploading,
            Step::Finalize(_) => UploadState::Finalizing,
            Step::Done(_) => UploadState::Done,
        }
    }
}

/// Runs one validate → finalize pass for an [`UploadTarget`].
pub struct UploadAttempt<'a> {
    store: &'a dyn ObjectStore,
    checkpoints: Option<&'a CheckpointStore>,
    target: &'a UploadTarget,
    progress: &'a ProgressReporter<'a>,
    attempt: u32,
    state: UploadState,
}

impl<'a> UploadAttempt<'a> {
    /// `checkpoints` is `None` for non-resumable uploads. The reporter is
    /// shared across attempts so progress never moves backwards.
    pub fn new(
        store: &'a dyn ObjectStore,
        checkpoints: Option<&'a CheckpointStore>,
        target: &'a UploadTarget,
        progress: &'a ProgressReporter<'a>,
        attempt: u32,
    ) -> Self {
        Self {
            store,
            checkpoints,
            target,
            progress,
            attempt,
            state: UploadState::Validating,
        }
    }

    pub fn state(&self) -> UploadState {
        self.state
    }

    /// Drives the state machine to `Done` or the first error. Afterwards
    /// [`state`](Self::state) reports `Done` or `Failed`.
    pub async fn run(&mut self) -> Result<AttemptOutcome, UploadError> {
        let mut step = Step::Validate;
        loop {
            self.state = step.state();
            debug!(
                key = %self.target.object_key,
                attempt = self.attempt,
                state = ?self.state,
                "entering state"
            );

            let next = match step {
                Step::Validate => self.validate().await,
                Step::Simple(source) => self.simple_upload(source).await,
                Step::Plan(source) => self.plan_multipart(source).await,
                Step::Upload(mp) => self.upload_parts(mp).await,
                Step::Finalize(mp) => self.finalize(mp).await,
                Step::Done(outcome) => return Ok(outcome),
            };

            match next {
                Ok(next) => step = next,
                Err(e) => {
                    debug!(
                        key = %self.target.object_key,
                        attempt = self.attempt,
                        state = ?self.state,
                        error = %e,
                        "attempt failed"
                    );
                    self.state = UploadState::Failed;
                    return Err(e);
                }
            }
        }
    }

    /// Validating: required fields present, source is an existing regular file.
    pub async fn validate(&self) -> Result<Step, UploadError> {
        let path = &self.target.source_path;
        if path.as_os_str().is_empty() {
            return Err(UploadError::Validation("source path is required".into()));
        }
        if self.target.object_key.is_empty() {
            return Err(UploadError::Validation("object key is required".into()));
        }

        let metadata = match tokio::fs::metadata(path).await {
            Ok(m) => m,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(UploadError::NotFound(path.clone()));
            }
            Err(e) => return Err(UploadError::Transfer(e.into())),
        };
        if !metadata.is_file() {
            return Err(UploadError::NotAFile(path.clone()));
        }

        let source = SourceFile {
            size: metadata.len(),
        };
        if source.size < self.target.options.multipart_threshold {
            Ok(Step::Simple(source))
        } else {
            Ok(Step::Plan(source))
        }
    }

    /// SimpleUpload: one put, progress 0 then 100.
    pub async fn simple_upload(&self, source: SourceFile) -> Result<Step, UploadError> {
        self.progress.report(0);

        let target = self.target;
        let result = target
            .options
            .part_retry
            .run("put object", |_| async move {
                let body = tokio::fs::read(&target.source_path)
                    .await
                    .map_err(ossup_transfer::TransferError::from)?;
                if body.len() as u64 != source.size {
                    return Err(UploadError::FileChanged(format!(
                        "expected {} bytes, read {}",
                        source.size,
                        body.len()
                    )));
                }
                Ok::<_, UploadError>(
                    self.store
                        .put_object(&target.object_key, body, &target.content_type)
                        .await?,
                )
            })
            .await?;

        self.progress.report(100);
        info!(key = %target.object_key, size = source.size, "simple upload complete");

        Ok(Step::Done(AttemptOutcome {
            url: result.url,
            object_key: target.object_key.clone(),
            size: source.size,
            progress: 100,
            resume: target.options.resumable.then_some(ResumeInfo {
                resumed: false,
                resumed_parts: 0,
                total_parts: 1,
            }),
        }))
    }

    /// MultipartPlanning: fingerprint, then resume a matching checkpoint or
    /// start a fresh remote session (persisted before any part is sent).
    ///
    /// Checkpoints are looked up by destination, so a resumed session keeps
    /// the object key it was started with even if this run minted another.
    pub async fn plan_multipart(&self, source: SourceFile) -> Result<Step, UploadError> {
        let target = self.target;
        let path = target.source_path.clone();
        let fingerprint =
            tokio::task::spawn_blocking(move || calculate_file_checksum(&path)).await??;

        let size_now = tokio::fs::metadata(&target.source_path)
            .await
            .map_err(ossup_transfer::TransferError::from)?
            .len();
        if size_now != source.size {
            return Err(UploadError::FileChanged(format!(
                "size went from {} to {size_now} while fingerprinting",
                source.size
            )));
        }

        let mut session = UploadSession {
            source_path: target.source_path.clone(),
            object_key: target.object_key.clone(),
            destination: target.destination.clone(),
            file_size: source.size,
            chunk_size: target.options.chunk_size,
            fingerprint,
        };
        let chunks = plan(session.file_size, session.chunk_size)?;

        let location = self
            .checkpoints
            .map(|store| store.location(&session.source_path, &session.destination));

        if let Some(checkpoint) = self.load_checkpoint(location.as_deref()).await {
            if self.can_resume(&checkpoint, &session) {
                let resumed_parts = checkpoint.parts.len();
                if checkpoint.object_key != session.object_key {
                    debug!(
                        requested = %session.object_key,
                        adopted = %checkpoint.object_key,
                        "resuming under the session's original key"
                    );
                    session.object_key = checkpoint.object_key.clone();
                }
                info!(
                    key = %session.object_key,
                    upload_id = %checkpoint.upload_id,
                    completed = resumed_parts,
                    total = chunks.len(),
                    "resuming multipart upload from checkpoint"
                );
                return Ok(Step::Upload(MultipartSession {
                    session,
                    checkpoint,
                    location,
                    chunks,
                    resumed: true,
                    resumed_parts,
                }));
            }
            self.discard_stale(&checkpoint, location.as_deref()).await;
        }

        let key = session.object_key.as_str();
        let upload_id = target
            .options
            .part_retry
            .run("initiate multipart", |_| async move {
                Ok::<_, UploadError>(
                    self.store
                        .initiate_multipart(key, &target.content_type)
                        .await?,
                )
            })
            .await?;

        let checkpoint = Checkpoint::new(&session, upload_id);
        self.save_checkpoint(&checkpoint, location.as_deref())
            .await?;
        info!(
            key = %session.object_key,
            upload_id = %checkpoint.upload_id,
            parts = session.part_count(),
            chunk_size = session.chunk_size,
            "started multipart upload"
        );

        Ok(Step::Upload(MultipartSession {
            session,
            checkpoint,
            location,
            chunks,
            resumed: false,
            resumed_parts: 0,
        }))
    }

    /// A saved checkpoint is resumable when its identity matches and its key
    /// is usable. A fixed-name request only adopts a session under that name.
    fn can_resume(&self, checkpoint: &Checkpoint, session: &UploadSession) -> bool {
        if !is_reusable(&checkpoint.identity(), &session.identity()) {
            return false;
        }
        if validate_object_key(&checkpoint.object_key).is_err() {
            return false;
        }
        let fixed_name = self.target.object_key == self.target.destination;
        !fixed_name || checkpoint.object_key == self.target.object_key
    }

    /// MultipartUploading: send every part not yet in the checkpoint, in
    /// ascending order, persisting after each one.
    pub async fn upload_parts(&self, mut mp: MultipartSession) -> Result<Step, UploadError> {
        let total = mp.total_parts() as u64;
        self.progress.report(0);
        self.progress
            .report_parts(mp.checkpoint.parts.len() as u64, total);

        for chunk in &mp.chunks {
            if mp.checkpoint.has_part(chunk.part_number) {
                debug!(part = chunk.part_number, "part already uploaded, skipping");
                continue;
            }

            let etag = match self.upload_chunk(&mp, *chunk).await {
                Ok(etag) => etag,
                Err(e) => return Err(self.fail_multipart(&mp, e).await),
            };

            mp.checkpoint.record_part(chunk.part_number, etag);
            if let Err(e) = self
                .save_checkpoint(&mp.checkpoint, mp.location.as_deref())
                .await
            {
                return Err(self.fail_multipart(&mp, e).await);
            }

            debug!(
                part = chunk.part_number,
                completed = mp.checkpoint.parts.len(),
                total,
                "part uploaded"
            );
            self.progress
                .report_parts(mp.checkpoint.parts.len() as u64, total);
        }

        Ok(Step::Finalize(mp))
    }

    /// Reads and uploads one part under the per-part retry policy.
    async fn upload_chunk(
        &self,
        mp: &MultipartSession,
        chunk: ChunkRange,
    ) -> Result<String, UploadError> {
        let target = self.target;
        let key = mp.object_key();
        let upload_id = mp.upload_id();
        debug!(
            part = chunk.part_number,
            start = chunk.start,
            end = chunk.end(),
            "uploading part"
        );
        let etag = target
            .options
            .part_retry
            .run("upload part", |_| async move {
                let path = target.source_path.clone();
                let data =
                    tokio::task::spawn_blocking(move || read_range(&path, chunk.start, chunk.length))
                        .await??;
                Ok::<_, UploadError>(
                    self.store
                        .upload_part(key, upload_id, chunk.part_number, data)
                        .await?,
                )
            })
            .await?;
        Ok(etag)
    }

    /// Finalizing: complete with sorted parts, then drop the checkpoint.
    pub async fn finalize(&self, mp: MultipartSession) -> Result<Step, UploadError> {
        let target = self.target;

        let size_now = match tokio::fs::metadata(&target.source_path).await {
            Ok(m) => m.len(),
            Err(e) => {
                let err = UploadError::Transfer(e.into());
                return Err(self.fail_multipart(&mp, err).await);
            }
        };
        if size_now != mp.session.file_size {
            let err = UploadError::FileChanged(format!(
                "size went from {} to {size_now} before completion",
                mp.session.file_size
            ));
            return Err(self.fail_multipart(&mp, err).await);
        }

        let parts = mp.checkpoint.sorted_parts();
        let result = match self
            .store
            .complete_multipart(mp.object_key(), mp.upload_id(), &parts)
            .await
        {
            Ok(result) => result,
            Err(e) => return Err(self.fail_multipart(&mp, e.into()).await),
        };

        self.remove_checkpoint(mp.location.as_deref()).await;
        self.progress.report(100);
        info!(
            key = %mp.object_key(),
            upload_id = %mp.upload_id(),
            parts = parts.len(),
            resumed = mp.resumed,
            "multipart upload complete"
        );

        Ok(Step::Done(AttemptOutcome {
            url: result.url,
            object_key: mp.session.object_key.clone(),
            size: mp.session.file_size,
            progress: 100,
            resume: target.options.resumable.then_some(ResumeInfo {
                resumed: mp.resumed,
                resumed_parts: mp.resumed_parts,
                total_parts: mp.total_parts(),
            }),
        }))
    }

    /// Cleans up after a failed multipart step and hands the error back.
    ///
    /// A lost remote session invalidates the checkpoint and is reported as
    /// [`UploadError::SessionLost`] so the next attempt starts over.
    /// Non-resumable sessions are aborted so no parts linger server-side;
    /// resumable ones are left for the next attempt.
    async fn fail_multipart(&self, mp: &MultipartSession, err: UploadError) -> UploadError {
        if err.is_lost_session() {
            warn!(
                key = %mp.object_key(),
                upload_id = %mp.upload_id(),
                "remote session is gone, dropping checkpoint"
            );
            self.remove_checkpoint(mp.location.as_deref()).await;
            return UploadError::SessionLost {
                upload_id: mp.upload_id().to_string(),
                source: Box::new(err),
            };
        }

        if self.checkpoints.is_none() {
            if let Err(e) = self
                .store
                .abort_multipart(mp.object_key(), mp.upload_id())
                .await
            {
                warn!(upload_id = %mp.upload_id(), error = %e, "failed to abort multipart upload");
            }
        }
        err
    }

    /// Drops a checkpoint that no longer matches and aborts its session.
    async fn discard_stale(&self, checkpoint: &Checkpoint, location: Option<&Path>) {
        warn!(
            key = %checkpoint.object_key,
            upload_id = %checkpoint.upload_id,
            "checkpoint does not match current file, starting fresh session"
        );
        self.remove_checkpoint(location).await;
        if let Err(e) = self
            .store
            .abort_multipart(&checkpoint.object_key, &checkpoint.upload_id)
            .await
        {
            debug!(upload_id = %checkpoint.upload_id, error = %e, "stale session abort failed");
        }
    }

    // Checkpoint I/O is blocking and runs on the blocking pool.

    async fn load_checkpoint(&self, location: Option<&Path>) -> Option<Checkpoint> {
        let (Some(store), Some(loc)) = (self.checkpoints, location) else {
            return None;
        };
        let store = store.clone();
        let loc = loc.to_path_buf();
        match tokio::task::spawn_blocking(move || store.load(&loc)).await {
            Ok(checkpoint) => checkpoint,
            Err(e) => {
                warn!(error = %e, "checkpoint load task failed");
                None
            }
        }
    }

    async fn save_checkpoint(
        &self,
        checkpoint: &Checkpoint,
        location: Option<&Path>,
    ) -> Result<(), UploadError> {
        let (Some(store), Some(loc)) = (self.checkpoints, location) else {
            return Ok(());
        };
        let store = store.clone();
        let loc = loc.to_path_buf();
        let checkpoint = checkpoint.clone();
        tokio::task::spawn_blocking(move || store.save(&checkpoint, &loc))
            .await?
            .map_err(UploadError::Checkpoint)
    }

    async fn remove_checkpoint(&self, location: Option<&Path>) {
        let (Some(store), Some(loc)) = (self.checkpoints, location) else {
            return;
        };
        let store = store.clone();
        let loc = loc.to_path_buf();
        if let Err(e) = tokio::task::spawn_blocking(move || store.remove(&loc)).await {
            warn!(error = %e, "checkpoint remove task failed");
        }
    }
}
