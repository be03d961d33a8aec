//! Resumable multipart upload pipeline.
//!
//! This crate implements the **upload logic** on top of an abstract
//! [`ObjectStore`]. It has no transport dependencies: callers provide a
//! store implementation (see `ossup-local-store`) and a progress sink.
//!
//! # Pipeline
//!
//! 1. **Validate**: the source is an existing regular file
//! 2. **Simple upload**: files below the threshold go up in one put
//! 3. **Plan**: fingerprint the file, resume or start a multipart session
//! 4. **Upload**: send missing parts, checkpointing after each one
//! 5. **Finalize**: complete the session and drop the checkpoint
//!
//! The whole pipeline is retried with backoff by [`Uploader`]; single
//! parts are retried by a smaller per-part [`RetryPolicy`].

pub mod error;
pub mod key;
pub mod retry;
pub mod session;
pub mod store;
pub mod types;
pub mod uploader;

#[cfg(test)]
mod mock;

// Re-export primary types for convenience.
pub use error::UploadError;
pub use key::{destination, detect_content_type, object_key};
pub use retry::{RetryError, RetryPolicy, Retryable};
pub use session::UploadAttempt;
pub use store::{ObjectStore, PutResult, StoreError, StoreFuture};
pub use types::{
    AttemptOutcome, ResumeInfo, UploadOptions, UploadOutput, UploadRequest, UploadState,
    UploadTarget,
};
pub use uploader::Uploader;
