//! Object store boundary.
//!
//! `ObjectStore` is implemented by storage backends. Using a trait keeps
//! the upload pipeline decoupled from transport and testable with mocks.

use std::future::Future;
use std::pin::Pin;

use ossup_transfer::CompletedPart;

/// Boxed future returned by [`ObjectStore`] methods.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + Send + 'a>>;

/// Errors reported by a storage backend.
///
/// `InvalidArgument` is permanent. `NoSuchUpload` is not retried in place;
/// the pipeline restarts with a fresh session instead.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("service error {code}: {message}")]
    Service { code: String, message: String },

    /// The request can never succeed as sent (bad key, unknown part).
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The multipart session is unknown to the store (expired or aborted).
    #[error("no such multipart upload: {0}")]
    NoSuchUpload(String),
}

/// Where a finished object ended up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PutResult {
    pub url: String,
}

/// Abstract remote object store.
pub trait ObjectStore: Send + Sync {
    /// Uploads a whole object in one request.
    fn put_object<'a>(
        &'a self,
        key: &'a str,
        body: Vec<u8>,
        content_type: &'a str,
    ) -> StoreFuture<'a, PutResult>;

    /// Starts a multipart session and returns its upload id.
    fn initiate_multipart<'a>(
        &'a self,
        key: &'a str,
        content_type: &'a str,
    ) -> StoreFuture<'a, String>;

    /// Uploads one part and returns its etag.
    fn upload_part<'a>(
        &'a self,
        key: &'a str,
        upload_id: &'a str,
        part_number: u32,
        body: Vec<u8>,
    ) -> StoreFuture<'a, String>;

    /// Assembles the object from `parts`, which are sorted by part number.
    fn complete_multipart<'a>(
        &'a self,
        key: &'a str,
        upload_id: &'a str,
        parts: &'a [CompletedPart],
    ) -> StoreFuture<'a, PutResult>;

    /// Discards a multipart session and its uploaded parts.
    fn abort_multipart<'a>(&'a self, key: &'a str, upload_id: &'a str) -> StoreFuture<'a, ()>;
}
