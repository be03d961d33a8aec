//! Full pipeline runs against the filesystem store.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use ossup_local_store::{LocalStore, STAGING_DIR};
use ossup_transfer::{CheckpointStore, CompletedPart, NoProgress};
use ossup_upload::{
    ObjectStore, PutResult, RetryPolicy, StoreError, StoreFuture, UploadError, UploadRequest,
    Uploader,
};

const MIB: u64 = 1024 * 1024;

/// Delegates to a [`LocalStore`] but refuses one part number until healed.
struct Interrupting {
    inner: LocalStore,
    refuse_part: Mutex<Option<u32>>,
    parts_sent: Mutex<Vec<u32>>,
}

impl Interrupting {
    fn new(inner: LocalStore, refuse_part: u32) -> Self {
        Self {
            inner,
            refuse_part: Mutex::new(Some(refuse_part)),
            parts_sent: Mutex::new(Vec::new()),
        }
    }

    fn heal(&self) {
        *self.refuse_part.lock().unwrap() = None;
    }

    fn take_parts_sent(&self) -> Vec<u32> {
        std::mem::take(&mut *self.parts_sent.lock().unwrap())
    }
}

impl ObjectStore for Interrupting {
    fn put_object<'a>(
        &'a self,
        key: &'a str,
        body: Vec<u8>,
        content_type: &'a str,
    ) -> StoreFuture<'a, PutResult> {
        self.inner.put_object(key, body, content_type)
    }

    fn initiate_multipart<'a>(
        &'a self,
        key: &'a str,
        content_type: &'a str,
    ) -> StoreFuture<'a, String> {
        self.inner.initiate_multipart(key, content_type)
    }

    fn upload_part<'a>(
        &'a self,
        key: &'a str,
        upload_id: &'a str,
        part_number: u32,
        body: Vec<u8>,
    ) -> StoreFuture<'a, String> {
        if *self.refuse_part.lock().unwrap() == Some(part_number) {
            return Box::pin(async { Err(StoreError::Transport("connection reset".into())) });
        }
        self.parts_sent.lock().unwrap().push(part_number);
        self.inner.upload_part(key, upload_id, part_number, body)
    }

    fn complete_multipart<'a>(
        &'a self,
        key: &'a str,
        upload_id: &'a str,
        parts: &'a [CompletedPart],
    ) -> StoreFuture<'a, PutResult> {
        self.inner.complete_multipart(key, upload_id, parts)
    }

    fn abort_multipart<'a>(&'a self, key: &'a str, upload_id: &'a str) -> StoreFuture<'a, ()> {
        self.inner.abort_multipart(key, upload_id)
    }
}

fn write_file(dir: &Path, name: &str, len: u64) -> PathBuf {
    let path = dir.join(name);
    let data: Vec<u8> = (0..len).map(|i| (i * 31 % 256) as u8).collect();
    std::fs::write(&path, data).unwrap();
    path
}

fn request(path: &Path) -> UploadRequest {
    let mut request = UploadRequest::new(path);
    request.keep_original_name = true;
    request.options.part_retry = RetryPolicy::no_retry();
    request.options.operation_retry = RetryPolicy::no_retry();
    request
}

#[tokio::test]
async fn small_file_is_a_single_put() {
    let tmp = tempfile::tempdir().unwrap();
    let path = write_file(tmp.path(), "photo.png", 500 * 1000);
    let bucket = LocalStore::new(tmp.path().join("bucket"));
    let uploader = Uploader::new(
        Arc::new(bucket.clone()),
        CheckpointStore::new(tmp.path().join("checkpoints")),
    );

    let seen = Mutex::new(Vec::new());
    let sink = |p: u8| seen.lock().unwrap().push(p);
    let mut req = request(&path);
    req.prefix = Some("images".into());
    let out = uploader.upload(&req, &sink).await.unwrap();

    assert_eq!(*seen.lock().unwrap(), vec![0, 100]);
    assert_eq!(out.object_key, "images/photo.png");
    assert_eq!(out.content_type, "image/png");
    let stored = bucket.root().join("images/photo.png");
    assert_eq!(std::fs::read(stored).unwrap(), std::fs::read(&path).unwrap());
    assert!(!bucket.root().join(STAGING_DIR).exists());
}

#[tokio::test]
async fn interrupted_upload_resumes_with_missing_part_only() {
    let tmp = tempfile::tempdir().unwrap();
    let path = write_file(tmp.path(), "archive.bin", 12 * MIB);
    let bucket = LocalStore::new(tmp.path().join("bucket"));
    let store = Arc::new(Interrupting::new(bucket.clone(), 3));
    let uploader = Uploader::new(
        store.clone(),
        CheckpointStore::new(tmp.path().join("checkpoints")),
    );

    let mut req = request(&path);
    req.options.chunk_size = 5 * MIB;

    let err = uploader.upload(&req, &NoProgress).await.unwrap_err();
    assert!(matches!(err.root_cause(), UploadError::Store(_)));
    assert_eq!(store.take_parts_sent(), vec![1, 2]);

    let loc = uploader.checkpoints().location(&path, "archive.bin");
    let saved = uploader.checkpoints().load(&loc).unwrap();
    assert_eq!(saved.parts.len(), 2);
    assert_eq!(saved.chunk_size, 5 * MIB);

    store.heal();
    let out = uploader.upload(&req, &NoProgress).await.unwrap();
    assert_eq!(store.take_parts_sent(), vec![3]);

    let resume = out.resume.unwrap();
    assert!(resume.resumed);
    assert_eq!(resume.resumed_parts, 2);
    assert_eq!(resume.total_parts, 3);
    assert_eq!(out.size, 12 * MIB);

    let stored = std::fs::read(bucket.root().join("archive.bin")).unwrap();
    assert_eq!(stored, std::fs::read(&path).unwrap());
    assert!(uploader.checkpoints().load(&loc).is_none());
}

#[tokio::test]
async fn timestamped_upload_resumes_on_a_later_run() {
    let tmp = tempfile::tempdir().unwrap();
    let path = write_file(tmp.path(), "archive.bin", 12 * MIB);
    let bucket = LocalStore::new(tmp.path().join("bucket"));
    let store = Arc::new(Interrupting::new(bucket.clone(), 3));
    let uploader = Uploader::new(
        store.clone(),
        CheckpointStore::new(tmp.path().join("checkpoints")),
    );

    // Default naming: every run mints `<unix-seconds>_archive.bin`.
    let mut req = UploadRequest::new(&path);
    req.options.chunk_size = 5 * MIB;
    req.options.part_retry = RetryPolicy::no_retry();
    req.options.operation_retry = RetryPolicy::no_retry();

    assert!(uploader.upload(&req, &NoProgress).await.is_err());
    assert_eq!(store.take_parts_sent(), vec![1, 2]);
    let loc = uploader.checkpoints().location(&path, "archive.bin");
    let first_key = uploader.checkpoints().load(&loc).unwrap().object_key;
    assert!(first_key.ends_with("_archive.bin"));

    // Make sure the second run would mint a different key.
    tokio::time::sleep(Duration::from_millis(1100)).await;
    store.heal();
    let out = uploader.upload(&req, &NoProgress).await.unwrap();

    assert_eq!(store.take_parts_sent(), vec![3]);
    assert_eq!(out.object_key, first_key);
    assert_eq!(out.resume.unwrap().resumed_parts, 2);
    assert_eq!(
        std::fs::read(bucket.root().join(&first_key)).unwrap(),
        std::fs::read(&path).unwrap()
    );
    assert!(uploader.checkpoints().load(&loc).is_none());

    let staged = std::fs::read_dir(bucket.root().join(STAGING_DIR))
        .map(|entries| entries.count())
        .unwrap_or(0);
    assert_eq!(staged, 0);
    let checkpoints_left = std::fs::read_dir(uploader.checkpoints().dir())
        .map(|entries| entries.count())
        .unwrap_or(0);
    assert_eq!(checkpoints_left, 0);
}

#[tokio::test]
async fn expired_session_restarts_without_part_retries() {
    let tmp = tempfile::tempdir().unwrap();
    let path = write_file(tmp.path(), "archive.bin", 12 * MIB);
    let bucket = LocalStore::new(tmp.path().join("bucket"));
    let store = Arc::new(Interrupting::new(bucket.clone(), 3));
    let uploader = Uploader::new(
        store.clone(),
        CheckpointStore::new(tmp.path().join("checkpoints")),
    );

    let mut req = request(&path);
    req.options.chunk_size = 5 * MIB;
    assert!(uploader.upload(&req, &NoProgress).await.is_err());
    assert_eq!(store.take_parts_sent(), vec![1, 2]);

    // The store forgets the session while the checkpoint survives.
    std::fs::remove_dir_all(bucket.root().join(STAGING_DIR)).unwrap();
    store.heal();
    req.options.part_retry = RetryPolicy::new(3, Duration::from_millis(1), Duration::from_millis(2));
    req.options.operation_retry =
        RetryPolicy::new(1, Duration::from_millis(1), Duration::from_millis(2));
    let out = uploader.upload(&req, &NoProgress).await.unwrap();

    assert_eq!(store.take_parts_sent(), vec![3, 1, 2, 3]);
    assert!(!out.resume.unwrap().resumed);
    assert_eq!(
        std::fs::read(bucket.root().join("archive.bin")).unwrap(),
        std::fs::read(&path).unwrap()
    );
}

#[tokio::test]
async fn garbage_checkpoint_is_ignored() {
    let tmp = tempfile::tempdir().unwrap();
    let path = write_file(tmp.path(), "data.bin", 3 * MIB);
    let bucket = LocalStore::new(tmp.path().join("bucket"));
    let checkpoints = CheckpointStore::new(tmp.path().join("checkpoints"));

    let loc = checkpoints.location(&path, "data.bin");
    std::fs::create_dir_all(checkpoints.dir()).unwrap();
    std::fs::write(&loc, b"{ not json").unwrap();

    let uploader = Uploader::new(Arc::new(bucket.clone()), checkpoints);
    let out = uploader.upload(&request(&path), &NoProgress).await.unwrap();

    assert!(!out.resume.unwrap().resumed);
    assert_eq!(
        std::fs::read(bucket.root().join("data.bin")).unwrap(),
        std::fs::read(&path).unwrap()
    );
    assert!(!loc.exists());
}

#[tokio::test]
async fn non_resumable_failure_leaves_no_staging() {
    let tmp = tempfile::tempdir().unwrap();
    let path = write_file(tmp.path(), "data.bin", 3 * MIB);
    let bucket = LocalStore::new(tmp.path().join("bucket"));
    let store = Arc::new(Interrupting::new(bucket.clone(), 2));
    let uploader = Uploader::new(
        store.clone(),
        CheckpointStore::new(tmp.path().join("checkpoints")),
    );

    let mut req = request(&path);
    req.options.resumable = false;
    assert!(uploader.upload(&req, &NoProgress).await.is_err());

    let staging = bucket.root().join(STAGING_DIR);
    let leftover = std::fs::read_dir(&staging)
        .map(|entries| entries.count())
        .unwrap_or(0);
    assert_eq!(leftover, 0);
    assert!(!uploader.checkpoints().dir().exists());
}
