//! In-memory object store used by the pipeline tests.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use ossup_transfer::{CompletedPart, checksum_bytes};

use crate::store::{ObjectStore, PutResult, StoreError, StoreFuture};

/// A recorded store call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Call {
    Put { key: String, len: usize },
    Initiate { key: String },
    Part { key: String, upload_id: String, part_number: u32, len: usize },
    Complete { upload_id: String, parts: Vec<u32> },
    Abort { upload_id: String },
}

/// Mock store that records calls and fails on demand.
#[derive(Default)]
pub(crate) struct MockStore {
    calls: Mutex<Vec<Call>>,
    sessions: Mutex<HashSet<String>>,
    next_id: Mutex<u32>,
    /// part number -> remaining failures (`u32::MAX` = always).
    part_failures: Mutex<HashMap<u32, u32>>,
    complete_failures: Mutex<u32>,
    put_failures: Mutex<u32>,
}

impl MockStore {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn fail_part(&self, part_number: u32, times: u32) {
        self.part_failures.lock().unwrap().insert(part_number, times);
    }

    pub(crate) fn clear_failures(&self) {
        self.part_failures.lock().unwrap().clear();
        *self.complete_failures.lock().unwrap() = 0;
        *self.put_failures.lock().unwrap() = 0;
    }

    pub(crate) fn fail_complete(&self, times: u32) {
        *self.complete_failures.lock().unwrap() = times;
    }

    pub(crate) fn fail_put(&self, times: u32) {
        *self.put_failures.lock().unwrap() = times;
    }

    /// Forgets every multipart session, as if they expired server-side.
    pub(crate) fn expire_sessions(&self) {
        self.sessions.lock().unwrap().clear();
    }

    pub(crate) fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub(crate) fn reset_calls(&self) {
        self.calls.lock().unwrap().clear();
    }

    /// Part numbers uploaded, in call order (including failed attempts).
    pub(crate) fn part_calls(&self) -> Vec<u32> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Part { part_number, .. } => Some(part_number),
                _ => None,
            })
            .collect()
    }

    /// Keys that parts were uploaded under, deduplicated in call order.
    pub(crate) fn part_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = Vec::new();
        for call in self.calls() {
            if let Call::Part { key, .. } = call {
                if !keys.contains(&key) {
                    keys.push(key);
                }
            }
        }
        keys
    }

    pub(crate) fn count(&self, pred: impl Fn(&Call) -> bool) -> usize {
        self.calls().iter().filter(|c| pred(c)).count()
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }

    fn take_failure(counter: &mut u32) -> bool {
        if *counter == 0 {
            return false;
        }
        if *counter != u32::MAX {
            *counter -= 1;
        }
        true
    }
}

impl ObjectStore for MockStore {
    fn put_object<'a>(
        &'a self,
        key: &'a str,
        body: Vec<u8>,
        _content_type: &'a str,
    ) -> StoreFuture<'a, PutResult> {
        self.record(Call::Put {
            key: key.to_string(),
            len: body.len(),
        });
        Box::pin(async move {
            if Self::take_failure(&mut self.put_failures.lock().unwrap()) {
                return Err(StoreError::Transport("injected put failure".into()));
            }
            Ok(PutResult {
                url: format!("mock://bucket/{key}"),
            })
        })
    }

    fn initiate_multipart<'a>(
        &'a self,
        key: &'a str,
        _content_type: &'a str,
    ) -> StoreFuture<'a, String> {
        self.record(Call::Initiate {
            key: key.to_string(),
        });
        Box::pin(async move {
            let mut next = self.next_id.lock().unwrap();
            *next += 1;
            let id = format!("upload-{}", *next);
            self.sessions.lock().unwrap().insert(id.clone());
            Ok(id)
        })
    }

    fn upload_part<'a>(
        &'a self,
        key: &'a str,
        upload_id: &'a str,
        part_number: u32,
        body: Vec<u8>,
    ) -> StoreFuture<'a, String> {
        self.record(Call::Part {
            key: key.to_string(),
            upload_id: upload_id.to_string(),
            part_number,
            len: body.len(),
        });
        Box::pin(async move {
            if !self.sessions.lock().unwrap().contains(upload_id) {
                return Err(StoreError::NoSuchUpload(upload_id.to_string()));
            }
            {
                let mut failures = self.part_failures.lock().unwrap();
                if let Some(counter) = failures.get_mut(&part_number) {
                    if Self::take_failure(counter) {
                        return Err(StoreError::Transport(format!(
                            "injected failure on part {part_number}"
                        )));
                    }
                }
            }
            Ok(format!("etag-{part_number}-{}", &checksum_bytes(&body)[..8]))
        })
    }

    fn complete_multipart<'a>(
        &'a self,
        key: &'a str,
        upload_id: &'a str,
        parts: &'a [CompletedPart],
    ) -> StoreFuture<'a, PutResult> {
        self.record(Call::Complete {
            upload_id: upload_id.to_string(),
            parts: parts.iter().map(|p| p.part_number).collect(),
        });
        Box::pin(async move {
            if !self.sessions.lock().unwrap().contains(upload_id) {
                return Err(StoreError::NoSuchUpload(upload_id.to_string()));
            }
            if Self::take_failure(&mut self.complete_failures.lock().unwrap()) {
                return Err(StoreError::Service {
                    code: "InternalError".into(),
                    message: "injected complete failure".into(),
                });
            }
            self.sessions.lock().unwrap().remove(upload_id);
            Ok(PutResult {
                url: format!("mock://bucket/{key}"),
            })
        })
    }

    fn abort_multipart<'a>(&'a self, _key: &'a str, upload_id: &'a str) -> StoreFuture<'a, ()> {
        self.record(Call::Abort {
            upload_id: upload_id.to_string(),
        });
        Box::pin(async move {
            self.sessions.lock().unwrap().remove(upload_id);
            Ok(())
        })
    }
}
