//! Pending-request correlation table.
//!
//! Every outbound request parks an awaiter here until its response id
//! comes back, the caller cancels, or the transport closes. The table is
//! the exclusive owner of each entry; callers hold only the receiving
//! half of the completion channel.

use serde_json::Value;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Instant;
use tokio::sync::oneshot;
use tracing::debug;

use crate::errors::Error;
use crate::protocol::RequestId;

/// Completion payload: the raw `result` subtree, or the error that ended
/// the request.
pub(crate) type Completion = Result<Value, Error>;

struct PendingRequest {
    method: String,
    issued_at: Instant,
    tx: oneshot::Sender<Completion>,
}

/// Table of in-flight requests keyed by id.
///
/// The lock is held only for map mutation; the awaiter is signalled
/// after release.
pub(crate) struct PendingRequests {
    inner: Mutex<HashMap<RequestId, PendingRequest>>,
}

impl PendingRequests {
    pub(crate) fn new() -> Self {
        Self {
            inner: Mutex::new(HashMap::new()),
        }
    }

    /// Park an awaiter for `id` and return its completion handle.
    pub(crate) fn insert(&self, id: RequestId, method: &str) -> oneshot::Receiver<Completion> {
        let (tx, rx) = oneshot::channel();
        let entry = PendingRequest {
            method: method.to_string(),
            issued_at: Instant::now(),
            tx,
        };
        self.inner.lock().unwrap().insert(id, entry);
        rx
    }

    /// Complete the request with `id`, if still pending. Returns whether
    /// an awaiter was found.
    pub(crate) fn complete(&self, id: &RequestId, outcome: Completion) -> bool {
        let entry = self.inner.lock().unwrap().remove(id);
        match entry {
            Some(pending) => {
                debug!(
                    method = %pending.method,
                    elapsed_ms = pending.issued_at.elapsed().as_millis() as u64,
                    "request completed"
                );
                // A dropped receiver means the caller already gave up.
                let _ = pending.tx.send(outcome);
                true
            }
            None => false,
        }
    }

    /// Drop the entry for `id` without signalling. Returns whether it was
    /// still pending.
    pub(crate) fn remove(&self, id: &RequestId) -> bool {
        self.inner.lock().unwrap().remove(id).is_some()
    }

    /// Fail every pending request, draining the table.
    pub(crate) fn fail_all(&self, mut make_error: impl FnMut() -> Error) {
        let entries: Vec<_> = self.inner.lock().unwrap().drain().collect();
        for (id, pending) in entries {
            debug!(%id, method = %pending.method, "failing pending request");
            let _ = pending.tx.send(Err(make_error()));
        }
    }

    /// Number of requests currently awaiting a response.
    pub(crate) fn len(&self) -> usize {
        self.inner.lock().unwrap().len()
    }
}
