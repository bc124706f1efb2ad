//! Progress routing.
//!
//! Requests that opt into progress reporting register their token here;
//! inbound `notifications/progress` are forwarded to the matching sink.
//! A token routes only to its originating awaiter, and only while that
//! awaiter is pending.

use std::collections::HashMap;
use std::sync::Mutex;
use tokio::sync::mpsc;
use tracing::debug;

use crate::protocol::{ ProgressParams, ProgressToken };

/// Receives progress events for one request, in wire-arrival order.
///
/// Delivery is non-blocking: if the sink's buffer is full the event is
/// dropped, so size the channel for the expected update rate.
pub type ProgressSink = mpsc::Sender<ProgressParams>;

/// Table mapping live progress tokens to their sinks.
pub(crate) struct ProgressRouter {
    inner: Mutex<HashMap<ProgressToken, ProgressSink>>,
}

impl ProgressRouter {
    pub(crate) fn new() -> Self {
        Self {
            inner: Mutex::new(HashMap::new()),
        }
    }

    pub(crate) fn register(&self, token: ProgressToken, sink: ProgressSink) {
        self.inner.lock().unwrap().insert(token, sink);
    }

    pub(crate) fn unregister(&self, token: &ProgressToken) {
        self.inner.lock().unwrap().remove(token);
    }

    /// Route one progress notification. Returns false when no sink is
    /// registered for the token (the event is then dropped silently).
    pub(crate) fn route(&self, params: ProgressParams) -> bool {
        let sink = self.inner.lock().unwrap().get(&params.progress_token).cloned();
        match sink {
            Some(sink) => {
                if let Err(e) = sink.try_send(params) {
                    debug!("progress sink not keeping up, dropping event: {e}");
                }
                true
            }
            None => false,
        }
    }
}
