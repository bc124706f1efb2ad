//! Transport module for MCP communication.
//!
//! A transport is a framed bidirectional message channel. Two concrete
//! implementations live here: a stdio transport that supervises a
//! subprocess, and an SSE transport that multiplexes outbound messages
//! onto an HTTP response stream. Both present the same uniform channel
//! to the session.

pub mod sse;
pub mod stdio;

#[cfg(test)]
mod tests;

use async_trait::async_trait;
use tokio::sync::watch;

use crate::errors::Error;
use crate::protocol::JsonRpcMessage;

pub use sse::{ SseServerOptions, SseServerTransport };
pub use stdio::{ StdioConfig, StdioTransport };

/// Lifecycle of a transport. State only moves forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportState {
    /// Constructed but not yet running.
    Unstarted,
    /// Running; sends and receives flow.
    Connected,
    /// Dispose initiated; outbound draining.
    Closing,
    /// Fully shut down. Receiving yields end-of-stream.
    Closed,
}

/// Transport trait for different communication channels.
///
/// `receive` is single-consumer: the session owns the read side and runs
/// one dispatch loop over it.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Start the transport. Sending before this fails with
    /// [`Error::NotConnected`].
    async fn start(&self) -> Result<(), Error>;

    /// Enqueue one outbound message. Call order is preserved on the wire.
    async fn send(&self, message: &JsonRpcMessage) -> Result<(), Error>;

    /// Receive the next inbound message; `None` signals end-of-stream.
    async fn receive(&self) -> Option<JsonRpcMessage>;

    /// Whether the transport is currently connected.
    fn is_connected(&self) -> bool;

    /// Initiate shutdown, draining the outbound side. Idempotent.
    async fn close(&self) -> Result<(), Error>;
}

/// Shared observable holding a transport's lifecycle state.
///
/// Backed by a `watch` channel so waiters can observe transitions without
/// holding locks.
#[derive(Clone)]
pub(crate) struct StateCell {
    tx: watch::Sender<TransportState>,
}

impl StateCell {
    pub(crate) fn new() -> Self {
        let (tx, _) = watch::channel(TransportState::Unstarted);
        Self { tx }
    }

    pub(crate) fn get(&self) -> TransportState {
        *self.tx.borrow()
    }

    /// Transition to `state`, forward-only. Out-of-order updates (e.g. a
    /// late `Closing` racing a `Closed`) are ignored.
    pub(crate) fn set(&self, state: TransportState) {
        self.tx.send_if_modified(|current| {
            let forward = rank(state) > rank(*current);
            if forward {
                *current = state;
            }
            forward
        });
    }

    pub(crate) fn is_connected(&self) -> bool {
        self.get() == TransportState::Connected
    }

    pub(crate) fn subscribe(&self) -> watch::Receiver<TransportState> {
        self.tx.subscribe()
    }
}

fn rank(state: TransportState) -> u8 {
    match state {
        TransportState::Unstarted => 0,
        TransportState::Connected => 1,
        TransportState::Closing => 2,
        TransportState::Closed => 3,
    }
}
