//! Shared test fixtures: an in-memory transport whose outbound side is
//! captured by the test and whose inbound side is scripted by it.

use serde_json::Value;
use std::sync::atomic::{ AtomicBool, Ordering };
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{ mpsc, Mutex };

use async_trait::async_trait;

use crate::errors::Error;
use crate::protocol::{
    JsonRpcMessage,
    JsonRpcNotification,
    JsonRpcRequest,
    JsonRpcResponse,
    RequestId,
};
use crate::session::Session;
use crate::transport::Transport;

/// Install the test logging backend once; later calls are no-ops.
/// Filtered through `RUST_LOG` so noisy runs stay opt-in.
pub(crate) fn init_tracing() {
    let _ = tracing_subscriber
        ::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// In-memory transport: outbound messages are captured for the test,
/// inbound messages are injected by it.
pub(crate) struct MockTransport {
    inbound: Mutex<mpsc::UnboundedReceiver<JsonRpcMessage>>,
    outbound_tx: mpsc::UnboundedSender<JsonRpcMessage>,
    connected: AtomicBool,
}

/// The test's ends of a [`MockTransport`]. Dropping it closes the
/// inbound side, which the session observes as end-of-stream.
pub(crate) struct Harness {
    pub(crate) inbound_tx: mpsc::UnboundedSender<JsonRpcMessage>,
    pub(crate) outbound: mpsc::UnboundedReceiver<JsonRpcMessage>,
}

impl Harness {
    pub(crate) fn push(&self, message: JsonRpcMessage) {
        self.inbound_tx.send(message).expect("inbound channel open");
    }

    pub(crate) async fn sent(&mut self) -> JsonRpcMessage {
        tokio::time
            ::timeout(Duration::from_secs(2), self.outbound.recv()).await
            .expect("timed out waiting for outbound message")
            .expect("outbound channel open")
    }

    pub(crate) async fn sent_request(&mut self) -> JsonRpcRequest {
        match self.sent().await {
            JsonRpcMessage::Request(request) => request,
            other => panic!("expected outbound request, got {other}"),
        }
    }
}

pub(crate) fn mock_transport() -> (Arc<MockTransport>, Harness) {
    init_tracing();
    let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
    let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
    let transport = Arc::new(MockTransport {
        inbound: Mutex::new(inbound_rx),
        outbound_tx,
        connected: AtomicBool::new(false),
    });
    let harness = Harness {
        inbound_tx,
        outbound: outbound_rx,
    };
    (transport, harness)
}

#[async_trait]
impl Transport for MockTransport {
    async fn start(&self) -> Result<(), Error> {
        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn send(&self, message: &JsonRpcMessage) -> Result<(), Error> {
        if !self.is_connected() {
            return Err(Error::not_connected());
        }
        self.outbound_tx.send(message.clone()).map_err(|_| Error::TransportClosed)
    }

    async fn receive(&self) -> Option<JsonRpcMessage> {
        self.inbound.lock().await.recv().await
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn close(&self) -> Result<(), Error> {
        self.connected.store(false, Ordering::SeqCst);
        self.inbound.lock().await.close();
        Ok(())
    }
}

/// A session running over a fresh mock transport.
pub(crate) async fn started_session() -> (Arc<Session>, Harness) {
    let (transport, harness) = mock_transport();
    let session = Arc::new(Session::new(transport));
    session.start().await.expect("session start");
    (session, harness)
}

pub(crate) fn response(id: i64, result: Value) -> JsonRpcMessage {
    JsonRpcMessage::Response(JsonRpcResponse::new(RequestId::Number(id), result))
}

pub(crate) fn notification(method: &str, params: Value) -> JsonRpcMessage {
    JsonRpcMessage::Notification(JsonRpcNotification::new(method, Some(params)))
}
