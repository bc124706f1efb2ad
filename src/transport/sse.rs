//! SSE server transport.
//!
//! Multiplexes asynchronous server-to-client messages onto an HTTP
//! response stream as Server-Sent Events. The first event on the stream
//! is always `event: endpoint`, advertising the URL the peer should POST
//! client-to-server JSON-RPC messages to; every subsequent event is
//! `event: message` carrying one JSON-RPC object. Inbound messages
//! arrive out-of-band through [`SseServerTransport::on_message_received`],
//! delivered by whatever HTTP framework hosts the endpoint (a ready-made
//! axum router lives at the bottom of this module).

use std::collections::HashMap;
use std::sync::{ Arc, Mutex as StdMutex };
use tokio::io::{ AsyncWrite, AsyncWriteExt };
use tokio::sync::{ mpsc, Mutex };
use tokio::task::JoinHandle;
use tracing::{ debug, error, warn };

use async_trait::async_trait;
use axum::body::Body;
use axum::extract::{ Query, State };
use axum::http::{ header, StatusCode };
use axum::response::{ IntoResponse, Response };
use axum::routing::{ get, post };
use axum::Router;
use serde::Deserialize;
use tokio_util::io::ReaderStream;
use tower_http::cors::{ Any, CorsLayer };

use crate::errors::Error;
use crate::protocol::{ jsonrpc, JsonRpcMessage };
use crate::transport::{ StateCell, Transport, TransportState };

/// Configuration options for the SSE server transport.
#[derive(Debug, Clone)]
pub struct SseServerOptions {
    /// URL advertised in the initial `endpoint` event, where the peer
    /// POSTs client-to-server messages.
    pub message_endpoint: String,
    /// Capacity of the outbound event queue. The default of 1 makes a
    /// slow client exert backpressure on producers immediately.
    pub outbound_capacity: usize,
    /// Capacity of the inbound message queue.
    pub incoming_capacity: usize,
}

impl Default for SseServerOptions {
    fn default() -> Self {
        Self {
            message_endpoint: "/message".to_string(),
            outbound_capacity: 1,
            incoming_capacity: 64,
        }
    }
}

type ResponseStream = Box<dyn AsyncWrite + Send + Unpin>;

/// SSE server transport over one HTTP response stream.
pub struct SseServerTransport {
    options: SseServerOptions,
    state: StateCell,
    /// The response stream, consumed by the write loop on start.
    stream: StdMutex<Option<ResponseStream>>,
    outbound_tx: StdMutex<Option<mpsc::Sender<JsonRpcMessage>>>,
    /// Shared with the write loop so a dead stream also ends the inbound side.
    incoming_tx: Arc<StdMutex<Option<mpsc::Sender<JsonRpcMessage>>>>,
    incoming: Mutex<mpsc::Receiver<JsonRpcMessage>>,
    write_task: Mutex<Option<JoinHandle<()>>>,
}

impl SseServerTransport {
    /// Create a transport writing events to `stream`.
    pub fn new(stream: impl AsyncWrite + Send + Unpin + 'static, options: SseServerOptions) -> Self {
        let (incoming_tx, incoming_rx) = mpsc::channel(options.incoming_capacity.max(1));
        Self {
            options,
            state: StateCell::new(),
            stream: StdMutex::new(Some(Box::new(stream))),
            outbound_tx: StdMutex::new(None),
            incoming_tx: Arc::new(StdMutex::new(Some(incoming_tx))),
            incoming: Mutex::new(incoming_rx),
            write_task: Mutex::new(None),
        }
    }

    /// Deliver one inbound message from the hosting framework.
    ///
    /// Enqueues onto the transport's inbound channel; awaits when the
    /// single consumer lags, and fails once the transport closes.
    pub async fn on_message_received(&self, message: JsonRpcMessage) -> Result<(), Error> {
        let tx = self.incoming_tx
            .lock()
            .unwrap()
            .clone()
            .ok_or(Error::TransportClosed)?;
        tokio::select! {
            result = tx.send(message) => result.map_err(|_| Error::TransportClosed),
            _ = self.closed() => Err(Error::TransportClosed),
        }
    }

    /// Resolves once the transport reaches `Closed`.
    pub async fn closed(&self) {
        let mut rx = self.state.subscribe();
        loop {
            if *rx.borrow() == TransportState::Closed {
                return;
            }
            if rx.changed().await.is_err() {
                return;
            }
        }
    }
}

#[async_trait]
impl Transport for SseServerTransport {
    async fn start(&self) -> Result<(), Error> {
        if self.state.get() != TransportState::Unstarted {
            return Err(Error::Protocol("SSE transport already started".to_string()));
        }

        let mut stream = self.stream
            .lock()
            .unwrap()
            .take()
            .ok_or_else(|| Error::Protocol("SSE transport already started".to_string()))?;

        // The endpoint event must be the first bytes on the wire.
        let endpoint = format_event("endpoint", &self.options.message_endpoint);
        stream.write_all(endpoint.as_bytes()).await?;
        stream.flush().await?;
        debug!(endpoint = %self.options.message_endpoint, "sent endpoint event");

        let (outbound_tx, outbound_rx) = mpsc::channel(self.options.outbound_capacity.max(1));
        *self.outbound_tx.lock().unwrap() = Some(outbound_tx);

        let state = self.state.clone();
        let incoming_tx = self.incoming_tx.clone();
        *self.write_task.lock().await = Some(
            tokio::spawn(write_events(stream, outbound_rx, state, incoming_tx))
        );

        self.state.set(TransportState::Connected);
        Ok(())
    }

    async fn send(&self, message: &JsonRpcMessage) -> Result<(), Error> {
        if !self.state.is_connected() {
            return Err(Error::not_connected());
        }
        let tx = self.outbound_tx
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(Error::not_connected)?;
        // Bounded queue: blocks here while the client is slow.
        tx.send(message.clone()).await.map_err(|_| Error::not_connected())
    }

    async fn receive(&self) -> Option<JsonRpcMessage> {
        let mut incoming = self.incoming.lock().await;
        incoming.recv().await
    }

    fn is_connected(&self) -> bool {
        self.state.is_connected()
    }

    async fn close(&self) -> Result<(), Error> {
        match self.state.get() {
            TransportState::Closed => {
                return Ok(());
            }
            _ => {}
        }
        self.state.set(TransportState::Closing);

        // Completing the outbound writer lets the write loop drain and exit.
        drop(self.outbound_tx.lock().unwrap().take());

        if let Some(task) = self.write_task.lock().await.take() {
            if let Err(e) = task.await {
                warn!("error joining SSE write loop: {e}");
            }
        }

        drop(self.incoming_tx.lock().unwrap().take());
        self.state.set(TransportState::Closed);
        debug!("SSE transport closed");
        Ok(())
    }
}

/// Drain the outbound queue onto the response stream as `message` events.
async fn write_events(
    mut stream: ResponseStream,
    mut outbound_rx: mpsc::Receiver<JsonRpcMessage>,
    state: StateCell,
    incoming_tx: Arc<StdMutex<Option<mpsc::Sender<JsonRpcMessage>>>>
) {
    while let Some(message) = outbound_rx.recv().await {
        let json = match jsonrpc::encode(&message) {
            Ok(json) => json,
            Err(e) => {
                warn!("failed to encode outbound message: {e}");
                continue;
            }
        };
        let event = format_event("message", &json);
        let result = async {
            stream.write_all(event.as_bytes()).await?;
            stream.flush().await?;
            Ok::<(), std::io::Error>(())
        }.await;
        if let Err(e) = result {
            error!("SSE response stream failed: {e}");
            break;
        }
    }
    let _ = stream.shutdown().await;
    // A dead response stream ends the inbound side too.
    drop(incoming_tx.lock().unwrap().take());
    state.set(TransportState::Closed);
}

/// Frame one server-sent event. Data is a single line by construction
/// (JSON encoding never embeds raw newlines).
fn format_event(event: &str, data: &str) -> String {
    format!("event: {event}\ndata: {data}\n\n")
}

// ---------------------------------------------------------------------------
// HTTP glue

/// Callback handed each accepted connection's transport, so the
/// application can build a session on top of it.
pub type OnConnection = Arc<dyn Fn(Arc<SseServerTransport>) + Send + Sync>;

struct SseAppState {
    options: SseServerOptions,
    on_connection: OnConnection,
    sessions: StdMutex<HashMap<String, Arc<SseServerTransport>>>,
}

/// Build an axum router serving `GET /sse` and `POST /message`.
///
/// Each SSE connection gets its own [`SseServerTransport`] whose endpoint
/// event carries a per-connection `session_id`; POSTs are routed back to
/// that connection's transport via [`SseServerTransport::on_message_received`].
pub fn router(options: SseServerOptions, on_connection: OnConnection) -> Router {
    let state = Arc::new(SseAppState {
        options,
        on_connection,
        sessions: StdMutex::new(HashMap::new()),
    });

    Router::new()
        .route("/sse", get(handle_sse_connection))
        .route("/message", post(handle_client_message))
        .with_state(state)
        .layer(CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any))
}

async fn handle_sse_connection(State(state): State<Arc<SseAppState>>) -> Response {
    let session_id = uuid::Uuid::new_v4().to_string();
    debug!(%session_id, "new SSE connection");

    let mut options = state.options.clone();
    options.message_endpoint = format!(
        "{}?session_id={}",
        state.options.message_endpoint,
        session_id
    );

    let (writer, reader) = tokio::io::duplex(8 * 1024);
    let transport = Arc::new(SseServerTransport::new(writer, options));
    state.sessions.lock().unwrap().insert(session_id.clone(), transport.clone());

    (state.on_connection)(transport.clone());

    if let Err(e) = transport.start().await {
        error!("failed to start SSE transport: {e}");
        state.sessions.lock().unwrap().remove(&session_id);
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }

    // Reap the registry entry once the connection dies.
    {
        let state = state.clone();
        let transport = transport.clone();
        tokio::spawn(async move {
            transport.closed().await;
            state.sessions.lock().unwrap().remove(&session_id);
        });
    }

    let body = Body::from_stream(ReaderStream::new(reader));
    (
        [
            (header::CONTENT_TYPE, "text/event-stream"),
            (header::CACHE_CONTROL, "no-cache"),
        ],
        body,
    ).into_response()
}

#[derive(Deserialize)]
struct MessageQuery {
    session_id: String,
}

async fn handle_client_message(
    State(state): State<Arc<SseAppState>>,
    Query(query): Query<MessageQuery>,
    body: String
) -> Response {
    let transport = state.sessions.lock().unwrap().get(&query.session_id).cloned();
    let Some(transport) = transport else {
        return StatusCode::NOT_FOUND.into_response();
    };

    match jsonrpc::decode(&body) {
        Ok(message) => {
            match transport.on_message_received(message).await {
                Ok(()) => StatusCode::ACCEPTED.into_response(),
                Err(_) => StatusCode::GONE.into_response(),
            }
        }
        Err(e) => (StatusCode::BAD_REQUEST, e.to_string()).into_response(),
    }
}
