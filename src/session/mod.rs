//! MCP session.
//!
//! The session multiplexes JSON-RPC traffic over one transport: it
//! allocates request ids, correlates responses to parked awaiters,
//! routes progress notifications to their originating requests, honours
//! cancellation in both directions, and dispatches server-initiated
//! requests to registered handlers. One cooperative task drives the
//! transport's read side; sends may come from any caller context.

mod pending;
mod progress;


pub use progress::ProgressSink;

use serde::de::DeserializeOwned;
use serde_json::{ Map, Value };
use std::collections::{ HashMap, VecDeque };
use std::sync::atomic::{ AtomicI64, Ordering };
use std::sync::{ Arc, Mutex as StdMutex };
use tokio::sync::{ broadcast, Mutex, Semaphore };
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{ debug, warn };

use async_trait::async_trait;

use crate::errors::{ error_codes, Error, ErrorData };
use crate::protocol::{
    jsonrpc,
    methods,
    CancelledParams,
    JsonRpcError,
    JsonRpcMessage,
    JsonRpcNotification,
    JsonRpcRequest,
    JsonRpcResponse,
    ProgressParams,
    ProgressToken,
    RequestId,
};
use crate::transport::Transport;

use pending::PendingRequests;
use progress::ProgressRouter;

/// Handler for server-initiated requests.
///
/// The scope token is cancelled when the peer withdraws the request or
/// the transport closes; a cooperative handler returns promptly, and the
/// session then sends no response at all for that request.
#[async_trait]
pub trait RequestHandler: Send + Sync {
    async fn handle(&self, request: JsonRpcRequest, scope: CancellationToken) -> Result<Value, Error>;
}

/// Session tuning knobs.
#[derive(Debug, Clone, Default)]
pub struct SessionOptions {
    /// Bound on concurrently running inbound request handlers. `None`
    /// (the default) leaves admission to the handlers themselves.
    pub max_concurrent_requests: Option<usize>,
}

/// The stateful per-connection object correlating requests, responses,
/// and notifications over one transport.
pub struct Session {
    transport: Arc<dyn Transport>,
    pending: Arc<PendingRequests>,
    progress: Arc<ProgressRouter>,
    handlers: Arc<StdMutex<HashMap<String, Arc<dyn RequestHandler>>>>,
    /// Cancellation scopes for in-flight inbound requests, keyed by id.
    inbound: Arc<StdMutex<HashMap<RequestId, CancellationToken>>>,
    notifications_tx: broadcast::Sender<JsonRpcNotification>,
    next_id: AtomicI64,
    limiter: Option<Arc<Semaphore>>,
    shutdown: CancellationToken,
    read_task: Mutex<Option<JoinHandle<()>>>,
}

impl Session {
    /// Create a session over `transport` with default options.
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self::with_options(transport, SessionOptions::default())
    }

    /// Create a session over `transport`.
    pub fn with_options(transport: Arc<dyn Transport>, options: SessionOptions) -> Self {
        let (notifications_tx, _) = broadcast::channel(64);
        Self {
            transport,
            pending: Arc::new(PendingRequests::new()),
            progress: Arc::new(ProgressRouter::new()),
            handlers: Arc::new(StdMutex::new(HashMap::new())),
            inbound: Arc::new(StdMutex::new(HashMap::new())),
            notifications_tx,
            next_id: AtomicI64::new(1),
            limiter: options.max_concurrent_requests.map(|n| Arc::new(Semaphore::new(n))),
            shutdown: CancellationToken::new(),
            read_task: Mutex::new(None),
        }
    }

    /// Start the transport and the inbound dispatch loop.
    pub async fn start(&self) -> Result<(), Error> {
        let mut task_guard = self.read_task.lock().await;
        if task_guard.is_some() {
            return Err(Error::Protocol("session already started".to_string()));
        }

        self.transport.start().await?;

        let dispatcher = Dispatcher {
            transport: self.transport.clone(),
            pending: self.pending.clone(),
            progress: self.progress.clone(),
            handlers: self.handlers.clone(),
            inbound: self.inbound.clone(),
            notifications_tx: self.notifications_tx.clone(),
            limiter: self.limiter.clone(),
        };
        let transport = self.transport.clone();
        let shutdown = self.shutdown.clone();

        *task_guard = Some(
            tokio::spawn(async move {
                loop {
                    tokio::select! {
                        _ = shutdown.cancelled() => {
                            break;
                        }
                        message = transport.receive() => {
                            match message {
                                Some(message) => dispatcher.dispatch(message).await,
                                None => {
                                    debug!("transport reached end-of-stream");
                                    break;
                                }
                            }
                        }
                    }
                }
                dispatcher.terminate();
            })
        );

        debug!("session started");
        Ok(())
    }

    /// Whether the underlying transport is connected.
    pub fn is_connected(&self) -> bool {
        self.transport.is_connected()
    }

    /// Number of requests still awaiting a response.
    pub fn pending_requests(&self) -> usize {
        self.pending.len()
    }

    /// Subscribe to notifications not consumed by the session itself
    /// (everything except progress and cancellation).
    pub fn notifications(&self) -> broadcast::Receiver<JsonRpcNotification> {
        self.notifications_tx.subscribe()
    }

    /// Register a handler for server-initiated requests on `method`.
    /// Inbound requests with no registered handler are answered with
    /// `MethodNotFound`.
    pub fn register_handler(&self, method: impl Into<String>, handler: Arc<dyn RequestHandler>) {
        self.handlers.lock().unwrap().insert(method.into(), handler);
    }

    /// Send a request and await its typed result.
    pub async fn request<R>(
        &self,
        method: &str,
        params: Option<Value>,
        ctx: &CancellationToken
    ) -> Result<R, Error>
        where R: DeserializeOwned
    {
        let value = self.request_value(method, params, ctx, None).await?;
        serde_json::from_value(value).map_err(Error::Json)
    }

    /// Like [`Session::request`], with progress events from the server
    /// forwarded to `progress` while the request is in flight.
    pub async fn request_with_progress<R>(
        &self,
        method: &str,
        params: Option<Value>,
        ctx: &CancellationToken,
        progress: ProgressSink
    ) -> Result<R, Error>
        where R: DeserializeOwned
    {
        let value = self.request_value(method, params, ctx, Some(progress)).await?;
        serde_json::from_value(value).map_err(Error::Json)
    }

    /// Send a notification. Never awaits a reply.
    pub async fn notify(&self, method: &str, params: Option<Value>) -> Result<(), Error> {
        let notification = JsonRpcNotification::new(method, params);
        self.transport.send(&JsonRpcMessage::Notification(notification)).await
    }

    async fn request_value(
        &self,
        method: &str,
        params: Option<Value>,
        ctx: &CancellationToken,
        progress: Option<ProgressSink>
    ) -> Result<Value, Error> {
        let id = RequestId::Number(self.next_id.fetch_add(1, Ordering::SeqCst));
        let token = ProgressToken::from(&id);

        // The progress token is the request id; it lives exactly as long
        // as the awaiter.
        let params = match &progress {
            Some(_) => Some(jsonrpc::embed_progress_token(params, &token)?),
            None => params,
        };
        if let Some(sink) = &progress {
            self.progress.register(token.clone(), sink.clone());
        }

        let mut rx = self.pending.insert(id.clone(), method);
        let request = JsonRpcRequest::new(id.clone(), method, params);
        debug!(%id, method, "sending request");

        if let Err(e) = self.transport.send(&JsonRpcMessage::Request(request)).await {
            self.pending.remove(&id);
            self.progress.unregister(&token);
            return Err(e);
        }

        enum Waited {
            Response(Result<pending::Completion, tokio::sync::oneshot::error::RecvError>),
            CtxCancelled,
        }

        let waited = tokio::select! {
            biased;
            response = &mut rx => Waited::Response(response),
            _ = ctx.cancelled() => Waited::CtxCancelled,
        };

        let outcome = match waited {
            Waited::Response(Ok(completion)) => completion,
            Waited::Response(Err(_)) => Err(Error::TransportClosed),
            Waited::CtxCancelled => {
                if self.pending.remove(&id) {
                    // Sever the awaiter first; the wire notification is
                    // best-effort and may fail after transport close.
                    let params = CancelledParams {
                        request_id: id.clone(),
                        reason: Some("request cancelled by caller".to_string()),
                    };
                    let _ = self.notify(
                        methods::NOTIFICATIONS_CANCELLED,
                        serde_json::to_value(&params).ok()
                    ).await;
                    debug!(%id, method, "request cancelled");
                    Err(Error::Cancelled)
                } else {
                    // The response won the race; deliver it.
                    match rx.await {
                        Ok(completion) => completion,
                        Err(_) => Err(Error::TransportClosed),
                    }
                }
            }
        };

        self.progress.unregister(&token);
        outcome
    }

    /// Close the session: stop the dispatch loop, dispose the transport,
    /// and fail anything still pending. Idempotent.
    pub async fn close(&self) -> Result<(), Error> {
        self.shutdown.cancel();
        if let Some(task) = self.read_task.lock().await.take() {
            let _ = task.await;
        }
        self.transport.close().await?;
        // In case the loop never ran.
        self.pending.fail_all(|| Error::TransportClosed);
        debug!("session closed");
        Ok(())
    }
}

/// Parse a request/notification `params` member into its typed shape.
/// Absent params parse as the empty object.
pub(crate) fn parse_params<T: DeserializeOwned>(params: Option<Value>) -> Result<T, Error> {
    serde_json::from_value(params.unwrap_or(Value::Object(Map::new()))).map_err(Error::Json)
}

/// Everything the read loop needs, detached from the session's lifetime.
struct Dispatcher {
    transport: Arc<dyn Transport>,
    pending: Arc<PendingRequests>,
    progress: Arc<ProgressRouter>,
    handlers: Arc<StdMutex<HashMap<String, Arc<dyn RequestHandler>>>>,
    inbound: Arc<StdMutex<HashMap<RequestId, CancellationToken>>>,
    notifications_tx: broadcast::Sender<JsonRpcNotification>,
    limiter: Option<Arc<Semaphore>>,
}

impl Dispatcher {
    /// Route one inbound message. Batches are flattened in order.
    async fn dispatch(&self, message: JsonRpcMessage) {
        let mut queue = VecDeque::from([message]);
        while let Some(message) = queue.pop_front() {
            match message {
                JsonRpcMessage::Batch(items) => queue.extend(items),
                JsonRpcMessage::Response(response) => self.on_response(response),
                JsonRpcMessage::Error(error) => self.on_error(error),
                JsonRpcMessage::Notification(notification) => {
                    self.on_notification(notification);
                }
                JsonRpcMessage::Request(request) => self.on_request(request).await,
            }
        }
    }

    fn on_response(&self, response: JsonRpcResponse) {
        if !self.pending.complete(&response.id, Ok(response.result)) {
            warn!(id = %response.id, "dropping response with no matching request");
        }
    }

    fn on_error(&self, error: JsonRpcError) {
        if !self.pending.complete(&error.id, Err(Error::Rpc(error.error))) {
            warn!(id = %error.id, "dropping error response with no matching request");
        }
    }

    fn on_notification(&self, notification: JsonRpcNotification) {
        match notification.method.as_str() {
            methods::NOTIFICATIONS_PROGRESS => {
                match parse_params::<ProgressParams>(notification.params) {
                    Ok(params) => {
                        if !self.progress.route(params) {
                            debug!("progress notification for unknown token dropped");
                        }
                    }
                    Err(e) => warn!("undecodable progress notification dropped: {e}"),
                }
            }
            methods::NOTIFICATIONS_CANCELLED => {
                match parse_params::<CancelledParams>(notification.params) {
                    Ok(params) => {
                        let scope = self.inbound.lock().unwrap().get(&params.request_id).cloned();
                        match scope {
                            Some(scope) => {
                                debug!(id = %params.request_id, "peer cancelled inbound request");
                                scope.cancel();
                            }
                            None => {
                                debug!(
                                    id = %params.request_id,
                                    "cancellation for unknown inbound request dropped"
                                );
                            }
                        }
                    }
                    Err(e) => warn!("undecodable cancellation notification dropped: {e}"),
                }
            }
            _ => {
                // No subscribers is fine.
                let _ = self.notifications_tx.send(notification);
            }
        }
    }

    /// Dispatch a server-initiated request. Handler work runs in its own
    /// task so the read loop never blocks on it.
    async fn on_request(&self, request: JsonRpcRequest) {
        let handler = self.handlers.lock().unwrap().get(&request.method).cloned();
        let Some(handler) = handler else {
            warn!(method = %request.method, "no handler registered, replying method-not-found");
            let error = JsonRpcError::new(
                request.id,
                ErrorData::new(
                    error_codes::METHOD_NOT_FOUND,
                    format!("method not found: {}", request.method)
                )
            );
            if let Err(e) = self.transport.send(&JsonRpcMessage::Error(error)).await {
                warn!("failed to send method-not-found reply: {e}");
            }
            return;
        };

        let scope = CancellationToken::new();
        self.inbound.lock().unwrap().insert(request.id.clone(), scope.clone());

        let transport = self.transport.clone();
        let inbound = self.inbound.clone();
        let limiter = self.limiter.clone();
        tokio::spawn(async move {
            let _permit = match &limiter {
                Some(semaphore) => semaphore.clone().acquire_owned().await.ok(),
                None => None,
            };

            let id = request.id.clone();
            let outcome = tokio::select! {
                _ = scope.cancelled() => None,
                result = handler.handle(request, scope.clone()) => Some(result),
            };
            inbound.lock().unwrap().remove(&id);

            let reply = match outcome {
                // Cancelled requests must not be answered.
                None => None,
                Some(Err(_)) if scope.is_cancelled() => None,
                Some(Ok(result)) => Some(JsonRpcMessage::Response(JsonRpcResponse::new(id, result))),
                Some(Err(e)) => {
                    // Handler failures become error responses; they never
                    // terminate the session.
                    Some(JsonRpcMessage::Error(JsonRpcError::new(id, e.to_error_data())))
                }
            };
            if let Some(reply) = reply {
                if let Err(e) = transport.send(&reply).await {
                    warn!("failed to send response for inbound request: {e}");
                }
            }
        });
    }

    /// End-of-stream: fail every awaiter uniformly and cancel all
    /// inbound handler scopes.
    fn terminate(&self) {
        self.pending.fail_all(|| Error::TransportClosed);
        let scopes: Vec<_> = self.inbound.lock().unwrap().drain().collect();
        for (_, scope) in scopes {
            scope.cancel();
        }
    }
}
