//! JSON-RPC 2.0 envelope model and codec.
//!
//! The session speaks JSON-RPC 2.0 over a framed transport. This module
//! defines the tagged message union (request / response / error response /
//! notification / batch), the opaque request-id and progress-token types,
//! and the encode/decode pair every transport frames with.
//!
//! Payloads under `params` and `result` are kept as opaque
//! [`serde_json::Value`] subtrees so they round-trip unchanged.

use schemars::JsonSchema;
use serde::{ Deserialize, Serialize };
use serde_json::{ Map, Value };
use std::fmt;

use crate::errors::{ Error, ErrorData };

/// The JSON-RPC version string carried by every message.
pub const JSONRPC_VERSION: &str = "2.0";

/// A uniquely identifying ID for a request in JSON-RPC.
///
/// Ids allocated by this client are monotonically increasing integers
/// starting at 1; peers may use strings. The integer-vs-string
/// distinction is preserved on the wire.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Hash)]
#[serde(untagged)]
pub enum RequestId {
    String(String),
    Number(i64),
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestId::String(s) => write!(f, "{s}"),
            RequestId::Number(n) => write!(f, "{n}"),
        }
    }
}

/// A progress token, used to associate progress notifications with the
/// original request. Chosen by the requester; round-trips unchanged.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Hash)]
#[serde(untagged)]
pub enum ProgressToken {
    String(String),
    Number(i64),
}

impl From<&RequestId> for ProgressToken {
    fn from(id: &RequestId) -> Self {
        match id {
            RequestId::String(s) => ProgressToken::String(s.clone()),
            RequestId::Number(n) => ProgressToken::Number(*n),
        }
    }
}

/// A JSON-RPC request expecting a response.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    pub id: RequestId,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl JsonRpcRequest {
    pub fn new(id: RequestId, method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            method: method.into(),
            params,
        }
    }
}

/// A successful JSON-RPC response. The result is an opaque JSON subtree.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    pub id: RequestId,
    pub result: Value,
}

impl JsonRpcResponse {
    pub fn new(id: RequestId, result: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            result,
        }
    }
}

/// A JSON-RPC error response.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct JsonRpcError {
    pub jsonrpc: String,
    pub id: RequestId,
    pub error: ErrorData,
}

impl JsonRpcError {
    pub fn new(id: RequestId, error: ErrorData) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            error,
        }
    }
}

/// A JSON-RPC notification. Carries no id and expects no response.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct JsonRpcNotification {
    pub jsonrpc: String,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl JsonRpcNotification {
    pub fn new(method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            method: method.into(),
            params,
        }
    }
}

/// Any JSON-RPC message. Batches are accepted on ingress and emitted only
/// when explicitly constructed.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(untagged)]
pub enum JsonRpcMessage {
    Request(JsonRpcRequest),
    Response(JsonRpcResponse),
    Error(JsonRpcError),
    Notification(JsonRpcNotification),
    Batch(Vec<JsonRpcMessage>),
}

/// Coarse message classification. Total over decoded messages; an error
/// response classifies as [`MessageKind::Response`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    Request,
    Response,
    Notification,
    Batch,
}

impl JsonRpcMessage {
    /// Classify this message by shape.
    pub fn kind(&self) -> MessageKind {
        match self {
            JsonRpcMessage::Request(_) => MessageKind::Request,
            JsonRpcMessage::Response(_) | JsonRpcMessage::Error(_) => MessageKind::Response,
            JsonRpcMessage::Notification(_) => MessageKind::Notification,
            JsonRpcMessage::Batch(_) => MessageKind::Batch,
        }
    }

    /// The request ID if this is a request or (error) response.
    pub fn id(&self) -> Option<&RequestId> {
        match self {
            JsonRpcMessage::Request(req) => Some(&req.id),
            JsonRpcMessage::Response(resp) => Some(&resp.id),
            JsonRpcMessage::Error(err) => Some(&err.id),
            JsonRpcMessage::Notification(_) | JsonRpcMessage::Batch(_) => None,
        }
    }

    /// The method name if this is a request or notification.
    pub fn method(&self) -> Option<&str> {
        match self {
            JsonRpcMessage::Request(req) => Some(&req.method),
            JsonRpcMessage::Notification(notification) => Some(&notification.method),
            _ => None,
        }
    }

    /// Classify and convert a decoded JSON value into a message.
    ///
    /// Fails with [`Error::InvalidEnvelope`] when the value has neither a
    /// `method` nor a `result`/`error` member, when a request or response
    /// lacks a usable id, or when the `jsonrpc` marker is missing or wrong.
    pub fn from_value(value: Value) -> Result<Self, Error> {
        match value {
            Value::Array(items) => {
                if items.is_empty() {
                    return Err(Error::InvalidEnvelope("empty batch".to_string()));
                }
                let messages = items
                    .into_iter()
                    .map(Self::from_value)
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(JsonRpcMessage::Batch(messages))
            }
            Value::Object(map) => Self::from_object(map),
            other => Err(
                Error::InvalidEnvelope(format!("expected object or array, got {}", kind_of(&other)))
            ),
        }
    }

    fn from_object(mut map: Map<String, Value>) -> Result<Self, Error> {
        match map.get("jsonrpc").and_then(Value::as_str) {
            Some(JSONRPC_VERSION) => {}
            Some(version) => {
                return Err(Error::InvalidEnvelope(format!("unsupported version {version:?}")));
            }
            None => {
                return Err(Error::InvalidEnvelope("missing jsonrpc version".to_string()));
            }
        }

        let id = match map.remove("id") {
            Some(Value::String(s)) => Some(RequestId::String(s)),
            Some(Value::Number(n)) => {
                match n.as_i64() {
                    Some(n) => Some(RequestId::Number(n)),
                    None => {
                        return Err(Error::InvalidEnvelope(format!("non-integer id {n}")));
                    }
                }
            }
            Some(other) => {
                return Err(Error::InvalidEnvelope(format!("invalid id type {}", kind_of(&other))));
            }
            None => None,
        };

        if let Some(method) = map.remove("method") {
            let method = match method {
                Value::String(method) => method,
                other => {
                    return Err(
                        Error::InvalidEnvelope(format!("method must be a string, got {}", kind_of(&other)))
                    );
                }
            };
            let params = map.remove("params");
            return Ok(match id {
                Some(id) => JsonRpcMessage::Request(JsonRpcRequest::new(id, method, params)),
                None => JsonRpcMessage::Notification(JsonRpcNotification::new(method, params)),
            });
        }

        if let Some(error) = map.remove("error") {
            let id = id.ok_or_else(|| Error::InvalidEnvelope("error response without id".to_string()))?;
            let error: ErrorData = serde_json
                ::from_value(error)
                .map_err(|e| Error::InvalidEnvelope(format!("invalid error object: {e}")))?;
            return Ok(JsonRpcMessage::Error(JsonRpcError::new(id, error)));
        }

        if let Some(result) = map.remove("result") {
            let id = id.ok_or_else(|| Error::InvalidEnvelope("response without id".to_string()))?;
            return Ok(JsonRpcMessage::Response(JsonRpcResponse::new(id, result)));
        }

        Err(Error::InvalidEnvelope("neither method nor result/error present".to_string()))
    }
}

impl<'de> Deserialize<'de> for JsonRpcMessage {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error> where D: serde::Deserializer<'de> {
        let value = Value::deserialize(deserializer)?;
        JsonRpcMessage::from_value(value).map_err(serde::de::Error::custom)
    }
}

impl fmt::Display for JsonRpcMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JsonRpcMessage::Request(req) => {
                write!(f, "Request {{ id: {}, method: {} }}", req.id, req.method)
            }
            JsonRpcMessage::Response(resp) => write!(f, "Response {{ id: {} }}", resp.id),
            JsonRpcMessage::Error(err) => {
                write!(f, "Error {{ id: {}, code: {} }}", err.id, err.error.code)
            }
            JsonRpcMessage::Notification(notification) => {
                write!(f, "Notification {{ method: {} }}", notification.method)
            }
            JsonRpcMessage::Batch(items) => write!(f, "Batch {{ len: {} }}", items.len()),
        }
    }
}

/// Encode a message as canonical JSON-RPC 2.0 text.
///
/// Absent `params` are omitted entirely; numeric ids stay numeric.
pub fn encode(message: &JsonRpcMessage) -> Result<String, Error> {
    serde_json::to_string(message).map_err(Error::Json)
}

/// Decode one frame of JSON-RPC 2.0 text.
///
/// Invalid JSON yields [`Error::MalformedFrame`]; well-formed JSON with a
/// bad envelope yields [`Error::InvalidEnvelope`].
pub fn decode(text: &str) -> Result<JsonRpcMessage, Error> {
    let value: Value = serde_json
        ::from_str(text)
        .map_err(|e| Error::MalformedFrame(e.to_string()))?;
    JsonRpcMessage::from_value(value)
}

/// Return `params` with `_meta.progressToken` set, preserving any other
/// members already present in `params` or `params._meta`.
pub(crate) fn embed_progress_token(params: Option<Value>, token: &ProgressToken) -> Result<Value, Error> {
    let mut map = match params {
        None => Map::new(),
        Some(Value::Object(map)) => map,
        Some(other) => {
            return Err(
                Error::InvalidArgument(format!("params must be an object, got {}", kind_of(&other)))
            );
        }
    };
    let meta = map.entry("_meta").or_insert_with(|| Value::Object(Map::new()));
    match meta {
        Value::Object(meta) => {
            meta.insert("progressToken".to_string(), serde_json::to_value(token)?);
        }
        other => {
            return Err(
                Error::InvalidArgument(format!("_meta must be an object, got {}", kind_of(other)))
            );
        }
    }
    Ok(Value::Object(map))
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
