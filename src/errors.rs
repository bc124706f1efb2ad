//! Error types for the MCP client core.
//!
//! This module defines the error surface shared by the session, the
//! transports, and the typed client façade, along with the standard
//! JSON-RPC 2.0 error codes this implementation emits when answering
//! inbound requests.

use schemars::JsonSchema;
use serde::{ Deserialize, Serialize };
use thiserror::Error;

/// Error payload carried by a JSON-RPC error response.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, JsonSchema)]
pub struct ErrorData {
    /// Error code
    pub code: i32,
    /// Error message
    pub message: String,
    /// Optional additional data
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl ErrorData {
    /// Create an error payload with no additional data.
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }
}

/// The main error type for the MCP client core.
#[derive(Error, Debug)]
pub enum Error {
    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The peer closed the connection or the transport was disposed.
    /// Every request still pending at that point surfaces this uniformly.
    #[error("transport closed")]
    TransportClosed,

    /// Send before the transport started, or after it closed. The cause,
    /// when present, carries the underlying OS detail (e.g. the exit
    /// status of a stdio subprocess).
    #[error("transport not connected{}", fmt_cause(.cause))]
    NotConnected {
        cause: Option<String>,
    },

    /// A frame failed to parse as JSON, or a line exceeded the transport's
    /// length bound. Logged and dropped; never fatal on its own.
    #[error("malformed frame: {0}")]
    MalformedFrame(String),

    /// Structurally invalid JSON-RPC: neither `method` nor
    /// `result`/`error` present, or a request without an id.
    #[error("invalid JSON-RPC envelope: {0}")]
    InvalidEnvelope(String),

    /// The peer answered with a JSON-RPC error object.
    #[error("RPC error {}: {}", .0.code, .0.message)]
    Rpc(ErrorData),

    /// Cooperative cancellation of the awaiter. Distinct from any
    /// peer-sent error.
    #[error("request cancelled")]
    Cancelled,

    /// Caller-side precondition failure, raised before any wire activity.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Protocol or internal state errors (e.g. starting a session twice)
    #[error("protocol error: {0}")]
    Protocol(String),
}

fn fmt_cause(cause: &Option<String>) -> String {
    match cause {
        Some(cause) => format!(" ({cause})"),
        None => String::new(),
    }
}

/// Standard JSON-RPC 2.0 error codes
pub mod error_codes {
    /// Parse error
    pub const PARSE_ERROR: i32 = -32700;
    /// Invalid request
    pub const INVALID_REQUEST: i32 = -32600;
    /// Method not found
    pub const METHOD_NOT_FOUND: i32 = -32601;
    /// Invalid params
    pub const INVALID_PARAMS: i32 = -32602;
    /// Internal error
    pub const INTERNAL_ERROR: i32 = -32603;
}

impl Error {
    /// Shorthand for a [`Error::NotConnected`] without a recorded cause.
    pub fn not_connected() -> Self {
        Error::NotConnected { cause: None }
    }

    /// Shorthand for a peer-facing invalid-params error.
    pub fn invalid_params(message: impl Into<String>) -> Self {
        Error::Rpc(ErrorData::new(error_codes::INVALID_PARAMS, message))
    }

    /// Convert this error into the payload of a JSON-RPC error response.
    ///
    /// Used when this side acts as the responder for an inbound request:
    /// a peer-shaped [`Error::Rpc`] passes through unchanged, argument
    /// errors map to `-32602`, everything else collapses to `-32603`.
    pub fn to_error_data(&self) -> ErrorData {
        use error_codes::*;
        match self {
            Error::Rpc(data) => data.clone(),
            Error::InvalidArgument(msg) => ErrorData::new(INVALID_PARAMS, msg.clone()),
            Error::Json(e) => ErrorData::new(PARSE_ERROR, e.to_string()),
            Error::InvalidEnvelope(msg) => ErrorData::new(INVALID_REQUEST, msg.clone()),
            other => ErrorData::new(INTERNAL_ERROR, other.to_string()),
        }
    }
}
