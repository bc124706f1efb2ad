//! MCP Client Core
//!
//! This crate implements the protocol core of a client-side Model
//! Context Protocol (MCP) library: a session layer that multiplexes
//! JSON-RPC 2.0 traffic over a pluggable transport, request/response
//! correlation with progress and cancellation subprotocols, a stdio
//! transport that supervises a subprocess, an SSE transport for HTTP
//! streaming, transparent pagination over server lists, and a bridge
//! that answers server sampling requests from a host LLM.

pub mod client;
pub mod errors;
pub mod protocol;
pub mod sampling;
pub mod session;
pub mod transport;

#[cfg(test)]
mod test_support;

// Re-export commonly used items
pub use client::{ Arguments, Client };
pub use errors::Error;
pub use sampling::{ ChatClient, SamplingBridge };
pub use session::{ ProgressSink, RequestHandler, Session, SessionOptions };
pub use transport::sse::SseServerTransport;
pub use transport::stdio::StdioTransport;
pub use transport::Transport;
