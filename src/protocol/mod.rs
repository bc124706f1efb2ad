//! Protocol layer: JSON-RPC envelopes, MCP method names, and the typed
//! request/result shapes exchanged over them.

pub mod jsonrpc;
pub mod methods;
pub mod types;


pub use jsonrpc::{
    decode,
    encode,
    JsonRpcError,
    JsonRpcMessage,
    JsonRpcNotification,
    JsonRpcRequest,
    JsonRpcResponse,
    MessageKind,
    ProgressToken,
    RequestId,
    JSONRPC_VERSION,
};
pub use types::*;
