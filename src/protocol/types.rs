//! Type definitions for the Model Context Protocol (MCP).
//!
//! Capability descriptors are opaque records as far as the core is
//! concerned: each carries its identifying `name`/`uri` plus whatever
//! schema metadata the server advertises, captured verbatim through a
//! flattened map. Only the pagination envelope is interpreted.

use schemars::JsonSchema;
use serde::{ Deserialize, Serialize };
use serde_json::{ Map, Value };
use std::collections::HashMap;

use crate::errors::Error;
use crate::protocol::jsonrpc::{ ProgressToken, RequestId };

/// The protocol revision this client negotiates.
pub const PROTOCOL_VERSION: &str = "2024-11-05";

/// An opaque token used to represent a cursor for pagination.
///
/// Issued by the server; never interpreted on this side.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct Cursor(pub String);

impl From<&str> for Cursor {
    fn from(value: &str) -> Self {
        Cursor(value.to_string())
    }
}

/// The sender or recipient of messages and data in a conversation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Assistant,
    User,
}

/// The severity of a log message, based on RFC-5424 syslog severities.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LoggingLevel {
    Emergency,
    Alert,
    Critical,
    Error,
    Warning,
    Notice,
    Info,
    Debug,
}

/// A host-side severity scale, for callers that do not speak the MCP
/// logging levels natively.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogSeverity {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
    Critical,
    None,
}

impl From<LogSeverity> for LoggingLevel {
    /// Fixed conversion table; `None` maps to the level above which
    /// nothing is emitted.
    fn from(severity: LogSeverity) -> Self {
        match severity {
            LogSeverity::Trace => LoggingLevel::Debug,
            LogSeverity::Debug => LoggingLevel::Debug,
            LogSeverity::Info => LoggingLevel::Info,
            LogSeverity::Warn => LoggingLevel::Warning,
            LogSeverity::Error => LoggingLevel::Error,
            LogSeverity::Critical => LoggingLevel::Critical,
            LogSeverity::None => LoggingLevel::Emergency,
        }
    }
}

/// Request metadata, carried under `params._meta`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct RequestMeta {
    /// Token identifying this request for progress reporting.
    #[serde(rename = "progressToken")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress_token: Option<ProgressToken>,
}

// ---------------------------------------------------------------------------
// Content

/// A single content item exchanged with tools, prompts, and sampling.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Content {
    /// Text provided to or from an LLM.
    Text {
        text: String,
    },
    /// A base64-encoded image with its MIME type.
    Image {
        data: String,
        #[serde(rename = "mimeType")]
        mime_type: String,
    },
    /// A base64-encoded audio clip with its MIME type.
    Audio {
        data: String,
        #[serde(rename = "mimeType")]
        mime_type: String,
    },
    /// The contents of a resource, embedded into the conversation.
    Resource {
        resource: ResourceContents,
    },
}

/// The contents of a specific resource or sub-resource.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(untagged)]
pub enum ResourceContents {
    Text(TextResourceContents),
    Blob(BlobResourceContents),
}

/// The contents of a resource that is text-based.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct TextResourceContents {
    /// The URI of this resource.
    pub uri: String,

    /// The text of the item.
    pub text: String,

    /// The MIME type of this resource, if known.
    #[serde(rename = "mimeType")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
}

/// The contents of a resource that is binary.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct BlobResourceContents {
    /// The URI of this resource.
    pub uri: String,

    /// A base64-encoded string representing the binary data of the item.
    pub blob: String,

    /// The MIME type of this resource, if known.
    #[serde(rename = "mimeType")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
}

// ---------------------------------------------------------------------------
// Capability descriptors

/// Definition for a tool the client can call.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct Tool {
    /// The name of the tool.
    pub name: String,

    /// A human-readable description of the tool.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Schema metadata (e.g. `inputSchema`), passed through verbatim.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A prompt or prompt template advertised by the server.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct Prompt {
    /// The name of the prompt.
    pub name: String,

    /// A human-readable description of the prompt.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Argument declarations and other metadata, passed through verbatim.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A known resource the server is capable of reading.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct Resource {
    /// The URI of this resource.
    pub uri: String,

    /// A human-readable name for this resource.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(rename = "mimeType")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A template description for resources available on the server.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct ResourceTemplate {
    /// A URI template (RFC 6570) for constructing resource URIs.
    #[serde(rename = "uriTemplate")]
    pub uri_template: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

// ---------------------------------------------------------------------------
// Requests and results

/// Parameters common to all paginated list requests.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct PaginatedParams {
    /// An opaque token representing the current pagination position.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cursor: Option<Cursor>,
}

/// The server's response to a `tools/list` request.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct ListToolsResult {
    pub tools: Vec<Tool>,

    /// Set when more pages exist; absent on the final page.
    #[serde(rename = "nextCursor")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_cursor: Option<Cursor>,
}

/// The server's response to a `prompts/list` request.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct ListPromptsResult {
    pub prompts: Vec<Prompt>,

    #[serde(rename = "nextCursor")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_cursor: Option<Cursor>,
}

/// The server's response to a `resources/list` request.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct ListResourcesResult {
    pub resources: Vec<Resource>,

    #[serde(rename = "nextCursor")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_cursor: Option<Cursor>,
}

/// The server's response to a `resources/templates/list` request.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct ListResourceTemplatesResult {
    #[serde(rename = "resourceTemplates")]
    pub resource_templates: Vec<ResourceTemplate>,

    #[serde(rename = "nextCursor")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_cursor: Option<Cursor>,
}

/// Parameters for a `tools/call` request.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct CallToolParams {
    /// The name of the tool to invoke.
    pub name: String,

    /// Tool arguments; arbitrary JSON values keyed by argument name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub arguments: Option<Map<String, Value>>,
}

/// The server's response to a `tools/call` request.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct CallToolResult {
    pub content: Vec<Content>,

    /// Whether the call ended in a tool-level error.
    #[serde(rename = "isError")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_error: Option<bool>,
}

/// Parameters for a `prompts/get` request.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct GetPromptParams {
    /// The name of the prompt or prompt template.
    pub name: String,

    /// Arguments to use for templating the prompt.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub arguments: Option<Map<String, Value>>,
}

/// The server's response to a `prompts/get` request.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct GetPromptResult {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    pub messages: Vec<PromptMessage>,
}

/// Describes a message returned as part of a prompt.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct PromptMessage {
    pub role: Role,
    pub content: Content,
}

/// Parameters for a `resources/read` request.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct ReadResourceParams {
    /// The URI of the resource to read.
    pub uri: String,
}

/// The server's response to a `resources/read` request.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct ReadResourceResult {
    pub contents: Vec<ResourceContents>,
}

/// Parameters for `resources/subscribe` and `resources/unsubscribe`.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct SubscribeParams {
    pub uri: String,
}

/// Identifies a prompt or resource for completion.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(tag = "type")]
pub enum Reference {
    /// A reference to a prompt by name.
    #[serde(rename = "ref/prompt")]
    Prompt {
        name: String,
    },
    /// A reference to a resource or resource template by URI.
    #[serde(rename = "ref/resource")]
    Resource {
        uri: String,
    },
}

impl Reference {
    /// Check that the reference identifies something.
    pub fn validate(&self) -> Result<(), Error> {
        let (field, value) = match self {
            Reference::Prompt { name } => ("name", name),
            Reference::Resource { uri } => ("uri", uri),
        };
        if value.trim().is_empty() {
            return Err(Error::InvalidArgument(format!("reference {field} must not be empty")));
        }
        Ok(())
    }
}

/// The argument being completed.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct CompleteArgument {
    /// The name of the argument.
    pub name: String,

    /// The value entered so far.
    pub value: String,
}

/// Parameters for a `completion/complete` request.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct CompleteParams {
    #[serde(rename = "ref")]
    pub reference: Reference,

    pub argument: CompleteArgument,
}

/// The server's response to a `completion/complete` request.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct CompleteResult {
    pub completion: Completion,
}

/// Completion values for an argument.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct Completion {
    /// Candidate values, at most 100.
    pub values: Vec<String>,

    /// Total number of candidates, if known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total: Option<i64>,

    /// Whether candidates beyond `values` exist.
    #[serde(rename = "hasMore")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub has_more: Option<bool>,
}

/// Parameters for a `logging/setLevel` request.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct SetLevelParams {
    /// The minimum severity the server should emit.
    pub level: LoggingLevel,
}

/// A result with no fields of its own.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct EmptyResult {}

// ---------------------------------------------------------------------------
// Handshake

/// Describes the name and version of an MCP implementation.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct Implementation {
    pub name: String,
    pub version: String,
}

/// Capabilities a client may support.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct ClientCapabilities {
    /// Present if the client supports sampling from an LLM.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sampling: Option<Map<String, Value>>,

    /// Present if the client supports listing roots.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub roots: Option<Map<String, Value>>,

    /// Experimental, non-standard capabilities.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub experimental: Option<Map<String, Value>>,
}

/// Capabilities a server may support.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct ServerCapabilities {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<ToolsCapability>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompts: Option<PromptsCapability>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub resources: Option<ResourcesCapability>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub logging: Option<Map<String, Value>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub experimental: Option<Map<String, Value>>,
}

/// Tool-related server capabilities.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct ToolsCapability {
    #[serde(rename = "listChanged")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub list_changed: Option<bool>,
}

/// Prompt-related server capabilities.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct PromptsCapability {
    #[serde(rename = "listChanged")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub list_changed: Option<bool>,
}

/// Resource-related server capabilities.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct ResourcesCapability {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subscribe: Option<bool>,

    #[serde(rename = "listChanged")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub list_changed: Option<bool>,
}

/// Parameters for the `initialize` request.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct InitializeParams {
    #[serde(rename = "protocolVersion")]
    pub protocol_version: String,

    pub capabilities: ClientCapabilities,

    #[serde(rename = "clientInfo")]
    pub client_info: Implementation,
}

/// The server's response to an `initialize` request.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct InitializeResult {
    #[serde(rename = "protocolVersion")]
    pub protocol_version: String,

    pub capabilities: ServerCapabilities,

    #[serde(rename = "serverInfo")]
    pub server_info: Implementation,

    /// Instructions describing how to use the server and its features.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
}

// ---------------------------------------------------------------------------
// Notifications

/// Parameters of a `notifications/progress` notification.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct ProgressParams {
    /// The token from the originating request's `_meta.progressToken`.
    #[serde(rename = "progressToken")]
    pub progress_token: ProgressToken,

    /// The progress thus far. Should increase every notification.
    pub progress: f64,

    /// Total progress required, if known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total: Option<f64>,

    /// A human-readable description of the current step.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Parameters of a `notifications/cancelled` notification.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct CancelledParams {
    /// The id of the request being withdrawn.
    #[serde(rename = "requestId")]
    pub request_id: RequestId,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Parameters of a `notifications/resources/updated` notification.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct ResourceUpdatedParams {
    /// The URI of the resource that changed.
    pub uri: String,
}

/// Parameters of a `notifications/logging/message` notification.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct LoggingMessageParams {
    pub level: LoggingLevel,

    /// An optional name of the logger issuing this message.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logger: Option<String>,

    /// The data to be logged; any JSON-serializable shape.
    pub data: Value,
}

// ---------------------------------------------------------------------------
// Sampling

/// Describes a message issued to or received from an LLM API.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct SamplingMessage {
    pub role: Role,
    pub content: Content,
}

/// Hints to use for model selection.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct ModelHint {
    /// A hint for a model name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// The server's preferences for model selection, requested of the client
/// during sampling.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct ModelPreferences {
    #[serde(rename = "speedPriority")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speed_priority: Option<f64>,

    #[serde(rename = "intelligencePriority")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub intelligence_priority: Option<f64>,

    #[serde(rename = "costPriority")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cost_priority: Option<f64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub hints: Option<Vec<ModelHint>>,
}

/// Parameters of a `sampling/createMessage` request (server to client).
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct CreateMessageParams {
    pub messages: Vec<SamplingMessage>,

    /// The maximum number of tokens to sample.
    #[serde(rename = "maxTokens")]
    pub max_tokens: i64,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,

    #[serde(rename = "stopSequences")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_sequences: Option<Vec<String>>,

    #[serde(rename = "systemPrompt")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,

    #[serde(rename = "modelPreferences")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_preferences: Option<ModelPreferences>,

    /// Provider-specific metadata, passed through verbatim.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<HashMap<String, Value>>,

    #[serde(rename = "_meta")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<RequestMeta>,
}

/// The client's response to a `sampling/createMessage` request.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct CreateMessageResult {
    pub role: Role,

    /// A single content choice; never multi-part.
    pub content: Content,

    /// The name of the model that generated the message.
    pub model: String,

    /// Why sampling stopped, if known.
    #[serde(rename = "stopReason")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_reason: Option<String>,
}
