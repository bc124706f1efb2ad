//! MCP method names.
//!
//! The exact wire strings for every RPC and notification this client
//! speaks. The session's handler registry and the typed façade both key
//! on these.

/// Liveness check; empty result.
pub const PING: &str = "ping";

/// Connection handshake.
pub const INITIALIZE: &str = "initialize";

/// List available tools (paginated).
pub const TOOLS_LIST: &str = "tools/list";
/// Invoke a tool by name.
pub const TOOLS_CALL: &str = "tools/call";

/// List available prompts (paginated).
pub const PROMPTS_LIST: &str = "prompts/list";
/// Materialize a prompt by name.
pub const PROMPTS_GET: &str = "prompts/get";

/// List available resources (paginated).
pub const RESOURCES_LIST: &str = "resources/list";
/// List resource templates (paginated).
pub const RESOURCES_TEMPLATES_LIST: &str = "resources/templates/list";
/// Read a resource by URI.
pub const RESOURCES_READ: &str = "resources/read";
/// Subscribe to update notifications for a resource.
pub const RESOURCES_SUBSCRIBE: &str = "resources/subscribe";
/// Unsubscribe from update notifications for a resource.
pub const RESOURCES_UNSUBSCRIBE: &str = "resources/unsubscribe";

/// Argument completion for prompts and resource templates.
pub const COMPLETION_COMPLETE: &str = "completion/complete";

/// Set the server's minimum logging level.
pub const LOGGING_SET_LEVEL: &str = "logging/setLevel";

/// Server-to-client request for an LLM completion.
pub const SAMPLING_CREATE_MESSAGE: &str = "sampling/createMessage";

/// Client-to-server notification completing the handshake.
pub const NOTIFICATIONS_INITIALIZED: &str = "notifications/initialized";
/// Incremental progress for a request carrying a progress token.
pub const NOTIFICATIONS_PROGRESS: &str = "notifications/progress";
/// Withdraw an in-flight request.
pub const NOTIFICATIONS_CANCELLED: &str = "notifications/cancelled";
/// The server's tool list changed.
pub const NOTIFICATIONS_TOOLS_LIST_CHANGED: &str = "notifications/tools/list_changed";
/// The server's prompt list changed.
pub const NOTIFICATIONS_PROMPTS_LIST_CHANGED: &str = "notifications/prompts/list_changed";
/// The server's resource list changed.
pub const NOTIFICATIONS_RESOURCES_LIST_CHANGED: &str = "notifications/resources/list_changed";
/// A subscribed resource changed.
pub const NOTIFICATIONS_RESOURCES_UPDATED: &str = "notifications/resources/updated";
/// A log record emitted by the server.
pub const NOTIFICATIONS_LOGGING_MESSAGE: &str = "notifications/logging/message";
