//! MCP client façade.
//!
//! This module provides the typed operation surface over a [`Session`]:
//! handshake, liveness, tools, prompts, resources, completion, and
//! logging control. List operations come in three forms — gather-all,
//! lazy stream, and raw single page — all driven by the pagination
//! module. Preconditions are checked before any wire activity.

pub mod paginate;

#[cfg(test)]
mod tests;

use futures::Stream;
use serde::Serialize;
use serde_json::{ Map, Value };
use std::sync::Arc;
use tokio::sync::{ broadcast, RwLock };
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::errors::Error;
use crate::protocol::{
    methods,
    CallToolParams,
    CallToolResult,
    ClientCapabilities,
    CompleteArgument,
    CompleteParams,
    CompleteResult,
    Cursor,
    EmptyResult,
    GetPromptParams,
    GetPromptResult,
    Implementation,
    InitializeParams,
    InitializeResult,
    JsonRpcNotification,
    ListPromptsResult,
    ListResourceTemplatesResult,
    ListResourcesResult,
    ListToolsResult,
    LoggingLevel,
    Prompt,
    ReadResourceParams,
    ReadResourceResult,
    Reference,
    Resource,
    ResourceTemplate,
    SetLevelParams,
    SubscribeParams,
    Tool,
    PROTOCOL_VERSION,
};
use crate::session::{ ProgressSink, Session };

use paginate::{ collect_all, page_params, stream_all };

/// Arguments for a tool call or prompt: a mapping from argument name to
/// an arbitrary JSON value.
///
/// Caller-native values are marshalled through [`serde_json::Value`]'s
/// conversions; values already in JSON form pass through unchanged.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Arguments(Map<String, Value>);

impl Arguments {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an argument from any value with a native JSON form
    /// (strings, numbers, booleans, or a prepared [`Value`]).
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    /// Add an argument by serializing an arbitrary value to JSON.
    pub fn try_with(
        mut self,
        key: impl Into<String>,
        value: &impl Serialize
    ) -> Result<Self, Error> {
        self.0.insert(key.into(), serde_json::to_value(value)?);
        Ok(self)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    fn into_option(self) -> Option<Map<String, Value>> {
        if self.0.is_empty() {
            None
        } else {
            Some(self.0)
        }
    }

    fn validate(&self) -> Result<(), Error> {
        for key in self.0.keys() {
            require_non_blank(key, "argument name")?;
        }
        Ok(())
    }
}

impl From<Map<String, Value>> for Arguments {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

/// Main client for MCP protocol communication: the typed surface over a
/// running session.
pub struct Client {
    session: Arc<Session>,
    client_info: Implementation,
    capabilities: ClientCapabilities,
    /// Populated by [`Client::initialize`].
    server_info: RwLock<Option<InitializeResult>>,
}

impl Client {
    /// Create a client over `session` with default client info.
    pub fn new(session: Arc<Session>) -> Self {
        Self {
            session,
            client_info: Implementation {
                name: env!("CARGO_PKG_NAME").to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
            },
            capabilities: ClientCapabilities {
                sampling: Some(Map::new()),
                ..ClientCapabilities::default()
            },
            server_info: RwLock::new(None),
        }
    }

    /// Override the implementation info advertised during the handshake.
    pub fn with_info(mut self, client_info: Implementation) -> Self {
        self.client_info = client_info;
        self
    }

    /// Override the capabilities advertised during the handshake.
    pub fn with_capabilities(mut self, capabilities: ClientCapabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    /// The underlying session.
    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    /// Perform the `initialize` handshake and send the
    /// `notifications/initialized` acknowledgement.
    pub async fn initialize(&self, ctx: &CancellationToken) -> Result<InitializeResult, Error> {
        let params = InitializeParams {
            protocol_version: PROTOCOL_VERSION.to_string(),
            capabilities: self.capabilities.clone(),
            client_info: self.client_info.clone(),
        };
        let result: InitializeResult = self.session.request(
            methods::INITIALIZE,
            Some(serde_json::to_value(&params)?),
            ctx
        ).await?;
        debug!(server = %result.server_info.name, "server initialized");

        self.session.notify(methods::NOTIFICATIONS_INITIALIZED, None).await?;
        *self.server_info.write().await = Some(result.clone());
        Ok(result)
    }

    /// The server's handshake result, if [`Client::initialize`] has run.
    pub async fn server_info(&self) -> Option<InitializeResult> {
        self.server_info.read().await.clone()
    }

    /// Liveness check.
    pub async fn ping(&self, ctx: &CancellationToken) -> Result<(), Error> {
        let _: EmptyResult = self.session.request(methods::PING, None, ctx).await?;
        Ok(())
    }

    // -- tools -------------------------------------------------------------

    /// Fetch every advertised tool across all pages.
    pub async fn list_tools(&self, ctx: &CancellationToken) -> Result<Vec<Tool>, Error> {
        collect_all::<ListToolsResult>(&self.session, methods::TOOLS_LIST, ctx).await
    }

    /// Lazily enumerate tools, fetching pages as the consumer advances.
    pub fn stream_tools(
        &self,
        ctx: CancellationToken
    ) -> impl Stream<Item = Result<Tool, Error>> + '_ {
        stream_all::<ListToolsResult>(&self.session, methods::TOOLS_LIST, ctx)
    }

    /// Fetch one page of tools.
    pub async fn list_tools_page(
        &self,
        cursor: Option<Cursor>,
        ctx: &CancellationToken
    ) -> Result<ListToolsResult, Error> {
        self.session.request(methods::TOOLS_LIST, page_params(&cursor), ctx).await
    }

    /// Invoke a tool by name.
    pub async fn call_tool(
        &self,
        name: &str,
        arguments: Arguments,
        ctx: &CancellationToken
    ) -> Result<CallToolResult, Error> {
        self.call_tool_inner(name, arguments, ctx, None).await
    }

    /// Invoke a tool, forwarding server progress events to `progress`.
    pub async fn call_tool_with_progress(
        &self,
        name: &str,
        arguments: Arguments,
        progress: ProgressSink,
        ctx: &CancellationToken
    ) -> Result<CallToolResult, Error> {
        self.call_tool_inner(name, arguments, ctx, Some(progress)).await
    }

    async fn call_tool_inner(
        &self,
        name: &str,
        arguments: Arguments,
        ctx: &CancellationToken,
        progress: Option<ProgressSink>
    ) -> Result<CallToolResult, Error> {
        require_non_blank(name, "tool name")?;
        arguments.validate()?;
        let params = CallToolParams {
            name: name.to_string(),
            arguments: arguments.into_option(),
        };
        let params = Some(serde_json::to_value(&params)?);
        match progress {
            Some(sink) => {
                self.session.request_with_progress(methods::TOOLS_CALL, params, ctx, sink).await
            }
            None => self.session.request(methods::TOOLS_CALL, params, ctx).await,
        }
    }

    // -- prompts -----------------------------------------------------------

    /// Fetch every advertised prompt across all pages.
    pub async fn list_prompts(&self, ctx: &CancellationToken) -> Result<Vec<Prompt>, Error> {
        collect_all::<ListPromptsResult>(&self.session, methods::PROMPTS_LIST, ctx).await
    }

    /// Lazily enumerate prompts.
    pub fn stream_prompts(
        &self,
        ctx: CancellationToken
    ) -> impl Stream<Item = Result<Prompt, Error>> + '_ {
        stream_all::<ListPromptsResult>(&self.session, methods::PROMPTS_LIST, ctx)
    }

    /// Fetch one page of prompts.
    pub async fn list_prompts_page(
        &self,
        cursor: Option<Cursor>,
        ctx: &CancellationToken
    ) -> Result<ListPromptsResult, Error> {
        self.session.request(methods::PROMPTS_LIST, page_params(&cursor), ctx).await
    }

    /// Materialize a prompt by name.
    pub async fn get_prompt(
        &self,
        name: &str,
        arguments: Arguments,
        ctx: &CancellationToken
    ) -> Result<GetPromptResult, Error> {
        require_non_blank(name, "prompt name")?;
        arguments.validate()?;
        let params = GetPromptParams {
            name: name.to_string(),
            arguments: arguments.into_option(),
        };
        self.session.request(methods::PROMPTS_GET, Some(serde_json::to_value(&params)?), ctx).await
    }

    // -- resources ---------------------------------------------------------

    /// Fetch every advertised resource across all pages.
    pub async fn list_resources(&self, ctx: &CancellationToken) -> Result<Vec<Resource>, Error> {
        collect_all::<ListResourcesResult>(&self.session, methods::RESOURCES_LIST, ctx).await
    }

    /// Lazily enumerate resources.
    pub fn stream_resources(
        &self,
        ctx: CancellationToken
    ) -> impl Stream<Item = Result<Resource, Error>> + '_ {
        stream_all::<ListResourcesResult>(&self.session, methods::RESOURCES_LIST, ctx)
    }

    /// Fetch one page of resources.
    pub async fn list_resources_page(
        &self,
        cursor: Option<Cursor>,
        ctx: &CancellationToken
    ) -> Result<ListResourcesResult, Error> {
        self.session.request(methods::RESOURCES_LIST, page_params(&cursor), ctx).await
    }

    /// Fetch every resource template across all pages.
    pub async fn list_resource_templates(
        &self,
        ctx: &CancellationToken
    ) -> Result<Vec<ResourceTemplate>, Error> {
        collect_all::<ListResourceTemplatesResult>(
            &self.session,
            methods::RESOURCES_TEMPLATES_LIST,
            ctx
        ).await
    }

    /// Lazily enumerate resource templates.
    pub fn stream_resource_templates(
        &self,
        ctx: CancellationToken
    ) -> impl Stream<Item = Result<ResourceTemplate, Error>> + '_ {
        stream_all::<ListResourceTemplatesResult>(
            &self.session,
            methods::RESOURCES_TEMPLATES_LIST,
            ctx
        )
    }

    /// Fetch one page of resource templates.
    pub async fn list_resource_templates_page(
        &self,
        cursor: Option<Cursor>,
        ctx: &CancellationToken
    ) -> Result<ListResourceTemplatesResult, Error> {
        self.session.request(methods::RESOURCES_TEMPLATES_LIST, page_params(&cursor), ctx).await
    }

    /// Read a resource by URI.
    pub async fn read_resource(
        &self,
        uri: &str,
        ctx: &CancellationToken
    ) -> Result<ReadResourceResult, Error> {
        require_non_blank(uri, "resource uri")?;
        let params = ReadResourceParams { uri: uri.to_string() };
        self.session.request(
            methods::RESOURCES_READ,
            Some(serde_json::to_value(&params)?),
            ctx
        ).await
    }

    /// Subscribe to update notifications for a resource.
    pub async fn subscribe_resource(&self, uri: &str, ctx: &CancellationToken) -> Result<(), Error> {
        require_non_blank(uri, "resource uri")?;
        let params = SubscribeParams { uri: uri.to_string() };
        let _: EmptyResult = self.session.request(
            methods::RESOURCES_SUBSCRIBE,
            Some(serde_json::to_value(&params)?),
            ctx
        ).await?;
        Ok(())
    }

    /// Unsubscribe from update notifications for a resource.
    pub async fn unsubscribe_resource(
        &self,
        uri: &str,
        ctx: &CancellationToken
    ) -> Result<(), Error> {
        require_non_blank(uri, "resource uri")?;
        let params = SubscribeParams { uri: uri.to_string() };
        let _: EmptyResult = self.session.request(
            methods::RESOURCES_UNSUBSCRIBE,
            Some(serde_json::to_value(&params)?),
            ctx
        ).await?;
        Ok(())
    }

    // -- completion and logging --------------------------------------------

    /// Ask the server to complete an argument value for a prompt or
    /// resource template reference.
    pub async fn complete(
        &self,
        reference: Reference,
        argument_name: &str,
        argument_value: &str,
        ctx: &CancellationToken
    ) -> Result<CompleteResult, Error> {
        reference.validate()?;
        require_non_blank(argument_name, "argument name")?;
        let params = CompleteParams {
            reference,
            argument: CompleteArgument {
                name: argument_name.to_string(),
                value: argument_value.to_string(),
            },
        };
        self.session.request(
            methods::COMPLETION_COMPLETE,
            Some(serde_json::to_value(&params)?),
            ctx
        ).await
    }

    /// Set the minimum severity the server should send log notifications
    /// for. Accepts [`LoggingLevel`] directly or the generic
    /// [`crate::protocol::LogSeverity`] scale.
    pub async fn set_logging_level(
        &self,
        level: impl Into<LoggingLevel>,
        ctx: &CancellationToken
    ) -> Result<(), Error> {
        let params = SetLevelParams { level: level.into() };
        let _: EmptyResult = self.session.request(
            methods::LOGGING_SET_LEVEL,
            Some(serde_json::to_value(&params)?),
            ctx
        ).await?;
        Ok(())
    }

    /// Subscribe to server notifications not consumed by the session
    /// (list-changed, resource-updated, log messages, ...).
    pub fn notifications(&self) -> broadcast::Receiver<JsonRpcNotification> {
        self.session.notifications()
    }
}

fn require_non_blank(value: &str, what: &str) -> Result<(), Error> {
    if value.trim().is_empty() {
        return Err(Error::InvalidArgument(format!("{what} must not be empty")));
    }
    Ok(())
}
