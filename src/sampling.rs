//! Sampling bridge.
//!
//! Adapts a server-initiated `sampling/createMessage` request into a
//! streaming chat call against the host's LLM and shapes the outcome
//! back into a `CreateMessageResult`. The chat client itself is an
//! external collaborator behind the [`ChatClient`] trait.
//!
//! The final content choice is a deliberate heuristic: the last chat
//! message wins, and within it an image or audio part wins over text.
//! Multi-part results are never produced.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use futures::{ Stream, StreamExt };
use serde_json::Value;
use std::pin::Pin;
use std::sync::{ Arc, Weak };
use tokio_util::sync::CancellationToken;
use tracing::{ debug, warn };

use async_trait::async_trait;

use crate::errors::Error;
use crate::protocol::{
    methods,
    Content,
    CreateMessageParams,
    CreateMessageResult,
    JsonRpcRequest,
    ProgressParams,
    ProgressToken,
    ResourceContents,
    Role,
    SamplingMessage,
};
use crate::session::{ parse_params, RequestHandler, Session };

/// One part of a chat message: text, or binary data with a media type.
#[derive(Debug, Clone, PartialEq)]
pub enum ChatPart {
    Text(String),
    Binary {
        mime_type: String,
        data: Vec<u8>,
    },
}

/// A chat message exchanged with the host LLM.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatMessage {
    pub role: Role,
    pub parts: Vec<ChatPart>,
}

/// Options forwarded into the chat call when the sampling request
/// carries them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChatOptions {
    pub max_tokens: Option<i64>,
    pub temperature: Option<f64>,
    pub stop_sequences: Vec<String>,
    pub system_prompt: Option<String>,
}

/// Why the chat call stopped producing output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinishReason {
    /// The model ended its turn.
    EndTurn,
    /// Output was cut off by a length bound.
    Length,
}

/// One update from a streaming chat call.
///
/// A set `role` starts a new message; a set `part` is appended to the
/// message in progress. Model id and finish reason may arrive on any
/// update; the last value wins.
#[derive(Debug, Clone, Default)]
pub struct ChatUpdate {
    pub role: Option<Role>,
    pub part: Option<ChatPart>,
    pub model: Option<String>,
    pub finish_reason: Option<FinishReason>,
}

/// The update stream produced by a chat call.
pub type ChatStream = Pin<Box<dyn Stream<Item = Result<ChatUpdate, Error>> + Send>>;

/// The host's chat capability: issue one streaming completion call.
#[async_trait]
pub trait ChatClient: Send + Sync {
    async fn stream_chat(
        &self,
        messages: Vec<ChatMessage>,
        options: ChatOptions
    ) -> Result<ChatStream, Error>;
}

/// Handles `sampling/createMessage` by delegating to a [`ChatClient`],
/// forwarding per-update progress when the request asks for it.
pub struct SamplingBridge {
    chat: Arc<dyn ChatClient>,
    /// Weak so the session → handler → session cycle cannot leak.
    session: Weak<Session>,
}

impl SamplingBridge {
    /// Create a bridge with no session attached. Progress notifications
    /// are skipped until the bridge is registered.
    pub fn new(chat: Arc<dyn ChatClient>) -> Self {
        Self {
            chat,
            session: Weak::new(),
        }
    }

    /// Register a bridge over `chat` as `session`'s sampling handler.
    pub fn register(session: &Arc<Session>, chat: Arc<dyn ChatClient>) {
        let bridge = Arc::new(Self {
            chat,
            session: Arc::downgrade(session),
        });
        session.register_handler(methods::SAMPLING_CREATE_MESSAGE, bridge);
    }

    async fn report_progress(&self, token: &ProgressToken, updates_received: u64) {
        let Some(session) = self.session.upgrade() else {
            return;
        };
        let params = ProgressParams {
            progress_token: token.clone(),
            progress: updates_received as f64,
            total: None,
            message: None,
        };
        let params = match serde_json::to_value(&params) {
            Ok(params) => params,
            Err(_) => {
                return;
            }
        };
        if let Err(e) = session.notify(methods::NOTIFICATIONS_PROGRESS, Some(params)).await {
            debug!("failed to send sampling progress: {e}");
        }
    }
}

#[async_trait]
impl RequestHandler for SamplingBridge {
    async fn handle(
        &self,
        request: JsonRpcRequest,
        scope: CancellationToken
    ) -> Result<Value, Error> {
        let params: CreateMessageParams = parse_params(request.params).map_err(|e|
            Error::invalid_params(format!("invalid sampling params: {e}"))
        )?;
        let progress_token = params.meta.as_ref().and_then(|meta| meta.progress_token.clone());

        let (messages, options) = to_chat_call(&params)?;
        debug!(messages = messages.len(), "starting sampling chat call");

        let mut stream = self.chat.stream_chat(messages, options).await?;
        let mut accumulator = ChatAccumulator::default();
        let mut updates_received: u64 = 0;

        loop {
            let update = tokio::select! {
                _ = scope.cancelled() => {
                    debug!("sampling request cancelled mid-stream");
                    return Err(Error::Cancelled);
                }
                update = stream.next() => update,
            };
            let Some(update) = update else {
                break;
            };
            let update = update?;
            updates_received += 1;
            accumulator.apply(update);
            if let Some(token) = &progress_token {
                self.report_progress(token, updates_received).await;
            }
        }

        let result = accumulator.into_result();
        serde_json::to_value(result).map_err(Error::Json)
    }
}

/// Translate sampling params into the chat call's shape.
fn to_chat_call(params: &CreateMessageParams) -> Result<(Vec<ChatMessage>, ChatOptions), Error> {
    let messages = params.messages
        .iter()
        .map(to_chat_message)
        .collect::<Result<Vec<_>, _>>()?;

    let options = ChatOptions {
        max_tokens: Some(params.max_tokens),
        temperature: params.temperature,
        stop_sequences: params.stop_sequences.clone().unwrap_or_default(),
        system_prompt: params.system_prompt.clone(),
    };
    Ok((messages, options))
}

fn to_chat_message(message: &SamplingMessage) -> Result<ChatMessage, Error> {
    let part = match &message.content {
        Content::Text { text } => ChatPart::Text(text.clone()),
        Content::Image { data, mime_type } | Content::Audio { data, mime_type } => {
            let data = BASE64.decode(data).map_err(|e|
                Error::invalid_params(format!("invalid base64 content: {e}"))
            )?;
            ChatPart::Binary {
                mime_type: mime_type.clone(),
                data,
            }
        }
        Content::Resource { resource } =>
            match resource {
                ResourceContents::Text(text) => ChatPart::Text(text.text.clone()),
                ResourceContents::Blob(blob) => {
                    let data = BASE64.decode(&blob.blob).map_err(|e|
                        Error::invalid_params(format!("invalid base64 resource: {e}"))
                    )?;
                    ChatPart::Binary {
                        mime_type: blob.mime_type
                            .clone()
                            .unwrap_or_else(|| "application/octet-stream".to_string()),
                        data,
                    }
                }
            }
    };
    Ok(ChatMessage {
        role: message.role,
        parts: vec![part],
    })
}

/// Folds streamed updates into the chat call's final shape.
#[derive(Default)]
struct ChatAccumulator {
    messages: Vec<ChatMessage>,
    model: Option<String>,
    finish_reason: Option<FinishReason>,
}

impl ChatAccumulator {
    fn apply(&mut self, update: ChatUpdate) {
        if let Some(role) = update.role {
            self.messages.push(ChatMessage {
                role,
                parts: Vec::new(),
            });
        }
        if let Some(part) = update.part {
            match self.messages.last_mut() {
                Some(message) => message.parts.push(part),
                None =>
                    self.messages.push(ChatMessage {
                        role: Role::Assistant,
                        parts: vec![part],
                    }),
            }
        }
        if let Some(model) = update.model {
            self.model = Some(model);
        }
        if let Some(finish_reason) = update.finish_reason {
            self.finish_reason = Some(finish_reason);
        }
    }

    /// Synthesize the single-choice result from the last message.
    fn into_result(self) -> CreateMessageResult {
        let last = self.messages.last();
        let role = last.map(|message| message.role).unwrap_or(Role::Assistant);

        let binary = last.and_then(|message| {
            message.parts.iter().find_map(|part| {
                match part {
                    ChatPart::Binary { mime_type, data } =>
                        Some((mime_type.clone(), BASE64.encode(data))),
                    ChatPart::Text(_) => None,
                }
            })
        });

        let content = match binary {
            Some((mime_type, data)) => {
                if mime_type.starts_with("audio/") {
                    Content::Audio { data, mime_type }
                } else {
                    Content::Image { data, mime_type }
                }
            }
            None => {
                let text = last
                    .map(|message| {
                        message.parts
                            .iter()
                            .filter_map(|part| {
                                match part {
                                    ChatPart::Text(text) => Some(text.as_str()),
                                    ChatPart::Binary { .. } => None,
                                }
                            })
                            .collect::<String>()
                    })
                    .unwrap_or_default();
                Content::Text { text }
            }
        };

        if self.finish_reason.is_none() {
            warn!("chat stream ended without a finish reason, assuming end of turn");
        }
        let stop_reason = match self.finish_reason {
            Some(FinishReason::Length) => "maxTokens",
            _ => "endTurn",
        };

        CreateMessageResult {
            role,
            content,
            model: self.model.unwrap_or_else(|| "unknown".to_string()),
            stop_reason: Some(stop_reason.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;

    struct ScriptedChat {
        updates: Vec<ChatUpdate>,
    }

    #[async_trait]
    impl ChatClient for ScriptedChat {
        async fn stream_chat(
            &self,
            _messages: Vec<ChatMessage>,
            _options: ChatOptions
        ) -> Result<ChatStream, Error> {
            let updates: Vec<Result<ChatUpdate, Error>> = self.updates
                .iter()
                .cloned()
                .map(Ok)
                .collect();
            Ok(Box::pin(stream::iter(updates)))
        }
    }

    fn text_update(text: &str) -> ChatUpdate {
        ChatUpdate {
            part: Some(ChatPart::Text(text.to_string())),
            ..ChatUpdate::default()
        }
    }

    fn request_with(params: Value) -> JsonRpcRequest {
        JsonRpcRequest::new(crate::protocol::RequestId::Number(9), methods::SAMPLING_CREATE_MESSAGE, Some(params))
    }

    fn sampling_params() -> Value {
        serde_json::json!({
            "messages": [
                { "role": "user", "content": { "type": "text", "text": "hi" } }
            ],
            "maxTokens": 64
        })
    }

    #[tokio::test]
    async fn concatenates_text_parts_of_last_message() {
        let bridge = SamplingBridge::new(
            Arc::new(ScriptedChat {
                updates: vec![
                    ChatUpdate {
                        role: Some(Role::Assistant),
                        model: Some("test-model".to_string()),
                        ..ChatUpdate::default()
                    },
                    text_update("Hello, "),
                    text_update("world"),
                    ChatUpdate {
                        finish_reason: Some(FinishReason::EndTurn),
                        ..ChatUpdate::default()
                    }
                ],
            })
        );

        let value = bridge
            .handle(request_with(sampling_params()), CancellationToken::new()).await
            .unwrap();
        let result: CreateMessageResult = serde_json::from_value(value).unwrap();
        assert_eq!(result.role, Role::Assistant);
        assert_eq!(result.content, Content::Text { text: "Hello, world".to_string() });
        assert_eq!(result.model, "test-model");
        assert_eq!(result.stop_reason.as_deref(), Some("endTurn"));
    }

    #[tokio::test]
    async fn binary_part_wins_over_text() {
        let bridge = SamplingBridge::new(
            Arc::new(ScriptedChat {
                updates: vec![
                    text_update("caption"),
                    ChatUpdate {
                        part: Some(ChatPart::Binary {
                            mime_type: "image/png".to_string(),
                            data: vec![1, 2, 3],
                        }),
                        ..ChatUpdate::default()
                    }
                ],
            })
        );

        let value = bridge
            .handle(request_with(sampling_params()), CancellationToken::new()).await
            .unwrap();
        let result: CreateMessageResult = serde_json::from_value(value).unwrap();
        match result.content {
            Content::Image { data, mime_type } => {
                assert_eq!(mime_type, "image/png");
                assert_eq!(BASE64.decode(data).unwrap(), vec![1, 2, 3]);
            }
            other => panic!("expected image content, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn length_finish_maps_to_max_tokens() {
        let bridge = SamplingBridge::new(
            Arc::new(ScriptedChat {
                updates: vec![
                    text_update("truncated"),
                    ChatUpdate {
                        finish_reason: Some(FinishReason::Length),
                        ..ChatUpdate::default()
                    }
                ],
            })
        );

        let value = bridge
            .handle(request_with(sampling_params()), CancellationToken::new()).await
            .unwrap();
        let result: CreateMessageResult = serde_json::from_value(value).unwrap();
        assert_eq!(result.stop_reason.as_deref(), Some("maxTokens"));
    }

    #[tokio::test]
    async fn empty_stream_yields_unknown_model() {
        let bridge = SamplingBridge::new(Arc::new(ScriptedChat { updates: vec![] }));
        let value = bridge
            .handle(request_with(sampling_params()), CancellationToken::new()).await
            .unwrap();
        let result: CreateMessageResult = serde_json::from_value(value).unwrap();
        assert_eq!(result.model, "unknown");
        assert_eq!(result.content, Content::Text { text: String::new() });
    }

    #[tokio::test]
    async fn rejects_garbage_params() {
        let bridge = SamplingBridge::new(Arc::new(ScriptedChat { updates: vec![] }));
        let result = bridge.handle(
            request_with(serde_json::json!({ "nope": true })),
            CancellationToken::new()
        ).await;
        match result {
            Err(Error::Rpc(data)) => assert_eq!(data.code, crate::errors::error_codes::INVALID_PARAMS),
            other => panic!("expected invalid params, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn emits_progress_per_update_through_the_session() {
        let (session, mut harness) = crate::test_support::started_session().await;
        SamplingBridge::register(
            &session,
            Arc::new(ScriptedChat {
                updates: vec![text_update("a"), text_update("b")],
            })
        );

        let params = serde_json::json!({
            "messages": [
                { "role": "user", "content": { "type": "text", "text": "hi" } }
            ],
            "maxTokens": 8,
            "_meta": { "progressToken": "p1" }
        });
        harness.push(
            crate::protocol::JsonRpcMessage::Request(
                JsonRpcRequest::new(
                    crate::protocol::RequestId::Number(11),
                    methods::SAMPLING_CREATE_MESSAGE,
                    Some(params)
                )
            )
        );

        // One progress notification per chat update, then the response.
        for expected in 1..=2u32 {
            match harness.sent().await {
                crate::protocol::JsonRpcMessage::Notification(n) => {
                    assert_eq!(n.method, methods::NOTIFICATIONS_PROGRESS);
                    let params = n.params.unwrap();
                    assert_eq!(params["progressToken"], serde_json::json!("p1"));
                    assert_eq!(params["progress"], serde_json::json!(expected as f64));
                }
                other => panic!("expected progress notification, got {other}"),
            }
        }
        match harness.sent().await {
            crate::protocol::JsonRpcMessage::Response(resp) => {
                assert_eq!(resp.id, crate::protocol::RequestId::Number(11));
                let result: CreateMessageResult = serde_json::from_value(resp.result).unwrap();
                assert_eq!(result.content, Content::Text { text: "ab".to_string() });
            }
            other => panic!("expected response, got {other}"),
        }
    }

    #[test]
    fn maps_sampling_content_to_chat_parts() {
        let params = CreateMessageParams {
            messages: vec![
                SamplingMessage {
                    role: Role::User,
                    content: Content::Text { text: "hi".to_string() },
                },
                SamplingMessage {
                    role: Role::User,
                    content: Content::Image {
                        data: BASE64.encode([7u8, 8, 9]),
                        mime_type: "image/jpeg".to_string(),
                    },
                }
            ],
            max_tokens: 128,
            temperature: Some(0.5),
            stop_sequences: Some(vec!["STOP".to_string()]),
            system_prompt: None,
            model_preferences: None,
            metadata: None,
            meta: None,
        };

        let (messages, options) = to_chat_call(&params).unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].parts, vec![ChatPart::Text("hi".to_string())]);
        assert_eq!(
            messages[1].parts,
            vec![ChatPart::Binary { mime_type: "image/jpeg".to_string(), data: vec![7, 8, 9] }]
        );
        assert_eq!(options.max_tokens, Some(128));
        assert_eq!(options.stop_sequences, vec!["STOP".to_string()]);
    }
}
