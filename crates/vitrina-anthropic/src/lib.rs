// SPDX-FileCopyrightText: 2026 Vitrina Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Anthropic language-model fallback for Vitrina.
//!
//! Implements [`CompletionAdapter`] over the Anthropic Messages API. The
//! model is prompted to answer with a small JSON object naming an action and
//! the reply text; anything else is reported as "no answer" so the engine
//! falls back to its default reply.

pub mod client;
pub mod types;

use async_trait::async_trait;
use tracing::{debug, info};
use vitrina_config::model::AnthropicConfig;
use vitrina_core::traits::{CompletionAdapter, PluginAdapter};
use vitrina_core::types::{
    AdapterType, ChatRole, ChatTurn, CompletionAction, CompletionReply, CompletionRequest,
    HealthStatus,
};
use vitrina_core::VitrinaError;

use crate::client::AnthropicClient;
use crate::types::{ApiMessage, MessageRequest, ModelAnswer};

/// Anthropic provider implementing [`CompletionAdapter`].
pub struct AnthropicProvider {
    client: AnthropicClient,
    max_tokens: u32,
}

impl AnthropicProvider {
    /// Creates a provider from the `[anthropic]` section.
    ///
    /// Fails when no API key is configured.
    pub fn new(config: &AnthropicConfig) -> Result<Self, VitrinaError> {
        let api_key = config
            .api_key
            .as_deref()
            .filter(|k| !k.is_empty())
            .ok_or_else(|| {
                VitrinaError::Config(
                    "Anthropic API key not found. Set anthropic.api_key or VITRINA_ANTHROPIC_API_KEY."
                        .into(),
                )
            })?;
        let client = AnthropicClient::new(api_key, &config.api_version, config.model.clone())?;
        info!(model = %config.model, "Anthropic provider initialized");
        Ok(Self {
            client,
            max_tokens: config.max_tokens,
        })
    }

    /// Creates a provider with an existing client (for testing).
    #[cfg(test)]
    fn with_client(client: AnthropicClient, max_tokens: u32) -> Self {
        Self { client, max_tokens }
    }

    fn to_message_request(&self, request: &CompletionRequest) -> MessageRequest {
        MessageRequest {
            model: self.client.model().to_string(),
            messages: build_messages(&request.context, &request.user_text),
            system: Some(request.system_prompt.clone()).filter(|s| !s.is_empty()),
            max_tokens: self.max_tokens,
        }
    }
}

/// Turns the session history plus the new question into an alternating
/// user/assistant list that starts with a user turn.
///
/// Consecutive turns from the same role are merged.
fn build_messages(context: &[ChatTurn], user_text: &str) -> Vec<ApiMessage> {
    let turns = context
        .iter()
        .map(|turn| (turn.role, turn.content.as_str()))
        .chain(std::iter::once((ChatRole::User, user_text)))
        .skip_while(|(role, _)| *role == ChatRole::Assistant);

    let mut messages: Vec<ApiMessage> = Vec::new();
    for (role, content) in turns {
        let role = match role {
            ChatRole::User => "user",
            ChatRole::Assistant => "assistant",
        };
        match messages.last_mut() {
            Some(last) if last.role == role => {
                last.content.push('\n');
                last.content.push_str(content);
            }
            _ => messages.push(ApiMessage {
                role: role.to_string(),
                content: content.to_string(),
            }),
        }
    }
    messages
}

/// Parses the model's JSON answer.
///
/// Tolerates surrounding prose and Markdown code fences. Returns `None` for
/// unknown actions, blank replies or anything that is not the expected
/// object.
pub fn parse_reply(text: &str) -> Option<CompletionReply> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end < start {
        return None;
    }
    let answer: ModelAnswer = serde_json::from_str(&text[start..=end]).ok()?;
    let action = match answer.action.trim().to_ascii_lowercase().as_str() {
        "reply" => CompletionAction::Reply,
        "ask_photo" => CompletionAction::AskPhoto,
        "handoff" => CompletionAction::Handoff,
        _ => return None,
    };
    let reply_text = answer.reply.trim();
    if reply_text.is_empty() {
        return None;
    }
    Some(CompletionReply {
        action,
        reply_text: reply_text.to_string(),
    })
}

#[async_trait]
impl PluginAdapter for AnthropicProvider {
    fn name(&self) -> &str {
        "anthropic"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Provider
    }

    async fn health_check(&self) -> Result<HealthStatus, VitrinaError> {
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), VitrinaError> {
        Ok(())
    }
}

#[async_trait]
impl CompletionAdapter for AnthropicProvider {
    async fn complete(
        &self,
        request: CompletionRequest,
    ) -> Result<Option<CompletionReply>, VitrinaError> {
        let api_request = self.to_message_request(&request);
        let response = self.client.complete_message(&api_request).await?;
        debug!(
            id = %response.id,
            input_tokens = response.usage.input_tokens,
            output_tokens = response.usage.output_tokens,
            "language model answered"
        );
        let reply = parse_reply(&response.text());
        if reply.is_none() {
            debug!(id = %response.id, "language model answer had an unexpected shape");
        }
        Ok(reply)
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use wiremock::matchers::{body_partial_json, method};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn turn(role: ChatRole, content: &str) -> ChatTurn {
        ChatTurn {
            role,
            content: content.into(),
            timestamp: Utc.timestamp_opt(1_760_000_000, 0).unwrap(),
        }
    }

    #[test]
    fn parse_plain_json() {
        let reply = parse_reply(r#"{"action": "reply", "reply": "Abrimos a las 9."}"#).unwrap();
        assert_eq!(reply.action, CompletionAction::Reply);
        assert_eq!(reply.reply_text, "Abrimos a las 9.");
    }

    #[test]
    fn parse_fenced_json() {
        let text = "```json\n{\"action\": \"handoff\", \"reply\": \"Le consulto a la tienda.\"}\n```";
        let reply = parse_reply(text).unwrap();
        assert_eq!(reply.action, CompletionAction::Handoff);
    }

    #[test]
    fn parse_accepts_reply_text_key() {
        let reply = parse_reply(r#"{"action":"ask_photo","reply_text":"Mandanos una foto"}"#).unwrap();
        assert_eq!(reply.action, CompletionAction::AskPhoto);
    }

    #[test]
    fn parse_rejects_unexpected_shapes() {
        assert!(parse_reply("Claro, con gusto").is_none());
        assert!(parse_reply(r#"{"action": "dance", "reply": "x"}"#).is_none());
        assert!(parse_reply(r#"{"action": "reply", "reply": "   "}"#).is_none());
        assert!(parse_reply("} {").is_none());
    }

    #[test]
    fn messages_start_with_user_and_alternate() {
        let context = vec![
            turn(ChatRole::Assistant, "¡Hola!"),
            turn(ChatRole::User, "tienen bordados?"),
            turn(ChatRole::User, "personalizados"),
            turn(ChatRole::Assistant, "Sí."),
        ];
        let messages = build_messages(&context, "cuánto tardan?");
        let roles: Vec<&str> = messages.iter().map(|m| m.role.as_str()).collect();
        assert_eq!(roles, ["user", "assistant", "user"]);
        assert_eq!(messages[0].content, "tienen bordados?\npersonalizados");
        assert_eq!(messages[2].content, "cuánto tardan?");
    }

    #[test]
    fn new_requires_api_key() {
        let config = AnthropicConfig::default();
        assert!(AnthropicProvider::new(&config).is_err());
    }

    #[tokio::test]
    async fn complete_returns_parsed_reply() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_partial_json(serde_json::json!({
                "system": "prompt",
                "max_tokens": 300
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "msg_1",
                "type": "message",
                "role": "assistant",
                "model": "claude-haiku-4-5",
                "content": [{"type": "text", "text": "{\"action\":\"reply\",\"reply\":\"Sí, hacemos bordados.\"}"}],
                "stop_reason": "end_turn",
                "usage": {"input_tokens": 20, "output_tokens": 12}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = AnthropicClient::new("k", "2023-06-01", "claude-haiku-4-5".into())
            .unwrap()
            .with_base_url(server.uri());
        let provider = AnthropicProvider::with_client(client, 300);
        let reply = provider
            .complete(CompletionRequest {
                system_prompt: "prompt".into(),
                context: Vec::new(),
                user_text: "hacen bordados?".into(),
            })
            .await
            .unwrap()
            .unwrap();
        assert_eq!(reply.reply_text, "Sí, hacemos bordados.");
    }

    #[tokio::test]
    async fn complete_reports_no_answer_for_prose() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "msg_2",
                "type": "message",
                "role": "assistant",
                "model": "claude-haiku-4-5",
                "content": [{"type": "text", "text": "Claro que sí."}],
                "stop_reason": "end_turn",
                "usage": {"input_tokens": 20, "output_tokens": 4}
            })))
            .mount(&server)
            .await;

        let client = AnthropicClient::new("k", "2023-06-01", "claude-haiku-4-5".into())
            .unwrap()
            .with_base_url(server.uri());
        let provider = AnthropicProvider::with_client(client, 300);
        let reply = provider
            .complete(CompletionRequest {
                system_prompt: "prompt".into(),
                context: Vec::new(),
                user_text: "hola".into(),
            })
            .await
            .unwrap();
        assert!(reply.is_none());
    }
}
