// SPDX-FileCopyrightText: 2026 Vitrina Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! WhatsApp channel adapter for Vitrina.
//!
//! Implements [`ChannelAdapter`] for the WhatsApp Cloud API. Inbound traffic
//! arrives through the webhook served by the gateway; this crate owns the
//! payload normalization ([`webhook::parse_payload`]) and the subscription
//! handshake check ([`webhook::verify_subscription`]).

pub mod types;
pub mod webhook;

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use tracing::debug;
use vitrina_config::model::WhatsAppConfig;
use vitrina_core::traits::{ChannelAdapter, PluginAdapter};
use vitrina_core::types::{AdapterType, HealthStatus, MessageId, OutboundMessage};
use vitrina_core::VitrinaError;

use crate::types::{GraphErrorResponse, ImageBody, SendContent, SendRequest, SendResponse, TextBody};

/// WhatsApp Cloud API channel.
///
/// Delivery is a single attempt per message: the engine treats sends as
/// best-effort and never retries.
#[derive(Debug, Clone)]
pub struct WhatsAppChannel {
    client: reqwest::Client,
    messages_url: String,
}

impl WhatsAppChannel {
    /// Creates a new WhatsApp channel.
    ///
    /// Requires `config.access_token` and `config.phone_number_id`.
    pub fn new(config: &WhatsAppConfig) -> Result<Self, VitrinaError> {
        let token = config
            .access_token
            .as_deref()
            .filter(|t| !t.is_empty())
            .ok_or_else(|| {
                VitrinaError::Config("whatsapp.access_token is required for delivery".into())
            })?;
        let phone_number_id = config.phone_number_id.as_deref().ok_or_else(|| {
            VitrinaError::Config("whatsapp.phone_number_id is required for delivery".into())
        })?;

        let mut headers = HeaderMap::new();
        let mut bearer = HeaderValue::from_str(&format!("Bearer {token}")).map_err(|e| {
            VitrinaError::Config(format!("invalid WhatsApp access token header value: {e}"))
        })?;
        bearer.set_sensitive(true);
        headers.insert(AUTHORIZATION, bearer);

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| VitrinaError::Channel {
                message: format!("failed to build HTTP client: {e}"),
                source: Some(Box::new(e)),
            })?;

        let messages_url = format!(
            "{}/{}/{}/messages",
            config.base_url.trim_end_matches('/'),
            config.api_version,
            phone_number_id
        );
        Ok(Self {
            client,
            messages_url,
        })
    }

    pub fn messages_url(&self) -> &str {
        &self.messages_url
    }
}

#[async_trait]
impl PluginAdapter for WhatsAppChannel {
    fn name(&self) -> &str {
        "whatsapp"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Channel
    }

    async fn health_check(&self) -> Result<HealthStatus, VitrinaError> {
        // No probe: the Graph API has no free endpoint.
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), VitrinaError> {
        debug!("WhatsApp channel shutting down");
        Ok(())
    }
}

#[async_trait]
impl ChannelAdapter for WhatsAppChannel {
    async fn send(&self, msg: OutboundMessage) -> Result<MessageId, VitrinaError> {
        let content = match msg.image_ref.as_deref() {
            Some(id) => SendContent::Image {
                image: ImageBody {
                    id,
                    caption: Some(msg.body.as_str()).filter(|c| !c.is_empty()),
                },
            },
            None => SendContent::Text {
                text: TextBody {
                    preview_url: true,
                    body: &msg.body,
                },
            },
        };
        let request = SendRequest {
            messaging_product: "whatsapp",
            recipient_type: "individual",
            to: &msg.recipient_id,
            content,
        };

        let response = self
            .client
            .post(&self.messages_url)
            .json(&request)
            .send()
            .await
            .map_err(|e| VitrinaError::Channel {
                message: format!("HTTP request failed: {e}"),
                source: Some(Box::new(e)),
            })?;

        let status = response.status();
        let body = response.text().await.map_err(|e| VitrinaError::Channel {
            message: format!("failed to read response body: {e}"),
            source: Some(Box::new(e)),
        })?;
        debug!(status = %status, recipient = %msg.recipient_id, "send response received");

        if !status.is_success() {
            let message = match serde_json::from_str::<GraphErrorResponse>(&body) {
                Ok(err) => format!(
                    "WhatsApp API error ({} {}): {}",
                    err.error.type_, err.error.code, err.error.message
                ),
                Err(_) => format!("WhatsApp API returned {status}: {body}"),
            };
            return Err(VitrinaError::Channel {
                message,
                source: None,
            });
        }

        let parsed: SendResponse =
            serde_json::from_str(&body).map_err(|e| VitrinaError::Channel {
                message: format!("failed to parse send response: {e}"),
                source: Some(Box::new(e)),
            })?;
        parsed
            .messages
            .into_iter()
            .next()
            .map(|m| MessageId(m.id))
            .ok_or_else(|| VitrinaError::Channel {
                message: "send response carried no message id".into(),
                source: None,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config(base_url: &str) -> WhatsAppConfig {
        WhatsAppConfig {
            access_token: Some("test-token".into()),
            phone_number_id: Some("999".into()),
            base_url: base_url.to_string(),
            ..WhatsAppConfig::default()
        }
    }

    fn accepted(id: &str) -> ResponseTemplate {
        ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "messaging_product": "whatsapp",
            "contacts": [{"input": "50688881234", "wa_id": "50688881234"}],
            "messages": [{"id": id}]
        }))
    }

    #[test]
    fn new_requires_credentials() {
        let mut cfg = config("http://localhost");
        cfg.access_token = None;
        assert!(WhatsAppChannel::new(&cfg).is_err());

        let mut cfg = config("http://localhost");
        cfg.phone_number_id = None;
        assert!(WhatsAppChannel::new(&cfg).is_err());
    }

    #[test]
    fn messages_url_includes_version_and_number() {
        let channel = WhatsAppChannel::new(&config("https://graph.example.com/")).unwrap();
        assert_eq!(
            channel.messages_url(),
            "https://graph.example.com/v21.0/999/messages"
        );
    }

    #[tokio::test]
    async fn send_text_posts_bearer_authenticated_request() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v21.0/999/messages"))
            .and(header("authorization", "Bearer test-token"))
            .and(body_partial_json(serde_json::json!({
                "messaging_product": "whatsapp",
                "to": "50688881234",
                "type": "text",
                "text": {"body": "hola"}
            })))
            .respond_with(accepted("wamid.OK"))
            .expect(1)
            .mount(&server)
            .await;

        let channel = WhatsAppChannel::new(&config(&server.uri())).unwrap();
        let id = channel
            .send(OutboundMessage::text("50688881234", "hola"))
            .await
            .unwrap();
        assert_eq!(id.0, "wamid.OK");
    }

    #[tokio::test]
    async fn send_image_forwards_media_id_with_caption() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v21.0/999/messages"))
            .and(body_partial_json(serde_json::json!({
                "type": "image",
                "image": {"id": "media-1", "caption": "talla M"}
            })))
            .respond_with(accepted("wamid.IMG"))
            .expect(1)
            .mount(&server)
            .await;

        let channel = WhatsAppChannel::new(&config(&server.uri())).unwrap();
        let id = channel
            .send(OutboundMessage::image("50670000000", "media-1", "talla M"))
            .await
            .unwrap();
        assert_eq!(id.0, "wamid.IMG");
    }

    #[tokio::test]
    async fn graph_error_is_reported() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401).set_body_json(serde_json::json!({
                "error": {"message": "Invalid OAuth access token", "type": "OAuthException", "code": 190}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let channel = WhatsAppChannel::new(&config(&server.uri())).unwrap();
        let err = channel
            .send(OutboundMessage::text("50688881234", "hola"))
            .await
            .unwrap_err()
            .to_string();
        assert!(err.contains("OAuthException"), "got: {err}");
        assert!(err.contains("190"), "got: {err}");
    }
}
