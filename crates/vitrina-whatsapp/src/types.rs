// SPDX-FileCopyrightText: 2026 Vitrina Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Wire types for the WhatsApp Cloud API.
//!
//! Only the fields Vitrina reads are modelled; everything else in the
//! webhook and send payloads is ignored by serde.

use serde::{Deserialize, Serialize};

// --- outbound ---

/// Body of `POST /{version}/{phone_number_id}/messages`.
#[derive(Debug, Clone, Serialize)]
pub struct SendRequest<'a> {
    pub messaging_product: &'static str,
    pub recipient_type: &'static str,
    pub to: &'a str,
    #[serde(flatten)]
    pub content: SendContent<'a>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SendContent<'a> {
    Text { text: TextBody<'a> },
    Image { image: ImageBody<'a> },
}

#[derive(Debug, Clone, Serialize)]
pub struct TextBody<'a> {
    pub preview_url: bool,
    pub body: &'a str,
}

/// An already-uploaded media object re-sent by id.
#[derive(Debug, Clone, Serialize)]
pub struct ImageBody<'a> {
    pub id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub caption: Option<&'a str>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SendResponse {
    #[serde(default)]
    pub messages: Vec<SentMessage>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SentMessage {
    pub id: String,
}

/// Error envelope returned by the Graph API on non-2xx responses.
#[derive(Debug, Clone, Deserialize)]
pub struct GraphErrorResponse {
    pub error: GraphError,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GraphError {
    pub message: String,
    #[serde(rename = "type", default)]
    pub type_: String,
    #[serde(default)]
    pub code: i64,
}

// --- inbound webhook ---

#[derive(Debug, Clone, Deserialize)]
pub struct WebhookPayload {
    #[serde(default)]
    pub object: String,
    #[serde(default)]
    pub entry: Vec<WebhookEntry>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebhookEntry {
    #[serde(default)]
    pub changes: Vec<WebhookChange>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebhookChange {
    #[serde(default)]
    pub field: String,
    pub value: ChangeValue,
}

/// A change carries either customer messages or delivery statuses.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChangeValue {
    #[serde(default)]
    pub messages: Vec<WebhookMessage>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebhookMessage {
    pub from: String,
    #[serde(default)]
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub text: Option<WebhookText>,
    #[serde(default)]
    pub image: Option<WebhookImage>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebhookText {
    pub body: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebhookImage {
    pub id: String,
    #[serde(default)]
    pub caption: Option<String>,
}
