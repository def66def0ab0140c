// SPDX-FileCopyrightText: 2026 Vitrina Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Webhook payload normalization and the subscription handshake.

use tracing::{debug, warn};
use vitrina_core::{InboundEvent, VitrinaError};

use crate::types::{WebhookMessage, WebhookPayload};

/// Sender ids are international numbers without `+`.
pub fn is_valid_sender(id: &str) -> bool {
    (8..=15).contains(&id.len()) && id.bytes().all(|b| b.is_ascii_digit())
}

/// Extracts the text and image messages from a webhook delivery.
///
/// Status updates, unsupported message types and messages from malformed
/// sender ids are skipped. Only an unparseable body is an error.
pub fn parse_payload(body: &[u8]) -> Result<Vec<InboundEvent>, VitrinaError> {
    let payload: WebhookPayload =
        serde_json::from_slice(body).map_err(|e| VitrinaError::Channel {
            message: format!("malformed webhook payload: {e}"),
            source: Some(Box::new(e)),
        })?;

    let events = payload
        .entry
        .into_iter()
        .flat_map(|entry| entry.changes)
        .filter(|change| change.field == "messages")
        .flat_map(|change| change.value.messages)
        .filter_map(normalize)
        .collect();
    Ok(events)
}

fn normalize(message: WebhookMessage) -> Option<InboundEvent> {
    if !is_valid_sender(&message.from) {
        warn!(sender = %message.from, "dropping message from malformed sender id");
        return None;
    }
    match (message.kind.as_str(), message.text, message.image) {
        ("text", Some(text), _) if !text.body.trim().is_empty() => {
            Some(InboundEvent::text(message.from, text.body))
        }
        ("image", _, Some(image)) => {
            let caption = image.caption.filter(|c| !c.trim().is_empty());
            Some(InboundEvent::image(message.from, image.id, caption))
        }
        (kind, ..) => {
            debug!(kind, id = %message.id, "ignoring unsupported message");
            None
        }
    }
}

/// Answers the `GET /webhook` handshake.
///
/// Returns the challenge to echo back when `mode` is `subscribe` and the
/// token matches. With no token configured every handshake is refused.
pub fn verify_subscription(
    mode: Option<&str>,
    token: Option<&str>,
    challenge: Option<&str>,
    expected_token: Option<&str>,
) -> Option<String> {
    let expected = expected_token.filter(|t| !t.is_empty())?;
    if mode == Some("subscribe") && token == Some(expected) {
        challenge.map(str::to_string)
    } else {
        None
    }
}
