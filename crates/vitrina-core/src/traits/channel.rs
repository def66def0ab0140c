// SPDX-FileCopyrightText: 2026 Vitrina Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Messaging transport trait (WhatsApp Cloud API in production, a mock in tests).

use async_trait::async_trait;

use crate::error::VitrinaError;
use crate::traits::adapter::PluginAdapter;
use crate::types::{MessageId, OutboundMessage};

/// Outbound half of the messaging transport.
///
/// Inbound traffic arrives through the webhook and is handed to the engine
/// directly, so the transport only needs to deliver.
#[async_trait]
pub trait ChannelAdapter: PluginAdapter {
    /// Delivers one message. Failures are reported, never retried here.
    async fn send(&self, msg: OutboundMessage) -> Result<MessageId, VitrinaError>;
}
