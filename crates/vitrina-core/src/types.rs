// SPDX-FileCopyrightText: 2026 Vitrina Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Common types shared by the engine, the adapters and the ops surface.

use std::collections::{BTreeMap, VecDeque};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Number of chat turns kept per session for language-model context.
pub const HISTORY_CAPACITY: usize = 5;

/// Maximum language-model replies a single session may receive.
pub const AI_REPLY_CAP: u8 = 3;

/// Unique identifier for an outbound message, as assigned by the transport.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageId(pub String);

/// Health status reported by adapter health checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthStatus {
    /// Adapter is fully operational.
    Healthy,
    /// Adapter is operational but experiencing issues.
    Degraded(String),
    /// Adapter is not operational.
    Unhealthy(String),
}

/// Identifies the kind of adapter.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
pub enum AdapterType {
    Channel,
    Provider,
    Storage,
    Observability,
}

/// Lifecycle state of a customer conversation.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Display,
    EnumString,
    Serialize,
    Deserialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionState {
    New,
    AwaitingDetails,
    QuoteRequested,
    QuoteSent,
    ChoosingDeliveryMethod,
    CollectingShippingInfo,
    CollectingPickupInfo,
    AwaitingPayment,
    PaymentConfirmed,
    ClosedTimeout,
    ClosedNoInterest,
    ClosedNoStock,
}

impl SessionState {
    /// Closed sessions reopen on the next customer message.
    pub fn is_closed(self) -> bool {
        matches!(
            self,
            Self::ClosedTimeout | Self::ClosedNoInterest | Self::ClosedNoStock
        )
    }

    /// States where a short greeting gets the greeting reply.
    pub fn is_idle(self) -> bool {
        matches!(
            self,
            Self::New | Self::AwaitingDetails | Self::PaymentConfirmed
        )
    }

    /// States where the language model is never consulted.
    pub fn is_critical(self) -> bool {
        matches!(
            self,
            Self::QuoteRequested
                | Self::ChoosingDeliveryMethod
                | Self::CollectingShippingInfo
                | Self::CollectingPickupInfo
                | Self::AwaitingPayment
        )
    }

    /// States the inactivity close timer applies to.
    ///
    /// Sessions with a payment pending or confirmed are never closed for inactivity.
    pub fn is_closable(self) -> bool {
        matches!(
            self,
            Self::QuoteRequested
                | Self::QuoteSent
                | Self::ChoosingDeliveryMethod
                | Self::CollectingShippingInfo
                | Self::CollectingPickupInfo
        )
    }
}

/// How the customer wants to receive the product.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum DeliveryMethod {
    #[default]
    None,
    Ship,
    Pickup,
}

/// A price offer the vendor sent for the customer's product.
///
/// Amounts are whole colones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Offer {
    pub price: u64,
    pub shipping_fee: Option<u64>,
}

impl Offer {
    /// Amount due for the given delivery method.
    pub fn total(&self, method: DeliveryMethod) -> u64 {
        match method {
            DeliveryMethod::Ship => self.price.saturating_add(self.shipping_fee.unwrap_or(0)),
            DeliveryMethod::Pickup | DeliveryMethod::None => self.price,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum PaymentStatus {
    Pending,
    Confirmed,
}

/// A SINPE payment the customer has been asked to make.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingPayment {
    pub expected_amount: u64,
    pub status: PaymentStatus,
    /// Short upper-case hex code the customer puts in the transfer description.
    pub reference: String,
    pub created_at: DateTime<Utc>,
    /// Set once the vendor (or a matched SINPE notification) confirms the
    /// transfer. The order-reset delay counts from here.
    #[serde(default)]
    pub confirmed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
}

/// One entry of the bounded per-session chat history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: ChatRole,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

/// Per-customer conversation state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    /// Customer phone number, digits only.
    pub id: String,
    pub state: SessionState,
    pub created_at: DateTime<Utc>,
    pub last_activity_at: DateTime<Utc>,
    pub pending_image_ref: Option<String>,
    pub pending_details_text: Option<String>,
    pub sent_to_vendor: bool,
    pub last_offer: Option<Offer>,
    pub delivery_method: DeliveryMethod,
    pub pending_payment: Option<PendingPayment>,
    pub shipping_details: Option<String>,
    pub catalog_sent: bool,
    pub paused: bool,
    pub ai_replies_used: u8,
    pub recent_messages: VecDeque<ChatTurn>,
}

impl Session {
    pub fn new(id: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            state: SessionState::New,
            created_at: now,
            last_activity_at: now,
            pending_image_ref: None,
            pending_details_text: None,
            sent_to_vendor: false,
            last_offer: None,
            delivery_method: DeliveryMethod::None,
            pending_payment: None,
            shipping_details: None,
            catalog_sent: false,
            paused: false,
            ai_replies_used: 0,
            recent_messages: VecDeque::with_capacity(HISTORY_CAPACITY),
        }
    }

    /// Clears every order-scoped field.
    ///
    /// Conversation-scoped fields (catalog flag, pause flag, language-model
    /// counters and history) survive. The caller sets the new state.
    pub fn reset_order(&mut self) {
        self.pending_image_ref = None;
        self.pending_details_text = None;
        self.sent_to_vendor = false;
        self.last_offer = None;
        self.delivery_method = DeliveryMethod::None;
        self.pending_payment = None;
        self.shipping_details = None;
    }

    /// Appends a chat turn, evicting the oldest past [`HISTORY_CAPACITY`].
    pub fn push_turn(&mut self, role: ChatRole, content: impl Into<String>, now: DateTime<Utc>) {
        if self.recent_messages.len() == HISTORY_CAPACITY {
            self.recent_messages.pop_front();
        }
        self.recent_messages.push_back(ChatTurn {
            role,
            content: content.into(),
            timestamp: now,
        });
    }

    /// Whether the session may still receive a language-model reply.
    pub fn ai_budget_left(&self) -> bool {
        self.ai_replies_used < AI_REPLY_CAP
    }
}

/// What arrived from the customer or vendor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundKind {
    Text {
        text: String,
    },
    Image {
        image_ref: String,
        caption: Option<String>,
    },
}

/// A normalized inbound message from the messaging transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundEvent {
    /// Sender phone number, digits only.
    pub sender_id: String,
    pub kind: InboundKind,
}

impl InboundEvent {
    pub fn text(sender_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            sender_id: sender_id.into(),
            kind: InboundKind::Text { text: text.into() },
        }
    }

    pub fn image(
        sender_id: impl Into<String>,
        image_ref: impl Into<String>,
        caption: Option<String>,
    ) -> Self {
        Self {
            sender_id: sender_id.into(),
            kind: InboundKind::Image {
                image_ref: image_ref.into(),
                caption,
            },
        }
    }
}

/// An outbound message to be delivered by the messaging transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    pub recipient_id: String,
    pub body: String,
    /// Media to forward with the body as its caption.
    pub image_ref: Option<String>,
}

impl OutboundMessage {
    pub fn text(recipient_id: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            recipient_id: recipient_id.into(),
            body: body.into(),
            image_ref: None,
        }
    }

    pub fn image(
        recipient_id: impl Into<String>,
        image_ref: impl Into<String>,
        caption: impl Into<String>,
    ) -> Self {
        Self {
            recipient_id: recipient_id.into(),
            body: caption.into(),
            image_ref: Some(image_ref.into()),
        }
    }
}

/// Input for the language-model fallback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionRequest {
    pub system_prompt: String,
    /// Prior turns, oldest first.
    pub context: Vec<ChatTurn>,
    pub user_text: String,
}

/// What the language model suggests doing alongside its reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum CompletionAction {
    Reply,
    AskPhoto,
    Handoff,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionReply {
    pub action: CompletionAction,
    pub reply_text: String,
}

/// A quote request forwarded to the vendor and not yet answered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingQuote {
    pub customer_id: String,
    pub details_text: String,
    pub created_at: DateTime<Utc>,
}

/// Cumulative business counters. Never reset on month rollover.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerMetrics {
    pub quotes_requested: u64,
    pub quotes_sent: u64,
    pub no_stock: u64,
    pub intent_yes: u64,
    pub intent_no: u64,
    pub delivery_ship: u64,
    pub delivery_pickup: u64,
    pub payments_requested: u64,
    pub payments_confirmed: u64,
    pub payments_auto_matched: u64,
    pub sessions_closed: u64,
    pub ai_replies: u64,
    pub greetings: u64,
}

/// Persistable state of the monthly token allowance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerState {
    /// Calendar month the counters belong to, formatted `YYYY-MM`.
    pub month_key: String,
    pub monthly_allowance: u64,
    pub used: u64,
    pub bonus_added: u64,
    pub metrics: LedgerMetrics,
}

impl LedgerState {
    pub fn remaining(&self) -> u64 {
        self.monthly_allowance
            .saturating_add(self.bonus_added)
            .saturating_sub(self.used)
    }
}

/// Everything the engine needs to resume after a restart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineSnapshot {
    pub sessions: Vec<Session>,
    pub ledger: LedgerState,
    pub taken_at: DateTime<Utc>,
}

/// Point-in-time summary served by the ops API and the `status` command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusReport {
    pub sessions_total: usize,
    pub sessions_by_state: BTreeMap<String, usize>,
    pub paused_sessions: usize,
    pub pending_quotes: usize,
    pub tokens_remaining: u64,
    pub ledger: LedgerState,
}
