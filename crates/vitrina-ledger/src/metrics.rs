// SPDX-FileCopyrightText: 2026 Vitrina Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Named business counters.

use strum::{Display, EnumIter};
use vitrina_core::LedgerMetrics;

/// One countable business event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter)]
#[strum(serialize_all = "snake_case")]
pub enum LedgerMetric {
    QuoteRequested,
    QuoteSent,
    NoStock,
    IntentYes,
    IntentNo,
    DeliveryShip,
    DeliveryPickup,
    PaymentRequested,
    PaymentConfirmed,
    PaymentAutoMatched,
    SessionClosed,
    AiReply,
    Greeting,
}

impl LedgerMetric {
    fn slot(self, metrics: &mut LedgerMetrics) -> &mut u64 {
        match self {
            Self::QuoteRequested => &mut metrics.quotes_requested,
            Self::QuoteSent => &mut metrics.quotes_sent,
            Self::NoStock => &mut metrics.no_stock,
            Self::IntentYes => &mut metrics.intent_yes,
            Self::IntentNo => &mut metrics.intent_no,
            Self::DeliveryShip => &mut metrics.delivery_ship,
            Self::DeliveryPickup => &mut metrics.delivery_pickup,
            Self::PaymentRequested => &mut metrics.payments_requested,
            Self::PaymentConfirmed => &mut metrics.payments_confirmed,
            Self::PaymentAutoMatched => &mut metrics.payments_auto_matched,
            Self::SessionClosed => &mut metrics.sessions_closed,
            Self::AiReply => &mut metrics.ai_replies,
            Self::Greeting => &mut metrics.greetings,
        }
    }

    pub(crate) fn bump(self, metrics: &mut LedgerMetrics) {
        *self.slot(metrics) += 1;
    }

    /// Current value of this counter.
    pub fn read(self, metrics: &LedgerMetrics) -> u64 {
        match self {
            Self::QuoteRequested => metrics.quotes_requested,
            Self::QuoteSent => metrics.quotes_sent,
            Self::NoStock => metrics.no_stock,
            Self::IntentYes => metrics.intent_yes,
            Self::IntentNo => metrics.intent_no,
            Self::DeliveryShip => metrics.delivery_ship,
            Self::DeliveryPickup => metrics.delivery_pickup,
            Self::PaymentRequested => metrics.payments_requested,
            Self::PaymentConfirmed => metrics.payments_confirmed,
            Self::PaymentAutoMatched => metrics.payments_auto_matched,
            Self::SessionClosed => metrics.sessions_closed,
            Self::AiReply => metrics.ai_replies,
            Self::Greeting => metrics.greetings,
        }
    }
}
