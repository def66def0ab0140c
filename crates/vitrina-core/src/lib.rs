// SPDX-FileCopyrightText: 2026 Vitrina Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for Vitrina, a WhatsApp storefront assistant.
//!
//! This crate provides the error type, the conversation data model and the
//! adapter traits the engine talks to. Every collaborator (transport,
//! language model, snapshot store) implements a trait defined here.

pub mod error;
pub mod traits;
pub mod types;

pub use error::VitrinaError;
pub use types::{
    AdapterType, ChatRole, ChatTurn, CompletionAction, CompletionReply, CompletionRequest,
    DeliveryMethod, EngineSnapshot, HealthStatus, InboundEvent, InboundKind, LedgerMetrics,
    LedgerState, MessageId, Offer, OutboundMessage, PaymentStatus, PendingPayment, PendingQuote,
    Session, SessionState, StatusReport,
};

pub use traits::{ChannelAdapter, CompletionAdapter, PluginAdapter, SnapshotStore};

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use chrono::{TimeZone, Utc};

    use super::*;
    use crate::types::{AI_REPLY_CAP, HISTORY_CAPACITY};

    fn at(secs: i64) -> chrono::DateTime<Utc> {
        Utc.timestamp_opt(1_760_000_000 + secs, 0).unwrap()
    }

    #[test]
    fn session_state_wire_names_are_screaming_snake() {
        let json = serde_json::to_string(&SessionState::CollectingShippingInfo).unwrap();
        assert_eq!(json, "\"COLLECTING_SHIPPING_INFO\"");
        assert_eq!(
            SessionState::from_str("AWAITING_PAYMENT").unwrap(),
            SessionState::AwaitingPayment
        );
        assert_eq!(SessionState::ClosedNoStock.to_string(), "CLOSED_NO_STOCK");
    }

    #[test]
    fn payment_states_are_never_closable() {
        assert!(!SessionState::AwaitingPayment.is_closable());
        assert!(!SessionState::PaymentConfirmed.is_closable());
        assert!(SessionState::QuoteSent.is_closable());
        assert!(!SessionState::AwaitingDetails.is_closable());
    }

    #[test]
    fn critical_and_idle_states_do_not_overlap() {
        use SessionState::*;
        for state in [
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
        ] {
            assert!(!(state.is_critical() && state.is_idle()), "{state}");
        }
    }

    #[test]
    fn offer_total_adds_fee_only_when_shipping() {
        let offer = Offer {
            price: 12_500,
            shipping_fee: Some(2_500),
        };
        assert_eq!(offer.total(DeliveryMethod::Ship), 15_000);
        assert_eq!(offer.total(DeliveryMethod::Pickup), 12_500);

        let no_fee = Offer {
            price: 8_000,
            shipping_fee: None,
        };
        assert_eq!(no_fee.total(DeliveryMethod::Ship), 8_000);

        let huge = Offer {
            price: u64::MAX,
            shipping_fee: Some(1),
        };
        assert_eq!(huge.total(DeliveryMethod::Ship), u64::MAX);
    }

    #[test]
    fn reset_order_keeps_conversation_fields() {
        let mut session = Session::new("50688881234", at(0));
        session.state = SessionState::QuoteSent;
        session.catalog_sent = true;
        session.paused = true;
        session.ai_replies_used = 2;
        session.push_turn(ChatRole::User, "hola", at(1));
        session.pending_details_text = Some("talla M".into());
        session.sent_to_vendor = true;
        session.last_offer = Some(Offer {
            price: 5_000,
            shipping_fee: None,
        });
        session.delivery_method = DeliveryMethod::Ship;
        session.shipping_details = Some("San José".into());

        session.reset_order();

        assert!(session.pending_details_text.is_none());
        assert!(!session.sent_to_vendor);
        assert!(session.last_offer.is_none());
        assert_eq!(session.delivery_method, DeliveryMethod::None);
        assert!(session.shipping_details.is_none());
        assert!(session.catalog_sent);
        assert!(session.paused);
        assert_eq!(session.ai_replies_used, 2);
        assert_eq!(session.recent_messages.len(), 1);
        assert_eq!(session.created_at, at(0));
    }

    #[test]
    fn history_is_bounded() {
        let mut session = Session::new("50688881234", at(0));
        for i in 0..(HISTORY_CAPACITY + 3) {
            session.push_turn(ChatRole::User, format!("m{i}"), at(i as i64));
        }
        assert_eq!(session.recent_messages.len(), HISTORY_CAPACITY);
        assert_eq!(session.recent_messages.front().unwrap().content, "m3");
    }

    #[test]
    fn ai_budget_is_capped() {
        let mut session = Session::new("50688881234", at(0));
        session.ai_replies_used = AI_REPLY_CAP - 1;
        assert!(session.ai_budget_left());
        session.ai_replies_used = AI_REPLY_CAP;
        assert!(!session.ai_budget_left());
    }

    #[test]
    fn ledger_state_remaining_saturates() {
        let state = LedgerState {
            month_key: "2026-10".into(),
            monthly_allowance: 5,
            used: 9,
            bonus_added: 2,
            metrics: LedgerMetrics::default(),
        };
        assert_eq!(state.remaining(), 0);

        let state = LedgerState {
            monthly_allowance: u64::MAX,
            used: 1,
            bonus_added: 5,
            ..state
        };
        assert_eq!(state.remaining(), u64::MAX - 1);
    }

    #[test]
    fn session_survives_json_round_trip() {
        let mut session = Session::new("50688881234", at(0));
        session.state = SessionState::AwaitingPayment;
        session.pending_payment = Some(PendingPayment {
            expected_amount: 15_000,
            status: PaymentStatus::Pending,
            reference: "A1B2C3".into(),
            created_at: at(10),
            confirmed_at: None,
        });
        let json = serde_json::to_string(&session).unwrap();
        let back: Session = serde_json::from_str(&json).unwrap();
        assert_eq!(back, session);
    }

    #[test]
    fn completion_action_wire_names() {
        let reply: CompletionReply =
            serde_json::from_str(r#"{"action":"ask_photo","reply_text":"Mandame foto"}"#).unwrap();
        assert_eq!(reply.action, CompletionAction::AskPhoto);
    }

    #[test]
    fn all_trait_modules_are_exported() {
        fn _assert_plugin_adapter<T: PluginAdapter>() {}
        fn _assert_channel_adapter<T: ChannelAdapter>() {}
        fn _assert_completion_adapter<T: CompletionAdapter>() {}
        fn _assert_snapshot_store<T: SnapshotStore>() {}
    }

    #[test]
    fn vitrina_error_variants_render() {
        let err = VitrinaError::UnknownCustomer {
            customer_id: "50688881234".into(),
        };
        assert_eq!(err.to_string(), "unknown customer: 50688881234");
        let err = VitrinaError::TokensExhausted {
            message: "0 left".into(),
        };
        assert!(err.to_string().contains("tokens exhausted"));
    }
}
