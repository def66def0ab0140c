// SPDX-FileCopyrightText: 2026 Vitrina Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The conversation engine.
//!
//! [`ConversationEngine`] owns all conversation state (sessions, the quote
//! registry, the account ledger, phrase rotation and open photo bursts) and
//! is driven one event at a time. Handlers do no I/O. Each returns the
//! [`Effect`]s the runtime must carry out, in order: messages to send, timers
//! to arm or cancel, and language-model calls to start.
//!
//! Customer text runs through an ordered rule chain ([`CUSTOMER_RULES`]).
//! State-gated rules come first, then payment claims, FAQ answers, greetings,
//! purchase intent, the language model and finally a default reply.

use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};
use vitrina_config::VitrinaConfig;
use vitrina_config::model::{StoreConfig, TokenConfig};
use vitrina_core::{
    ChatRole, CompletionAction, CompletionReply, CompletionRequest, DeliveryMethod,
    EngineSnapshot, InboundEvent, InboundKind, LedgerState, Offer, OutboundMessage,
    PaymentStatus, PendingPayment, PendingQuote, Session, SessionState, StatusReport,
    VitrinaError,
};
use vitrina_ledger::{AccountLedger, LedgerMetric};

use crate::burst::{BurstCoalescer, BurstImage};
use crate::intent;
use crate::phrases::{PhraseCategory, PhrasePool};
use crate::quotes::QuoteRegistry;
use crate::replies;
use crate::sinpe::{self, MatchOutcome};
use crate::store::{SessionStore, TimerDelays};
use crate::timers::TimerKind;
use crate::vendor::{self, VendorAction, VendorCommand};

/// Normalized messages shorter than this never reach the language model.
const MIN_COMPLETION_CHARS: usize = 12;

/// Details text used when an uncaptioned image is forwarded as is.
const NO_DETAILS: &str = "(sin detalles)";

/// Work the runtime performs on the engine's behalf.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    Send(OutboundMessage),
    ArmTimer {
        customer_id: String,
        timer: TimerKind,
        after: Duration,
    },
    CancelTimer {
        customer_id: String,
        timer: TimerKind,
    },
    /// Ask the language model; the answer comes back through
    /// [`ConversationEngine::handle_completion`].
    RequestCompletion {
        customer_id: String,
        request: CompletionRequest,
    },
}

/// Engine inputs derived from configuration.
#[derive(Debug, Clone)]
pub struct EngineSettings {
    /// Vendor phone, digits only. Vendor notices are dropped when unset.
    pub vendor_id: Option<String>,
    pub store: StoreConfig,
    pub tokens: TokenConfig,
    pub burst_quiet: Duration,
    pub delays: TimerDelays,
    pub auto_payment_detection: bool,
    pub llm_enabled: bool,
    pub system_prompt: String,
}

impl EngineSettings {
    pub fn from_config(config: &VitrinaConfig) -> Self {
        let timers = &config.timers;
        let vendor_id = config
            .vendor
            .phone
            .as_deref()
            .map(|phone| phone.chars().filter(char::is_ascii_digit).collect::<String>())
            .filter(|phone| !phone.is_empty());

        Self {
            vendor_id,
            store: config.store.clone(),
            tokens: config.tokens.clone(),
            burst_quiet: Duration::from_secs(timers.burst_quiet_secs),
            delays: TimerDelays {
                session_timeout: Duration::from_secs(timers.session_timeout_secs),
                reminder: (timers.reminder_secs > 0)
                    .then(|| Duration::from_secs(timers.reminder_secs)),
                sinpe_wait: config
                    .payment
                    .auto_detection
                    .then(|| Duration::from_secs(timers.sinpe_wait_secs)),
                order_reset: Duration::from_secs(timers.order_reset_secs),
            },
            auto_payment_detection: config.payment.auto_detection,
            llm_enabled: config
                .anthropic
                .api_key
                .as_deref()
                .is_some_and(|key| !key.trim().is_empty()),
            system_prompt: config
                .anthropic
                .system_prompt
                .clone()
                .unwrap_or_else(|| replies::default_system_prompt(&config.store)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Rule {
    DetailsCollection,
    DeliveryChoice,
    PaymentClaim,
    Faq,
    Greeting,
    PendingImageDetails,
    PurchaseIntent,
    LanguageModel,
    Fallback,
}

/// Customer text rules, tried in order until one handles the message.
const CUSTOMER_RULES: &[Rule] = &[
    Rule::DetailsCollection,
    Rule::DeliveryChoice,
    Rule::PaymentClaim,
    Rule::Faq,
    Rule::Greeting,
    Rule::PendingImageDetails,
    Rule::PurchaseIntent,
    Rule::LanguageModel,
    Rule::Fallback,
];

struct TextContext<'a> {
    customer_id: &'a str,
    raw: &'a str,
    normalized: &'a str,
    now: DateTime<Utc>,
}

/// Collects effects for one event.
struct Outbox {
    vendor_id: Option<String>,
    effects: Vec<Effect>,
}

impl Outbox {
    fn customer(&mut self, customer_id: &str, body: impl Into<String>) {
        self.effects
            .push(Effect::Send(OutboundMessage::text(customer_id, body)));
    }

    fn vendor(&mut self, body: impl Into<String>) {
        match &self.vendor_id {
            Some(vendor) => self
                .effects
                .push(Effect::Send(OutboundMessage::text(vendor.clone(), body))),
            None => debug!("no vendor configured, dropping vendor notice"),
        }
    }

    fn vendor_image(&mut self, image_ref: &str, caption: impl Into<String>) {
        match &self.vendor_id {
            Some(vendor) => self.effects.push(Effect::Send(OutboundMessage::image(
                vendor.clone(),
                image_ref,
                caption,
            ))),
            None => debug!("no vendor configured, dropping forwarded image"),
        }
    }

    fn arm(&mut self, customer_id: &str, timer: TimerKind, after: Duration) {
        self.effects.push(Effect::ArmTimer {
            customer_id: customer_id.to_string(),
            timer,
            after,
        });
    }

    fn cancel(&mut self, customer_id: &str, timer: TimerKind) {
        self.effects.push(Effect::CancelTimer {
            customer_id: customer_id.to_string(),
            timer,
        });
    }

    fn complete(&mut self, customer_id: &str, request: CompletionRequest) {
        self.effects.push(Effect::RequestCompletion {
            customer_id: customer_id.to_string(),
            request,
        });
    }

    fn finish(self) -> Vec<Effect> {
        self.effects
    }
}

fn transition(session: &mut Session, to: SessionState) {
    if session.state == to {
        return;
    }
    info!(customer = %session.id, from = %session.state, to = %to, "session transition");
    session.state = to;
    #[cfg(feature = "prometheus")]
    vitrina_prometheus::record_transition(&to.to_string());
}

fn collection_state(method: DeliveryMethod) -> SessionState {
    match method {
        DeliveryMethod::Pickup => SessionState::CollectingPickupInfo,
        DeliveryMethod::Ship | DeliveryMethod::None => SessionState::CollectingShippingInfo,
    }
}

fn delivery_metric(method: DeliveryMethod) -> LedgerMetric {
    match method {
        DeliveryMethod::Pickup => LedgerMetric::DeliveryPickup,
        DeliveryMethod::Ship | DeliveryMethod::None => LedgerMetric::DeliveryShip,
    }
}

fn collection_prompt(
    phrases: &mut PhrasePool,
    store: &StoreConfig,
    customer_id: &str,
    method: DeliveryMethod,
    offer: Option<Offer>,
) -> String {
    match method {
        DeliveryMethod::Pickup => {
            replies::ask_pickup(phrases.next(PhraseCategory::AskPickupInfo, customer_id), store)
        }
        DeliveryMethod::Ship | DeliveryMethod::None => {
            let intro = phrases.next(PhraseCategory::AskShippingInfo, customer_id);
            match offer {
                Some(offer) => replies::ask_shipping(intro, &offer),
                None => intro.to_string(),
            }
        }
    }
}

fn elapsed_since(since: DateTime<Utc>, now: DateTime<Utc>) -> Duration {
    (now - since).to_std().unwrap_or(Duration::ZERO)
}

/// Conversation state machine for one store.
pub struct ConversationEngine {
    settings: EngineSettings,
    sessions: SessionStore,
    quotes: QuoteRegistry,
    ledger: AccountLedger,
    phrases: PhrasePool,
    bursts: BurstCoalescer,
}

impl ConversationEngine {
    pub fn new(settings: EngineSettings, now: DateTime<Utc>) -> Self {
        Self::with_phrases(settings, PhrasePool::new(), now)
    }

    /// An engine with a caller-supplied phrase pool (seeded in tests).
    pub fn with_phrases(settings: EngineSettings, phrases: PhrasePool, now: DateTime<Utc>) -> Self {
        let ledger = AccountLedger::new(&settings.tokens, now);
        Self {
            settings,
            sessions: SessionStore::new(),
            quotes: QuoteRegistry::new(),
            ledger,
            phrases,
            bursts: BurstCoalescer::new(),
        }
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    pub fn session(&self, customer_id: &str) -> Option<&Session> {
        self.sessions.get(customer_id)
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    pub fn pending_quotes(&self) -> Vec<PendingQuote> {
        self.quotes.list()
    }

    pub fn status(&mut self, now: DateTime<Utc>) -> StatusReport {
        let ledger = self.ledger.snapshot(now);
        StatusReport {
            sessions_total: self.sessions.len(),
            sessions_by_state: self.sessions.counts_by_state(),
            paused_sessions: self.sessions.paused_count(),
            pending_quotes: self.quotes.len(),
            tokens_remaining: ledger.remaining(),
            ledger,
        }
    }

    /// Adds bonus tokens for the current month.
    pub fn top_up(
        &mut self,
        tokens: u64,
        now: DateTime<Utc>,
    ) -> Result<LedgerState, VitrinaError> {
        self.ledger.add_bonus(tokens, now)?;
        Ok(self.ledger.snapshot(now))
    }

    /// Serializable view of the engine. Timers and open bursts are excluded.
    pub fn snapshot(&mut self, now: DateTime<Utc>) -> EngineSnapshot {
        EngineSnapshot {
            sessions: self.sessions.snapshot(),
            ledger: self.ledger.snapshot(now),
            taken_at: now,
        }
    }

    /// Replaces all state with a snapshot and returns the timers to re-arm.
    pub fn restore(&mut self, snapshot: EngineSnapshot, now: DateTime<Utc>) -> Vec<Effect> {
        let EngineSnapshot {
            sessions,
            ledger,
            taken_at,
        } = snapshot;
        self.sessions = SessionStore::restore(sessions);
        self.quotes = QuoteRegistry::rebuild(self.sessions.iter());
        self.ledger = AccountLedger::restore(&self.settings.tokens, ledger, now);
        self.bursts = BurstCoalescer::new();
        info!(
            sessions = self.sessions.len(),
            pending_quotes = self.quotes.len(),
            %taken_at,
            "engine state restored"
        );

        self.sessions
            .rearm_plan(now, &self.settings.delays)
            .into_iter()
            .map(|(customer_id, timer, after)| Effect::ArmTimer {
                customer_id,
                timer,
                after,
            })
            .collect()
    }

    pub fn handle_inbound(&mut self, event: InboundEvent, now: DateTime<Utc>) -> Vec<Effect> {
        let InboundEvent { sender_id, kind } = event;
        if self.settings.vendor_id.as_deref() == Some(sender_id.as_str()) {
            return match kind {
                InboundKind::Text { text } => self.vendor_text(&text, now),
                InboundKind::Image { .. } => {
                    debug!("ignoring image from vendor");
                    Vec::new()
                }
            };
        }

        match kind {
            InboundKind::Text { text } => self.customer_text(&sender_id, &text, now),
            InboundKind::Image { image_ref, caption } => {
                self.customer_image(&sender_id, image_ref, caption, now)
            }
        }
    }

    pub fn handle_timer(
        &mut self,
        customer_id: &str,
        timer: TimerKind,
        now: DateTime<Utc>,
    ) -> Vec<Effect> {
        debug!(customer = %customer_id, %timer, "timer fired");
        let mut out = self.outbox();
        match timer {
            TimerKind::Burst => self.flush_burst(customer_id, now, &mut out),
            TimerKind::Close => self.close_inactive(customer_id, now, &mut out),
            TimerKind::Reminder => self.remind(customer_id, now, &mut out),
            TimerKind::SinpeWait => self.sinpe_alert(customer_id, &mut out),
            TimerKind::OrderReset => self.reset_confirmed(customer_id),
        }
        out.finish()
    }

    /// Applies a language-model answer to the session that asked for it.
    ///
    /// The session may have moved on while the call was in flight; the answer
    /// is dropped unless the session is still eligible. `None` means the
    /// model had no usable answer and the default reply goes out instead.
    pub fn handle_completion(
        &mut self,
        customer_id: &str,
        user_text: &str,
        reply: Option<CompletionReply>,
        now: DateTime<Utc>,
    ) -> Vec<Effect> {
        let mut out = self.outbox();
        let eligible = self
            .sessions
            .get(customer_id)
            .is_some_and(|s| !s.paused && !s.state.is_critical() && s.ai_budget_left());
        if !eligible {
            debug!(customer = %customer_id, "discarding language-model answer, session moved on");
            return out.finish();
        }

        let Some(reply) = reply.filter(|r| !r.reply_text.trim().is_empty()) else {
            debug!(customer = %customer_id, "no language-model answer, using default reply");
            self.fallback(customer_id, &mut out);
            return out.finish();
        };

        if let Some(session) = self.sessions.get_mut(customer_id) {
            session.ai_replies_used += 1;
            session.push_turn(ChatRole::User, user_text, now);
            session.push_turn(ChatRole::Assistant, reply.reply_text.trim(), now);
            self.ledger.record(LedgerMetric::AiReply, now);

            let mut body = reply.reply_text.trim().to_string();
            match reply.action {
                CompletionAction::Reply => {}
                CompletionAction::AskPhoto => {
                    body.push_str("\n\n");
                    body.push_str(self.phrases.next(PhraseCategory::AskPhoto, customer_id));
                }
                CompletionAction::Handoff => {
                    out.vendor(replies::vendor_handoff(customer_id, user_text));
                }
            }
            info!(
                customer = %customer_id,
                action = %reply.action,
                used = session.ai_replies_used,
                "language-model reply"
            );
            out.customer(customer_id, body);
        }
        out.finish()
    }

    fn outbox(&self) -> Outbox {
        Outbox {
            vendor_id: self.settings.vendor_id.clone(),
            effects: Vec::new(),
        }
    }

    /// Re-arms the close timer and drops a pending reminder after customer activity.
    fn note_activity(&self, customer_id: &str, out: &mut Outbox) {
        let Some(session) = self.sessions.get(customer_id) else {
            return;
        };
        if session.state.is_closable() {
            out.arm(
                customer_id,
                TimerKind::Close,
                self.settings.delays.session_timeout,
            );
        }
        if session.state == SessionState::QuoteSent {
            out.cancel(customer_id, TimerKind::Reminder);
        }
    }

    // --- customer events ---

    fn customer_image(
        &mut self,
        customer_id: &str,
        image_ref: String,
        caption: Option<String>,
        now: DateTime<Utc>,
    ) -> Vec<Effect> {
        let mut out = self.outbox();
        self.sessions.touch(customer_id, now);
        let count = self
            .bursts
            .push(customer_id, BurstImage { image_ref, caption });
        debug!(customer = %customer_id, count, "image buffered");
        out.arm(customer_id, TimerKind::Burst, self.settings.burst_quiet);
        self.note_activity(customer_id, &mut out);
        out.finish()
    }

    fn customer_text(&mut self, customer_id: &str, text: &str, now: DateTime<Utc>) -> Vec<Effect> {
        let mut out = self.outbox();
        let session = self.sessions.touch(customer_id, now);
        if session.paused {
            debug!(customer = %customer_id, "session paused, staying silent");
            return out.finish();
        }
        if session.state == SessionState::QuoteRequested {
            debug!(customer = %customer_id, "quote pending with vendor, staying silent");
            self.note_activity(customer_id, &mut out);
            return out.finish();
        }
        if session.state.is_closed() || session.state == SessionState::New {
            session.reset_order();
            transition(session, SessionState::AwaitingDetails);
        }
        self.note_activity(customer_id, &mut out);

        let normalized = intent::normalize(text);
        let ctx = TextContext {
            customer_id,
            raw: text.trim(),
            normalized: &normalized,
            now,
        };
        for rule in CUSTOMER_RULES {
            if self.apply(*rule, &ctx, &mut out) {
                debug!(customer = %customer_id, ?rule, "customer rule matched");
                break;
            }
        }
        out.finish()
    }

    fn apply(&mut self, rule: Rule, ctx: &TextContext<'_>, out: &mut Outbox) -> bool {
        match rule {
            Rule::DetailsCollection => self.collect_details(ctx, out),
            Rule::DeliveryChoice => self.choose_delivery(ctx, out),
            Rule::PaymentClaim => self.payment_claim(ctx, out),
            Rule::Faq => self.faq(ctx, out),
            Rule::Greeting => self.greet(ctx, out),
            Rule::PendingImageDetails => self.pending_image_details(ctx, out),
            Rule::PurchaseIntent => self.purchase_intent(ctx, out),
            Rule::LanguageModel => self.ask_language_model(ctx, out),
            Rule::Fallback => self.fallback(ctx.customer_id, out),
        }
    }

    fn collect_details(&mut self, ctx: &TextContext<'_>, out: &mut Outbox) -> bool {
        let id = ctx.customer_id;
        let Some(session) = self.sessions.get_mut(id) else {
            return false;
        };
        if !matches!(
            session.state,
            SessionState::CollectingShippingInfo | SessionState::CollectingPickupInfo
        ) || ctx.raw.is_empty()
        {
            return false;
        }
        let Some(offer) = session.last_offer else {
            warn!(customer = %id, state = %session.state, "collecting details without an offer");
            return false;
        };

        let method = session.delivery_method;
        let total = offer.total(method);
        let reference = sinpe::payment_reference(id, ctx.now);
        session.shipping_details = Some(ctx.raw.to_string());
        session.pending_payment = Some(PendingPayment {
            expected_amount: total,
            status: PaymentStatus::Pending,
            reference: reference.clone(),
            created_at: ctx.now,
            confirmed_at: None,
        });
        transition(session, SessionState::AwaitingPayment);
        self.ledger.record(LedgerMetric::PaymentRequested, ctx.now);

        let intro = self.phrases.next(PhraseCategory::PaymentInstructions, id);
        out.customer(
            id,
            replies::payment_instructions(intro, total, &reference, &self.settings.store.sinpe),
        );
        out.vendor(replies::vendor_payment_requested(
            id, method, ctx.raw, total, &reference,
        ));
        out.cancel(id, TimerKind::Close);
        if let Some(wait) = self.settings.delays.sinpe_wait {
            out.arm(id, TimerKind::SinpeWait, wait);
        }
        true
    }

    fn choose_delivery(&mut self, ctx: &TextContext<'_>, out: &mut Outbox) -> bool {
        let id = ctx.customer_id;
        let Some(session) = self.sessions.get_mut(id) else {
            return false;
        };
        if session.state != SessionState::ChoosingDeliveryMethod {
            return false;
        }
        let Some(method) = intent::delivery_choice(ctx.normalized) else {
            return false;
        };

        session.delivery_method = method;
        transition(session, collection_state(method));
        self.ledger.record(delivery_metric(method), ctx.now);
        out.customer(
            id,
            collection_prompt(
                &mut self.phrases,
                &self.settings.store,
                id,
                method,
                session.last_offer,
            ),
        );
        true
    }

    fn payment_claim(&mut self, ctx: &TextContext<'_>, out: &mut Outbox) -> bool {
        let id = ctx.customer_id;
        let Some(session) = self.sessions.get(id) else {
            return false;
        };
        if session.state != SessionState::AwaitingPayment
            || !intent::is_payment_claim(ctx.normalized)
        {
            return false;
        }
        let (total, reference) = session
            .pending_payment
            .as_ref()
            .map(|p| (p.expected_amount, p.reference.clone()))
            .unwrap_or_default();

        info!(customer = %id, "customer reports payment");
        out.customer(id, self.phrases.next(PhraseCategory::PaymentClaimAck, id));
        out.vendor(replies::vendor_payment_claim(id, total, &reference));
        true
    }

    fn faq(&mut self, ctx: &TextContext<'_>, out: &mut Outbox) -> bool {
        let Some(topic) = intent::faq_topic(ctx.normalized) else {
            return false;
        };
        let Some(session) = self.sessions.get(ctx.customer_id) else {
            return false;
        };
        match replies::faq_answer(topic, &self.settings.store, session) {
            Some(answer) => {
                out.customer(ctx.customer_id, answer);
                true
            }
            None => {
                debug!(?topic, "no FAQ answer configured");
                false
            }
        }
    }

    fn greet(&mut self, ctx: &TextContext<'_>, out: &mut Outbox) -> bool {
        let id = ctx.customer_id;
        let Some(session) = self.sessions.get_mut(id) else {
            return false;
        };
        if !session.state.is_idle() || !intent::is_short_greeting(ctx.normalized) {
            return false;
        }

        let store = &self.settings.store;
        let include_catalog = !session.catalog_sent && !store.catalog_links.is_empty();
        if include_catalog {
            session.catalog_sent = true;
        }
        let intro = self.phrases.next(PhraseCategory::Greeting, id);
        let ask = self.phrases.next(PhraseCategory::AskPhoto, id);
        out.customer(id, replies::greeting(intro, ask, store, include_catalog));
        self.ledger.record(LedgerMetric::Greeting, ctx.now);
        true
    }

    fn pending_image_details(&mut self, ctx: &TextContext<'_>, out: &mut Outbox) -> bool {
        let Some(session) = self.sessions.get(ctx.customer_id) else {
            return false;
        };
        if session.state != SessionState::AwaitingDetails
            || !intent::has_product_detail(ctx.normalized)
        {
            return false;
        }
        let Some(image_ref) = session.pending_image_ref.clone() else {
            return false;
        };
        self.forward_quote(
            ctx.customer_id,
            Some(image_ref),
            ctx.raw.to_string(),
            ctx.now,
            out,
        );
        true
    }

    fn purchase_intent(&mut self, ctx: &TextContext<'_>, out: &mut Outbox) -> bool {
        let id = ctx.customer_id;
        let Some(session) = self.sessions.get_mut(id) else {
            return false;
        };
        if session.state != SessionState::QuoteSent {
            return false;
        }

        if intent::is_no(ctx.normalized) {
            session.reset_order();
            transition(session, SessionState::AwaitingDetails);
            self.ledger.record(LedgerMetric::IntentNo, ctx.now);
            out.customer(id, self.phrases.next(PhraseCategory::Declined, id));
            out.cancel(id, TimerKind::Close);
            out.cancel(id, TimerKind::Reminder);
            return true;
        }
        if !intent::is_yes(ctx.normalized) {
            return false;
        }

        let tokens_left = match self.ledger.try_consume(ctx.now) {
            Ok(left) => left,
            Err(e) => {
                warn!(customer = %id, error = %e, "purchase intent refused");
                out.customer(id, self.phrases.next(PhraseCategory::OutOfTokens, id));
                out.vendor(replies::vendor_tokens_exhausted(id));
                return true;
            }
        };
        self.ledger.record(LedgerMetric::IntentYes, ctx.now);
        out.cancel(id, TimerKind::Reminder);

        let offer = session.last_offer;
        if let Some(offer) = &offer {
            out.vendor(replies::vendor_purchase_intent(id, offer, tokens_left));
        }

        let store = &self.settings.store;
        if store.ships && store.pickup {
            transition(session, SessionState::ChoosingDeliveryMethod);
            let intro = self.phrases.next(PhraseCategory::ChooseDelivery, id);
            let body = match &offer {
                Some(offer) => replies::choose_delivery(intro, offer),
                None => intro.to_string(),
            };
            out.customer(id, body);
        } else {
            let method = if store.ships {
                DeliveryMethod::Ship
            } else {
                DeliveryMethod::Pickup
            };
            session.delivery_method = method;
            transition(session, collection_state(method));
            self.ledger.record(delivery_metric(method), ctx.now);
            out.customer(
                id,
                collection_prompt(&mut self.phrases, store, id, method, offer),
            );
        }
        true
    }

    fn ask_language_model(&mut self, ctx: &TextContext<'_>, out: &mut Outbox) -> bool {
        if !self.settings.llm_enabled {
            return false;
        }
        let Some(session) = self.sessions.get(ctx.customer_id) else {
            return false;
        };
        if session.state.is_critical()
            || !session.ai_budget_left()
            || ctx.normalized.chars().count() < MIN_COMPLETION_CHARS
            || intent::is_high_priority(ctx.normalized)
        {
            return false;
        }

        let request = CompletionRequest {
            system_prompt: self.settings.system_prompt.clone(),
            context: session.recent_messages.iter().cloned().collect(),
            user_text: ctx.raw.to_string(),
        };
        debug!(customer = %ctx.customer_id, "asking the language model");
        out.complete(ctx.customer_id, request);
        true
    }

    /// Default reply for the session's state. Always handles the message.
    fn fallback(&mut self, customer_id: &str, out: &mut Outbox) -> bool {
        let Some(session) = self.sessions.get_mut(customer_id) else {
            return false;
        };
        let store = &self.settings.store;
        let phrases = &mut self.phrases;

        let body = match (session.state, session.last_offer) {
            (SessionState::ChoosingDeliveryMethod, offer) => {
                let intro = phrases.next(PhraseCategory::ChooseDelivery, customer_id);
                match offer {
                    Some(offer) => replies::choose_delivery(intro, &offer),
                    None => intro.to_string(),
                }
            }
            (SessionState::QuoteSent, Some(offer)) => replies::quote_recap(&offer, store),
            (SessionState::AwaitingPayment, _) if session.pending_payment.is_some() => {
                let intro = phrases.next(PhraseCategory::PaymentInstructions, customer_id);
                match &session.pending_payment {
                    Some(p) => {
                        replies::payment_instructions(intro, p.expected_amount, &p.reference, &store.sinpe)
                    }
                    None => intro.to_string(),
                }
            }
            (state @ (SessionState::CollectingShippingInfo | SessionState::CollectingPickupInfo), offer) => {
                let method = match state {
                    SessionState::CollectingPickupInfo => DeliveryMethod::Pickup,
                    _ => DeliveryMethod::Ship,
                };
                collection_prompt(phrases, store, customer_id, method, offer)
            }
            (SessionState::AwaitingDetails, _) if session.pending_image_ref.is_some() => {
                phrases.next(PhraseCategory::AskDetails, customer_id).to_string()
            }
            _ => {
                let mut body = phrases.next(PhraseCategory::AskPhoto, customer_id).to_string();
                if !session.catalog_sent && !store.catalog_links.is_empty() {
                    session.catalog_sent = true;
                    body.push_str("\n\n");
                    body.push_str(&replies::catalog(&store.catalog_links));
                }
                body
            }
        };
        out.customer(customer_id, body);
        true
    }

    /// Moves the session to `QUOTE_REQUESTED` and hands the request to the vendor.
    fn forward_quote(
        &mut self,
        customer_id: &str,
        image_ref: Option<String>,
        details: String,
        now: DateTime<Utc>,
        out: &mut Outbox,
    ) {
        let Some(session) = self.sessions.get_mut(customer_id) else {
            return;
        };
        session.reset_order();
        session.pending_details_text = Some(details.clone());
        session.sent_to_vendor = true;
        transition(session, SessionState::QuoteRequested);

        self.quotes.open(PendingQuote {
            customer_id: customer_id.to_string(),
            details_text: details.clone(),
            created_at: now,
        });
        self.ledger.record(LedgerMetric::QuoteRequested, now);
        if self.settings.vendor_id.is_none() {
            warn!(customer = %customer_id, "no vendor configured, quote request has nowhere to go");
        }

        let caption = replies::vendor_quote_request(customer_id, &details);
        match &image_ref {
            Some(image_ref) => out.vendor_image(image_ref, caption),
            None => out.vendor(caption),
        }
        out.customer(
            customer_id,
            self.phrases.next(PhraseCategory::QuoteForwarded, customer_id),
        );
        out.arm(
            customer_id,
            TimerKind::Close,
            self.settings.delays.session_timeout,
        );
        out.cancel(customer_id, TimerKind::Reminder);
    }

    // --- timers ---

    fn flush_burst(&mut self, customer_id: &str, now: DateTime<Utc>, out: &mut Outbox) {
        let images = self.bursts.take(customer_id);
        if images.is_empty() {
            return;
        }
        let Some(session) = self.sessions.get_mut(customer_id) else {
            return;
        };
        let count = images.len();
        debug!(customer = %customer_id, count, state = %session.state, "burst flushed");

        if session.paused {
            debug!(customer = %customer_id, count, "session paused, burst dropped");
            return;
        }
        match session.state {
            SessionState::QuoteRequested => {
                debug!(customer = %customer_id, "quote pending with vendor, burst ignored");
                return;
            }
            SessionState::AwaitingPayment => {
                // Images while a payment is pending are receipts.
                let (total, reference) = session
                    .pending_payment
                    .as_ref()
                    .map(|p| (p.expected_amount, p.reference.clone()))
                    .unwrap_or_default();
                out.customer(
                    customer_id,
                    self.phrases.next(PhraseCategory::ReceiptReceived, customer_id),
                );
                let caption = replies::vendor_receipt(customer_id, total, &reference);
                for image in &images {
                    out.vendor_image(&image.image_ref, caption.clone());
                }
                return;
            }
            _ => {}
        }

        if count > 1 {
            out.customer(
                customer_id,
                self.phrases.next(PhraseCategory::OneImageAtATime, customer_id),
            );
            return;
        }
        let Some(image) = images.into_iter().next() else {
            return;
        };

        let caption = image
            .caption
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .map(str::to_string);
        let usable = caption
            .as_deref()
            .is_some_and(|c| intent::has_product_detail(&intent::normalize(c)));

        if usable || self.settings.store.forward_without_caption {
            let details = caption.unwrap_or_else(|| NO_DETAILS.to_string());
            self.forward_quote(customer_id, Some(image.image_ref), details, now, out);
            return;
        }

        session.reset_order();
        session.pending_image_ref = Some(image.image_ref);
        let was_quoted = session.state == SessionState::QuoteSent;
        transition(session, SessionState::AwaitingDetails);
        if was_quoted {
            out.cancel(customer_id, TimerKind::Reminder);
        }
        out.cancel(customer_id, TimerKind::Close);
        out.customer(
            customer_id,
            self.phrases.next(PhraseCategory::AskDetails, customer_id),
        );
    }

    fn close_inactive(&mut self, customer_id: &str, now: DateTime<Utc>, out: &mut Outbox) {
        let timeout = self.settings.delays.session_timeout;
        let Some(session) = self.sessions.get_mut(customer_id) else {
            return;
        };
        if !session.state.is_closable() {
            return;
        }
        let idle = elapsed_since(session.last_activity_at, now);
        if idle < timeout {
            out.arm(customer_id, TimerKind::Close, timeout - idle);
            return;
        }

        let to = if session.state == SessionState::QuoteSent {
            SessionState::ClosedNoInterest
        } else {
            SessionState::ClosedTimeout
        };
        session.reset_order();
        transition(session, to);
        let paused = session.paused;

        self.quotes.close(customer_id);
        self.ledger.record(LedgerMetric::SessionClosed, now);
        if !paused {
            out.customer(
                customer_id,
                self.phrases.next(PhraseCategory::SessionClosed, customer_id),
            );
        }
        out.cancel(customer_id, TimerKind::Reminder);
    }

    fn remind(&mut self, customer_id: &str, now: DateTime<Utc>, out: &mut Outbox) {
        let Some(delay) = self.settings.delays.reminder else {
            return;
        };
        let Some(session) = self.sessions.get(customer_id) else {
            return;
        };
        if session.state != SessionState::QuoteSent || session.paused {
            return;
        }
        let Some(offer) = session.last_offer else {
            return;
        };
        if elapsed_since(session.last_activity_at, now) < delay {
            return;
        }
        let intro = self.phrases.next(PhraseCategory::Reminder, customer_id);
        out.customer(customer_id, replies::reminder(intro, &offer));
    }

    fn sinpe_alert(&mut self, customer_id: &str, out: &mut Outbox) {
        let Some(session) = self.sessions.get(customer_id) else {
            return;
        };
        if !sinpe::should_alert(session) {
            debug!(customer = %customer_id, "payment settled before the wait timer fired");
            return;
        }
        if let Some(payment) = &session.pending_payment {
            warn!(customer = %customer_id, reference = %payment.reference, "no SINPE confirmation yet");
            out.vendor(replies::vendor_sinpe_alert(
                customer_id,
                payment.expected_amount,
                &payment.reference,
            ));
        }
    }

    fn reset_confirmed(&mut self, customer_id: &str) {
        let Some(session) = self.sessions.get_mut(customer_id) else {
            return;
        };
        if session.state != SessionState::PaymentConfirmed {
            return;
        }
        session.reset_order();
        transition(session, SessionState::AwaitingDetails);
    }

    // --- vendor ---

    fn vendor_text(&mut self, text: &str, now: DateTime<Utc>) -> Vec<Effect> {
        let mut out = self.outbox();
        if let Some(command) = vendor::parse(text) {
            self.vendor_command(command, now, &mut out);
            return out.finish();
        }

        if self.settings.auto_payment_detection
            && sinpe::looks_like_notification(&intent::normalize(text))
        {
            self.sinpe_notification(text, now, &mut out);
            return out.finish();
        }

        debug!("vendor text is not a command, sending listing");
        out.vendor(replies::vendor_listing(&self.quotes.list(), now));
        out.finish()
    }

    fn vendor_command(&mut self, command: VendorCommand, now: DateTime<Utc>, out: &mut Outbox) {
        let VendorCommand {
            customer_id: id,
            action,
        } = command;
        let Some(state) = self.sessions.get(&id).map(|s| s.state) else {
            warn!(customer = %id, %action, "vendor command for unknown customer");
            out.vendor(replies::vendor_unknown_customer(&id));
            return;
        };
        info!(customer = %id, %action, %state, "vendor command");

        match action {
            VendorAction::SetPrice {
                price,
                shipping_fee,
            } => self.set_price(&id, Offer { price, shipping_fee }, now, out),
            VendorAction::NoStock => self.no_stock(&id, now, out),
            VendorAction::Pause => self.set_paused(&id, true, out),
            VendorAction::Resume => self.set_paused(&id, false, out),
            VendorAction::SendCatalog => self.send_catalog(&id, out),
            VendorAction::ConfirmPayment => match state {
                SessionState::PaymentConfirmed => {
                    out.vendor(replies::vendor_already_confirmed(&id));
                }
                SessionState::AwaitingPayment => self.confirm_payment(&id, now, false, out),
                other => out.vendor(replies::vendor_rejected(&id, &action.to_string(), other)),
            },
        }
    }

    fn set_price(&mut self, id: &str, offer: Offer, now: DateTime<Utc>, out: &mut Outbox) {
        let Some(session) = self.sessions.get_mut(id) else {
            return;
        };
        if session.state != SessionState::QuoteRequested {
            out.vendor(replies::vendor_rejected(id, "set_price", session.state));
            return;
        }
        session.last_offer = Some(offer);
        session.sent_to_vendor = false;
        transition(session, SessionState::QuoteSent);
        let paused = session.paused;

        self.quotes.close(id);
        self.ledger.record(LedgerMetric::QuoteSent, now);
        if !paused {
            let intro = self.phrases.next(PhraseCategory::QuoteOffer, id);
            out.customer(id, replies::quote_offer(intro, &offer, &self.settings.store));
        }
        out.vendor(replies::vendor_quote_sent(id, &offer));
        out.arm(id, TimerKind::Close, self.settings.delays.session_timeout);
        if let Some(reminder) = self.settings.delays.reminder {
            out.arm(id, TimerKind::Reminder, reminder);
        }
    }

    fn no_stock(&mut self, id: &str, now: DateTime<Utc>, out: &mut Outbox) {
        let Some(session) = self.sessions.get_mut(id) else {
            return;
        };
        if !matches!(
            session.state,
            SessionState::QuoteRequested | SessionState::QuoteSent
        ) {
            out.vendor(replies::vendor_rejected(id, "no_stock", session.state));
            return;
        }
        session.reset_order();
        transition(session, SessionState::ClosedNoStock);
        let paused = session.paused;

        self.quotes.close(id);
        self.ledger.record(LedgerMetric::NoStock, now);
        if !paused {
            out.customer(id, self.phrases.next(PhraseCategory::NoStock, id));
        }
        out.vendor(replies::vendor_no_stock(id));
        out.cancel(id, TimerKind::Close);
        out.cancel(id, TimerKind::Reminder);
    }

    fn set_paused(&mut self, id: &str, paused: bool, out: &mut Outbox) {
        if let Some(session) = self.sessions.get_mut(id) {
            session.paused = paused;
            info!(customer = %id, paused, "bot pause toggled");
            out.vendor(replies::vendor_paused(id, paused));
        }
    }

    fn send_catalog(&mut self, id: &str, out: &mut Outbox) {
        let links = &self.settings.store.catalog_links;
        if links.is_empty() {
            out.vendor(replies::vendor_no_catalog());
            return;
        }
        if let Some(session) = self.sessions.get_mut(id) {
            session.catalog_sent = true;
            out.customer(id, replies::catalog(links));
            out.vendor(replies::vendor_catalog_sent(id));
        }
    }

    fn confirm_payment(&mut self, id: &str, now: DateTime<Utc>, automatic: bool, out: &mut Outbox) {
        let Some(session) = self.sessions.get_mut(id) else {
            return;
        };
        let Some(payment) = session.pending_payment.as_mut() else {
            out.vendor(replies::vendor_rejected(id, "confirm_payment", session.state));
            return;
        };
        payment.status = PaymentStatus::Confirmed;
        payment.confirmed_at = Some(now);
        let total = payment.expected_amount;
        transition(session, SessionState::PaymentConfirmed);
        session.last_activity_at = now;

        self.ledger.record(LedgerMetric::PaymentConfirmed, now);
        if automatic {
            self.ledger.record(LedgerMetric::PaymentAutoMatched, now);
        }
        out.cancel(id, TimerKind::SinpeWait);
        out.cancel(id, TimerKind::Close);
        out.arm(id, TimerKind::OrderReset, self.settings.delays.order_reset);

        if !session.paused {
            let intro = self.phrases.next(PhraseCategory::PaymentConfirmed, id);
            out.customer(
                id,
                replies::payment_confirmed(intro, session, &self.settings.store),
            );
        }
        out.vendor(replies::vendor_payment_confirmed(id, total, automatic));
    }

    fn sinpe_notification(&mut self, text: &str, now: DateTime<Utc>, out: &mut Outbox) {
        match sinpe::match_notification(text, self.sessions.iter()) {
            MatchOutcome::Matched(id) => {
                info!(customer = %id, "SINPE notification matched");
                self.confirm_payment(&id, now, true, out);
            }
            MatchOutcome::Ambiguous(ids) => {
                warn!(candidates = ids.len(), "SINPE notification matches several orders");
                out.vendor(replies::vendor_sinpe_ambiguous(&ids));
            }
            MatchOutcome::NoMatch => {
                warn!("SINPE notification matches no pending order");
                out.vendor(replies::vendor_sinpe_unmatched());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    const VENDOR: &str = "50670000000";
    const CUSTOMER: &str = "50688881234";
    const OTHER: &str = "50677776666";

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_760_000_000 + secs, 0).unwrap()
    }

    fn config() -> VitrinaConfig {
        let mut config = VitrinaConfig::default();
        config.vendor.phone = Some(VENDOR.into());
        config.store.name = "Tienda Prueba".into();
        config.store.catalog_links = vec!["https://example.com/catalogo".into()];
        config.store.pickup_address = Some("San José centro".into());
        config.store.sinpe.number = Some("8888-0000".into());
        config.tokens.monthly_allowance = 10;
        config
    }

    fn engine_from(config: &VitrinaConfig) -> ConversationEngine {
        ConversationEngine::with_phrases(
            EngineSettings::from_config(config),
            PhrasePool::with_seed(42),
            at(0),
        )
    }

    fn engine() -> ConversationEngine {
        engine_from(&config())
    }

    fn sent_to<'a>(effects: &'a [Effect], recipient: &str) -> Vec<&'a OutboundMessage> {
        effects
            .iter()
            .filter_map(|e| match e {
                Effect::Send(msg) if msg.recipient_id == recipient => Some(msg),
                _ => None,
            })
            .collect()
    }

    fn has_arm(effects: &[Effect], timer: TimerKind) -> bool {
        effects
            .iter()
            .any(|e| matches!(e, Effect::ArmTimer { timer: t, .. } if *t == timer))
    }

    fn has_cancel(effects: &[Effect], timer: TimerKind) -> bool {
        effects
            .iter()
            .any(|e| matches!(e, Effect::CancelTimer { timer: t, .. } if *t == timer))
    }

    fn text(engine: &mut ConversationEngine, from: &str, body: &str, secs: i64) -> Vec<Effect> {
        engine.handle_inbound(InboundEvent::text(from, body), at(secs))
    }

    fn state(engine: &ConversationEngine, id: &str) -> SessionState {
        engine.session(id).map(|s| s.state).unwrap()
    }

    fn request_quote(engine: &mut ConversationEngine, id: &str) -> Vec<Effect> {
        engine.handle_inbound(
            InboundEvent::image(id, "media-1", Some("talla M azul".into())),
            at(10),
        );
        engine.handle_timer(id, TimerKind::Burst, at(15))
    }

    fn send_quote(engine: &mut ConversationEngine, id: &str) -> Vec<Effect> {
        request_quote(engine, id);
        text(engine, VENDOR, &format!("{id} 5000-1500"), 20)
    }

    fn reach_payment(engine: &mut ConversationEngine, id: &str) -> Vec<Effect> {
        send_quote(engine, id);
        text(engine, id, "dale", 30);
        text(engine, id, "envío", 40);
        text(engine, id, "Ana Mora, 8888-1111, Heredia centro", 50)
    }

    #[test]
    fn greeting_sends_catalog_once() {
        let mut engine = engine();
        let effects = text(&mut engine, CUSTOMER, "Hola", 0);
        let replies = sent_to(&effects, CUSTOMER);
        assert_eq!(replies.len(), 1);
        assert!(replies[0].body.contains("https://example.com/catalogo"));
        assert!(engine.session(CUSTOMER).unwrap().catalog_sent);

        let effects = text(&mut engine, CUSTOMER, "buenas!", 5);
        let replies = sent_to(&effects, CUSTOMER);
        assert_eq!(replies.len(), 1);
        assert!(!replies[0].body.contains("https://example.com/catalogo"));
        assert_eq!(engine.status(at(5)).ledger.metrics.greetings, 2);
    }

    #[test]
    fn captioned_image_requests_quote() {
        let mut engine = engine();
        let effects = engine.handle_inbound(
            InboundEvent::image(CUSTOMER, "media-1", Some("talla M azul".into())),
            at(0),
        );
        assert!(has_arm(&effects, TimerKind::Burst));
        assert!(sent_to(&effects, VENDOR).is_empty(), "nothing before the quiet interval");

        let effects = engine.handle_timer(CUSTOMER, TimerKind::Burst, at(5));
        let to_vendor = sent_to(&effects, VENDOR);
        assert_eq!(to_vendor.len(), 1);
        assert_eq!(to_vendor[0].image_ref.as_deref(), Some("media-1"));
        assert!(to_vendor[0].body.contains("talla M azul"));
        assert_eq!(sent_to(&effects, CUSTOMER).len(), 1);
        assert!(has_arm(&effects, TimerKind::Close));

        assert_eq!(state(&engine, CUSTOMER), SessionState::QuoteRequested);
        let quotes = engine.pending_quotes();
        assert_eq!(quotes.len(), 1);
        assert_eq!(quotes[0].details_text, "talla M azul");
        assert!(engine.session(CUSTOMER).unwrap().sent_to_vendor);
    }

    #[test]
    fn burst_of_several_images_asks_for_one() {
        let mut engine = engine();
        for n in 0..3 {
            engine.handle_inbound(
                InboundEvent::image(CUSTOMER, format!("media-{n}"), Some("talla S".into())),
                at(n),
            );
        }
        let effects = engine.handle_timer(CUSTOMER, TimerKind::Burst, at(8));
        assert_eq!(sent_to(&effects, CUSTOMER).len(), 1);
        assert!(sent_to(&effects, VENDOR).is_empty());
        assert!(engine.pending_quotes().is_empty());
        assert_ne!(state(&engine, CUSTOMER), SessionState::QuoteRequested);
    }

    #[test]
    fn uncaptioned_image_waits_for_details() {
        let mut engine = engine();
        engine.handle_inbound(InboundEvent::image(CUSTOMER, "media-9", None), at(0));
        let effects = engine.handle_timer(CUSTOMER, TimerKind::Burst, at(5));
        assert!(sent_to(&effects, VENDOR).is_empty());
        let session = engine.session(CUSTOMER).unwrap();
        assert_eq!(session.state, SessionState::AwaitingDetails);
        assert_eq!(session.pending_image_ref.as_deref(), Some("media-9"));

        let effects = text(&mut engine, CUSTOMER, "Talla 38, color negro", 20);
        let to_vendor = sent_to(&effects, VENDOR);
        assert_eq!(to_vendor[0].image_ref.as_deref(), Some("media-9"));
        assert_eq!(state(&engine, CUSTOMER), SessionState::QuoteRequested);
    }

    #[test]
    fn uncaptioned_image_forwarded_when_configured() {
        let mut config = config();
        config.store.forward_without_caption = true;
        let mut engine = engine_from(&config);
        engine.handle_inbound(InboundEvent::image(CUSTOMER, "media-9", None), at(0));
        engine.handle_timer(CUSTOMER, TimerKind::Burst, at(5));
        assert_eq!(state(&engine, CUSTOMER), SessionState::QuoteRequested);
        assert_eq!(engine.pending_quotes()[0].details_text, NO_DETAILS);
    }

    #[test]
    fn customer_is_silent_while_quote_pending() {
        let mut engine = engine();
        request_quote(&mut engine, CUSTOMER);
        let effects = text(&mut engine, CUSTOMER, "hola? cuanto cuesta?", 12);
        assert!(sent_to(&effects, CUSTOMER).is_empty());
        assert!(has_arm(&effects, TimerKind::Close));
        assert_eq!(state(&engine, CUSTOMER), SessionState::QuoteRequested);
    }

    #[test]
    fn vendor_price_sends_quote() {
        let mut engine = engine();
        request_quote(&mut engine, CUSTOMER);
        let effects = text(&mut engine, VENDOR, "50688881234 5000-1500", 20);

        let session = engine.session(CUSTOMER).unwrap();
        assert_eq!(session.state, SessionState::QuoteSent);
        assert_eq!(
            session.last_offer,
            Some(Offer {
                price: 5_000,
                shipping_fee: Some(1_500)
            })
        );
        assert!(engine.pending_quotes().is_empty());
        let to_customer = sent_to(&effects, CUSTOMER);
        assert!(to_customer[0].body.contains("₡5,000"));
        assert!(has_arm(&effects, TimerKind::Close));
        assert!(has_arm(&effects, TimerKind::Reminder));
        assert_eq!(engine.status(at(20)).ledger.metrics.quotes_sent, 1);
    }

    #[test]
    fn overflowing_price_gets_listing_and_keeps_quote_open() {
        let mut engine = engine();
        request_quote(&mut engine, CUSTOMER);
        let effects = text(&mut engine, VENDOR, "50688881234 18446744073709551615-1", 20);

        assert!(sent_to(&effects, CUSTOMER).is_empty());
        assert!(sent_to(&effects, VENDOR)[0].body.contains("Comandos:"));
        assert_eq!(state(&engine, CUSTOMER), SessionState::QuoteRequested);
        assert_eq!(engine.pending_quotes().len(), 1);
    }

    #[test]
    fn largest_price_with_shipping_quotes_without_overflow() {
        let mut engine = engine();
        request_quote(&mut engine, CUSTOMER);
        let effects = text(&mut engine, VENDOR, "50688881234 18446744073709551614-1", 20);
        assert_eq!(state(&engine, CUSTOMER), SessionState::QuoteSent);
        assert!(!sent_to(&effects, CUSTOMER).is_empty());
    }

    #[test]
    fn only_first_price_is_applied() {
        let mut engine = engine();
        request_quote(&mut engine, CUSTOMER);
        text(&mut engine, VENDOR, "50688881234 5000", 20);
        let effects = text(&mut engine, VENDOR, "50688881234 7000", 21);
        assert!(sent_to(&effects, CUSTOMER).is_empty());
        assert_eq!(sent_to(&effects, VENDOR).len(), 1);
        let session = engine.session(CUSTOMER).unwrap();
        assert_eq!(session.last_offer.map(|o| o.price), Some(5_000));
        assert_eq!(engine.status(at(21)).ledger.metrics.quotes_sent, 1);
    }

    #[test]
    fn yes_spends_token_and_asks_delivery() {
        let mut config = config();
        config.tokens.monthly_allowance = 1;
        let mut engine = engine_from(&config);
        send_quote(&mut engine, CUSTOMER);
        send_quote(&mut engine, OTHER);

        text(&mut engine, CUSTOMER, "dale", 30);
        assert_eq!(state(&engine, CUSTOMER), SessionState::ChoosingDeliveryMethod);
        assert_eq!(engine.status(at(30)).tokens_remaining, 0);

        // Repeating the confirmation spends nothing and changes nothing.
        text(&mut engine, CUSTOMER, "dale", 31);
        assert_eq!(state(&engine, CUSTOMER), SessionState::ChoosingDeliveryMethod);

        let effects = text(&mut engine, OTHER, "dale", 32);
        assert_eq!(state(&engine, OTHER), SessionState::QuoteSent);
        assert_eq!(sent_to(&effects, OTHER).len(), 1);
        assert_eq!(sent_to(&effects, VENDOR).len(), 1);
        let ledger = engine.status(at(32)).ledger;
        assert_eq!(ledger.used, 1);
        assert_eq!(ledger.metrics.intent_yes, 1);
    }

    #[test]
    fn ship_only_store_skips_choice() {
        let mut config = config();
        config.store.pickup = false;
        let mut engine = engine_from(&config);
        send_quote(&mut engine, CUSTOMER);
        text(&mut engine, CUSTOMER, "sí, lo quiero", 30);
        let session = engine.session(CUSTOMER).unwrap();
        assert_eq!(session.state, SessionState::CollectingShippingInfo);
        assert_eq!(session.delivery_method, DeliveryMethod::Ship);
    }

    #[test]
    fn pickup_total_excludes_fee() {
        let mut engine = engine();
        send_quote(&mut engine, CUSTOMER);
        text(&mut engine, CUSTOMER, "dale", 30);
        text(&mut engine, CUSTOMER, "lo paso a recoger", 40);
        assert_eq!(state(&engine, CUSTOMER), SessionState::CollectingPickupInfo);
        text(&mut engine, CUSTOMER, "Ana, el sábado", 50);
        let payment = engine.session(CUSTOMER).unwrap().pending_payment.clone().unwrap();
        assert_eq!(payment.expected_amount, 5_000);
        assert_eq!(engine.status(at(50)).ledger.metrics.delivery_pickup, 1);
    }

    #[test]
    fn decline_resets_order() {
        let mut engine = engine();
        send_quote(&mut engine, CUSTOMER);
        let effects = text(&mut engine, CUSTOMER, "no gracias", 30);
        let session = engine.session(CUSTOMER).unwrap();
        assert_eq!(session.state, SessionState::AwaitingDetails);
        assert_eq!(session.last_offer, None);
        assert!(has_cancel(&effects, TimerKind::Close));
        assert_eq!(engine.status(at(30)).ledger.metrics.intent_no, 1);
    }

    #[test]
    fn shipping_details_request_payment() {
        let mut engine = engine();
        let effects = reach_payment(&mut engine, CUSTOMER);
        let session = engine.session(CUSTOMER).unwrap();
        assert_eq!(session.state, SessionState::AwaitingPayment);
        let payment = session.pending_payment.clone().unwrap();
        assert_eq!(payment.expected_amount, 6_500);
        assert_eq!(payment.status, PaymentStatus::Pending);
        assert!(sent_to(&effects, CUSTOMER)[0].body.contains(&payment.reference));
        assert!(sent_to(&effects, VENDOR)[0].body.contains("₡6,500"));
        assert!(has_cancel(&effects, TimerKind::Close));
        // Automatic detection is off by default, so no wait timer.
        assert!(!has_arm(&effects, TimerKind::SinpeWait));
    }

    #[test]
    fn payment_claim_then_vendor_confirms() {
        let mut config = config();
        config.payment.auto_detection = true;
        let mut engine = engine_from(&config);
        let effects = reach_payment(&mut engine, CUSTOMER);
        assert!(has_arm(&effects, TimerKind::SinpeWait));

        let effects = text(&mut engine, CUSTOMER, "ya pagué", 60);
        assert_eq!(sent_to(&effects, CUSTOMER).len(), 1);
        assert_eq!(sent_to(&effects, VENDOR).len(), 1);
        assert_eq!(state(&engine, CUSTOMER), SessionState::AwaitingPayment);

        let effects = text(&mut engine, VENDOR, "50688881234 pagado", 70);
        assert_eq!(state(&engine, CUSTOMER), SessionState::PaymentConfirmed);
        assert!(has_cancel(&effects, TimerKind::SinpeWait));
        assert!(has_arm(&effects, TimerKind::OrderReset));
        let confirmation = sent_to(&effects, CUSTOMER);
        assert!(confirmation[0].body.contains("Heredia centro"));
    }

    #[test]
    fn repeated_confirmation_has_no_effect() {
        let mut engine = engine();
        reach_payment(&mut engine, CUSTOMER);
        text(&mut engine, VENDOR, "50688881234 pagado", 70);
        let effects = text(&mut engine, VENDOR, "50688881234 pagado", 71);
        assert!(sent_to(&effects, CUSTOMER).is_empty());
        assert_eq!(sent_to(&effects, VENDOR).len(), 1);
        assert_eq!(engine.status(at(71)).ledger.metrics.payments_confirmed, 1);
    }

    #[test]
    fn sinpe_wait_alerts_only_while_pending() {
        let mut config = config();
        config.payment.auto_detection = true;
        let mut engine = engine_from(&config);
        reach_payment(&mut engine, CUSTOMER);
        let effects = engine.handle_timer(CUSTOMER, TimerKind::SinpeWait, at(230));
        assert_eq!(sent_to(&effects, VENDOR).len(), 1);

        text(&mut engine, VENDOR, "50688881234 pagado", 240);
        let effects = engine.handle_timer(CUSTOMER, TimerKind::SinpeWait, at(300));
        assert!(effects.is_empty());
    }

    #[test]
    fn forwarded_notification_confirms_matching_order() {
        let mut config = config();
        config.payment.auto_detection = true;
        let mut engine = engine_from(&config);
        reach_payment(&mut engine, CUSTOMER);

        let effects = text(
            &mut engine,
            VENDOR,
            "BN: Le informamos que recibió un SINPE Móvil por ₡6.500,00 de ANA MORA",
            90,
        );
        assert_eq!(state(&engine, CUSTOMER), SessionState::PaymentConfirmed);
        assert_eq!(sent_to(&effects, CUSTOMER).len(), 1);
        let metrics = engine.status(at(90)).ledger.metrics;
        assert_eq!(metrics.payments_auto_matched, 1);
    }

    #[test]
    fn order_reset_returns_to_awaiting_details() {
        let mut engine = engine();
        reach_payment(&mut engine, CUSTOMER);
        text(&mut engine, VENDOR, "50688881234 pagado", 70);
        let effects = engine.handle_timer(CUSTOMER, TimerKind::OrderReset, at(86_500));
        assert!(effects.is_empty());
        let session = engine.session(CUSTOMER).unwrap();
        assert_eq!(session.state, SessionState::AwaitingDetails);
        assert_eq!(session.pending_payment, None);
    }

    #[test]
    fn unknown_customer_reported_to_vendor_only() {
        let mut engine = engine();
        let effects = text(&mut engine, VENDOR, "50611112222 5000", 0);
        assert_eq!(effects.len(), 1);
        assert!(sent_to(&effects, VENDOR)[0].body.contains("50611112222"));
        assert!(engine.session("50611112222").is_none());
    }

    #[test]
    fn vendor_free_text_gets_listing() {
        let mut engine = engine();
        request_quote(&mut engine, CUSTOMER);
        let effects = text(&mut engine, VENDOR, "qué tengo pendiente?", 30);
        let listing = sent_to(&effects, VENDOR);
        assert!(listing[0].body.contains(CUSTOMER));
        assert!(listing[0].body.contains("Comandos:"));
    }

    #[test]
    fn no_stock_closes_session() {
        let mut engine = engine();
        request_quote(&mut engine, CUSTOMER);
        let effects = text(&mut engine, VENDOR, "50688881234 agotado", 30);
        assert_eq!(state(&engine, CUSTOMER), SessionState::ClosedNoStock);
        assert!(engine.pending_quotes().is_empty());
        assert_eq!(sent_to(&effects, CUSTOMER).len(), 1);

        text(&mut engine, CUSTOMER, "hola", 40);
        assert_eq!(state(&engine, CUSTOMER), SessionState::AwaitingDetails);
    }

    #[test]
    fn paused_session_is_silent() {
        let mut engine = engine();
        text(&mut engine, CUSTOMER, "hola", 0);
        text(&mut engine, VENDOR, "50688881234 pausa", 1);
        let effects = text(&mut engine, CUSTOMER, "hola de nuevo", 2);
        assert!(effects.is_empty());

        text(&mut engine, VENDOR, "50688881234 bot", 3);
        let effects = text(&mut engine, CUSTOMER, "hola", 4);
        assert_eq!(sent_to(&effects, CUSTOMER).len(), 1);
    }

    #[test]
    fn vendor_catalog_command_resends() {
        let mut engine = engine();
        text(&mut engine, CUSTOMER, "hola", 0);
        let effects = text(&mut engine, VENDOR, "50688881234 catalogo", 1);
        assert!(sent_to(&effects, CUSTOMER)[0]
            .body
            .contains("https://example.com/catalogo"));
    }

    #[test]
    fn close_timer_closes_stale_quote() {
        let mut engine = engine();
        send_quote(&mut engine, CUSTOMER);
        let early = engine.handle_timer(CUSTOMER, TimerKind::Close, at(100));
        assert!(has_arm(&early, TimerKind::Close), "not idle long enough, re-armed");
        assert_eq!(state(&engine, CUSTOMER), SessionState::QuoteSent);

        let effects = engine.handle_timer(CUSTOMER, TimerKind::Close, at(10 + 7_200));
        assert_eq!(state(&engine, CUSTOMER), SessionState::ClosedNoInterest);
        assert_eq!(sent_to(&effects, CUSTOMER).len(), 1);
        assert_eq!(engine.status(at(7_300)).ledger.metrics.sessions_closed, 1);
    }

    #[test]
    fn close_timer_times_out_unanswered_request() {
        let mut engine = engine();
        request_quote(&mut engine, CUSTOMER);
        assert_eq!(state(&engine, CUSTOMER), SessionState::QuoteRequested);
        assert_eq!(engine.pending_quotes().len(), 1);

        let effects = engine.handle_timer(CUSTOMER, TimerKind::Close, at(20_000));
        assert_eq!(state(&engine, CUSTOMER), SessionState::ClosedTimeout);
        assert!(engine.pending_quotes().is_empty());
        assert!(!engine.session(CUSTOMER).unwrap().sent_to_vendor);
        assert_eq!(sent_to(&effects, CUSTOMER).len(), 1);
    }

    #[test]
    fn close_timer_ignores_payment_states() {
        let mut engine = engine();
        reach_payment(&mut engine, CUSTOMER);
        let effects = engine.handle_timer(CUSTOMER, TimerKind::Close, at(100_000));
        assert!(effects.is_empty());
        assert_eq!(state(&engine, CUSTOMER), SessionState::AwaitingPayment);
    }

    #[test]
    fn faq_answers_from_store_profile() {
        let mut config = config();
        config.store.faq.hours = Some("Abrimos de 9 a 6.".into());
        let mut engine = engine_from(&config);
        let effects = text(&mut engine, CUSTOMER, "¿A qué hora abren?", 0);
        assert_eq!(sent_to(&effects, CUSTOMER)[0].body, "Abrimos de 9 a 6.");
    }

    fn llm_engine() -> ConversationEngine {
        let mut config = config();
        config.anthropic.api_key = Some("sk-test".into());
        engine_from(&config)
    }

    #[test]
    fn free_question_goes_to_language_model() {
        let mut engine = llm_engine();
        let effects = text(&mut engine, CUSTOMER, "Hacen bordados personalizados en camisas?", 0);
        let request = effects.iter().find_map(|e| match e {
            Effect::RequestCompletion { request, .. } => Some(request),
            _ => None,
        });
        assert!(request.is_some());
        assert!(sent_to(&effects, CUSTOMER).is_empty());

        let effects = engine.handle_completion(
            CUSTOMER,
            "Hacen bordados personalizados en camisas?",
            Some(CompletionReply {
                action: CompletionAction::Handoff,
                reply_text: "Le pregunto a la tienda.".into(),
            }),
            at(2),
        );
        assert_eq!(sent_to(&effects, CUSTOMER)[0].body, "Le pregunto a la tienda.");
        assert_eq!(sent_to(&effects, VENDOR).len(), 1);
        let session = engine.session(CUSTOMER).unwrap();
        assert_eq!(session.ai_replies_used, 1);
        assert_eq!(session.recent_messages.len(), 2);
    }

    #[test]
    fn language_model_capped_per_session() {
        let mut engine = llm_engine();
        for n in 0..3 {
            text(&mut engine, CUSTOMER, "Hacen bordados personalizados?", n);
            engine.handle_completion(
                CUSTOMER,
                "Hacen bordados personalizados?",
                Some(CompletionReply {
                    action: CompletionAction::Reply,
                    reply_text: "Sí, consultanos.".into(),
                }),
                at(n),
            );
        }
        let effects = text(&mut engine, CUSTOMER, "Hacen bordados personalizados?", 10);
        assert!(!effects
            .iter()
            .any(|e| matches!(e, Effect::RequestCompletion { .. })));
        assert_eq!(sent_to(&effects, CUSTOMER).len(), 1);
    }

    #[test]
    fn stale_completion_is_dropped() {
        let mut engine = llm_engine();
        text(&mut engine, CUSTOMER, "Hacen bordados personalizados?", 0);
        request_quote(&mut engine, CUSTOMER);
        let effects = engine.handle_completion(
            CUSTOMER,
            "Hacen bordados personalizados?",
            Some(CompletionReply {
                action: CompletionAction::Reply,
                reply_text: "Sí.".into(),
            }),
            at(20),
        );
        assert!(effects.is_empty());
    }

    #[test]
    fn missing_completion_falls_back() {
        let mut engine = llm_engine();
        text(&mut engine, CUSTOMER, "Hacen bordados personalizados?", 0);
        let effects = engine.handle_completion(CUSTOMER, "Hacen bordados personalizados?", None, at(1));
        assert_eq!(sent_to(&effects, CUSTOMER).len(), 1);
        assert_eq!(engine.session(CUSTOMER).unwrap().ai_replies_used, 0);
    }

    #[test]
    fn snapshot_restore_rebuilds_registry_and_timers() {
        let mut engine = engine();
        request_quote(&mut engine, CUSTOMER);
        send_quote(&mut engine, OTHER);
        let snapshot = engine.snapshot(at(30));

        let mut restored = engine_from(&config());
        let effects = restored.restore(snapshot.clone(), at(60));
        assert_eq!(restored.pending_quotes().len(), 1);
        assert_eq!(restored.pending_quotes()[0].customer_id, CUSTOMER);
        assert_eq!(restored.session(OTHER).unwrap().last_offer, engine.session(OTHER).unwrap().last_offer);
        assert!(effects.iter().all(|e| matches!(e, Effect::ArmTimer { .. })));
        assert!(has_arm(&effects, TimerKind::Reminder));
        assert_eq!(restored.snapshot(at(30)).sessions, snapshot.sessions);
    }

    #[test]
    fn restored_order_reset_counts_from_confirmation() {
        let mut engine = engine();
        reach_payment(&mut engine, CUSTOMER);
        text(&mut engine, VENDOR, "50688881234 pagado", 70);
        text(&mut engine, CUSTOMER, "muchas gracias", 40_000);
        assert_eq!(state(&engine, CUSTOMER), SessionState::PaymentConfirmed);
        let snapshot = engine.snapshot(at(40_000));

        let mut restored = engine_from(&config());
        let effects = restored.restore(snapshot, at(50_000));
        let reset_after = effects.iter().find_map(|e| match e {
            Effect::ArmTimer {
                timer: TimerKind::OrderReset,
                after,
                ..
            } => Some(*after),
            _ => None,
        });
        assert_eq!(reset_after, Some(Duration::from_secs(86_400 - (50_000 - 70))));
    }

    #[test]
    fn top_up_extends_allowance() {
        let mut config = config();
        config.tokens.monthly_allowance = 0;
        let mut engine = engine_from(&config);
        let ledger = engine.top_up(5, at(0)).unwrap();
        assert_eq!(ledger.remaining(), 5);
        assert_eq!(engine.status(at(0)).tokens_remaining, 5);
    }

    #[test]
    fn oversized_top_up_leaves_ledger_untouched() {
        let mut config = config();
        config.tokens.monthly_allowance = 10;
        let mut engine = engine_from(&config);
        assert!(matches!(
            engine.top_up(u64::MAX, at(0)),
            Err(VitrinaError::InvalidTopUp { .. })
        ));
        assert_eq!(engine.status(at(0)).tokens_remaining, 10);
    }
}
