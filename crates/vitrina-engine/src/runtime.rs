// SPDX-FileCopyrightText: 2026 Vitrina Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Single-owner runtime around the conversation engine.
//!
//! The runtime owns the [`ConversationEngine`] and its timer slots and
//! processes one [`Command`] at a time from an mpsc queue, so every event
//! (webhook delivery, timer fire, model answer, ops query) runs to completion
//! before the next one starts. Network work never runs on the loop: outbound
//! sends and model calls are spawned, and model answers come back as
//! commands.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinSet;
use tokio::time::{Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use vitrina_core::{
    ChannelAdapter, CompletionAdapter, CompletionReply, CompletionRequest, EngineSnapshot,
    InboundEvent, LedgerState, OutboundMessage, PendingQuote, SnapshotStore, StatusReport,
    VitrinaError,
};

use crate::engine::{ConversationEngine, Effect};
use crate::shutdown::drain_in_flight;
use crate::timers::{TimerKind, TimerSlots};

const COMMAND_BUFFER: usize = 1024;

/// How long shutdown waits for in-flight sends and model calls.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

/// Everything the runtime loop reacts to.
#[derive(Debug)]
pub enum Command {
    Inbound(InboundEvent),
    TimerFired {
        customer_id: String,
        timer: TimerKind,
        generation: u64,
    },
    Completed {
        customer_id: String,
        user_text: String,
        reply: Option<CompletionReply>,
    },
    Status(oneshot::Sender<StatusReport>),
    PendingQuotes(oneshot::Sender<Vec<PendingQuote>>),
    TopUp {
        tokens: u64,
        reply: oneshot::Sender<Result<LedgerState, VitrinaError>>,
    },
    Snapshot(oneshot::Sender<EngineSnapshot>),
}

/// Cloneable handle for submitting events and queries to a running engine.
#[derive(Debug, Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<Command>,
}

impl EngineHandle {
    /// Queues an inbound event. Returns once the event is queued, not handled.
    pub async fn submit(&self, event: InboundEvent) -> Result<(), VitrinaError> {
        self.tx
            .send(Command::Inbound(event))
            .await
            .map_err(|_| stopped())
    }

    pub async fn status(&self) -> Result<StatusReport, VitrinaError> {
        self.request(Command::Status).await
    }

    pub async fn pending_quotes(&self) -> Result<Vec<PendingQuote>, VitrinaError> {
        self.request(Command::PendingQuotes).await
    }

    /// Adds bonus tokens and returns the updated ledger.
    ///
    /// Returns [`VitrinaError::InvalidTopUp`] when the engine refuses the amount.
    pub async fn top_up(&self, tokens: u64) -> Result<LedgerState, VitrinaError> {
        self.request(|reply| Command::TopUp { tokens, reply }).await?
    }

    pub async fn snapshot(&self) -> Result<EngineSnapshot, VitrinaError> {
        self.request(Command::Snapshot).await
    }

    async fn request<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> Command,
    ) -> Result<T, VitrinaError> {
        let (reply, rx) = oneshot::channel();
        self.tx.send(make(reply)).await.map_err(|_| stopped())?;
        rx.await.map_err(|_| stopped())
    }
}

fn stopped() -> VitrinaError {
    VitrinaError::Internal("conversation runtime has stopped".to_string())
}

/// Owns the engine, its timers and the collaborators it talks to.
pub struct EngineRuntime {
    engine: ConversationEngine,
    channel: Arc<dyn ChannelAdapter>,
    provider: Option<Arc<dyn CompletionAdapter>>,
    snapshots: Option<Arc<dyn SnapshotStore>>,
    snapshot_interval: Duration,
    timers: TimerSlots,
    in_flight: JoinSet<()>,
    tx: mpsc::Sender<Command>,
    rx: mpsc::Receiver<Command>,
}

impl EngineRuntime {
    pub fn new(
        engine: ConversationEngine,
        channel: Arc<dyn ChannelAdapter>,
    ) -> (Self, EngineHandle) {
        let (tx, rx) = mpsc::channel(COMMAND_BUFFER);
        let handle = EngineHandle { tx: tx.clone() };
        let runtime = Self {
            engine,
            channel,
            provider: None,
            snapshots: None,
            snapshot_interval: Duration::from_secs(60),
            timers: TimerSlots::new(),
            in_flight: JoinSet::new(),
            tx,
            rx,
        };
        (runtime, handle)
    }

    /// Enables the language-model fallback.
    pub fn with_provider(mut self, provider: Arc<dyn CompletionAdapter>) -> Self {
        self.provider = Some(provider);
        self
    }

    /// Enables periodic snapshots and the final flush on shutdown.
    pub fn with_snapshots(mut self, store: Arc<dyn SnapshotStore>, interval: Duration) -> Self {
        self.snapshots = Some(store);
        self.snapshot_interval = interval;
        self
    }

    pub fn handle(&self) -> EngineHandle {
        EngineHandle {
            tx: self.tx.clone(),
        }
    }

    pub fn engine(&self) -> &ConversationEngine {
        &self.engine
    }

    /// Loads the last snapshot, if any, and re-arms its timers.
    ///
    /// Returns whether a snapshot was found.
    pub async fn restore(&mut self) -> Result<bool, VitrinaError> {
        let Some(store) = self.snapshots.clone() else {
            return Ok(false);
        };
        match store.load().await? {
            Some(snapshot) => {
                let effects = self.engine.restore(snapshot, Utc::now());
                info!(timers = effects.len(), "re-arming restored timers");
                self.apply(effects);
                Ok(true)
            }
            None => {
                info!("no snapshot found, starting fresh");
                Ok(false)
            }
        }
    }

    /// Runs until `cancel` fires, then drains in-flight work and flushes a
    /// final snapshot.
    pub async fn run(mut self, cancel: CancellationToken) -> Result<(), VitrinaError> {
        info!("conversation runtime started");
        let mut ticker = self.snapshots.as_ref().map(|_| {
            let start = tokio::time::Instant::now() + self.snapshot_interval;
            let mut ticker = tokio::time::interval_at(start, self.snapshot_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            ticker
        });

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                Some(command) = self.rx.recv() => self.dispatch(command),
                _ = next_tick(&mut ticker) => self.persist().await,
            }
        }

        self.shutdown().await
    }

    fn dispatch(&mut self, command: Command) {
        let now = Utc::now();
        match command {
            Command::Inbound(event) => {
                #[cfg(feature = "prometheus")]
                vitrina_prometheus::record_event(match &event.kind {
                    vitrina_core::InboundKind::Text { .. } => "text",
                    vitrina_core::InboundKind::Image { .. } => "image",
                });
                let effects = self.engine.handle_inbound(event, now);
                self.apply(effects);
            }
            Command::TimerFired {
                customer_id,
                timer,
                generation,
            } => {
                if !self.timers.claim(&customer_id, timer, generation) {
                    debug!(customer = %customer_id, %timer, "stale timer fire dropped");
                    return;
                }
                let effects = self.engine.handle_timer(&customer_id, timer, now);
                self.apply(effects);
            }
            Command::Completed {
                customer_id,
                user_text,
                reply,
            } => {
                let effects = self
                    .engine
                    .handle_completion(&customer_id, &user_text, reply, now);
                self.apply(effects);
            }
            Command::Status(reply) => {
                let _ = reply.send(self.engine.status(now));
            }
            Command::PendingQuotes(reply) => {
                let _ = reply.send(self.engine.pending_quotes());
            }
            Command::TopUp { tokens, reply } => {
                let _ = reply.send(self.engine.top_up(tokens, now));
            }
            Command::Snapshot(reply) => {
                let _ = reply.send(self.engine.snapshot(now));
            }
        }

        // Reap finished sends so the set does not grow with uptime.
        while self.in_flight.try_join_next().is_some() {}

        #[cfg(feature = "prometheus")]
        {
            vitrina_prometheus::set_active_sessions(self.engine.sessions().len() as f64);
            vitrina_prometheus::set_tokens_remaining(
                self.engine.status(now).tokens_remaining as f64,
            );
        }
    }

    fn apply(&mut self, effects: Vec<Effect>) {
        let mut outbound = Vec::new();
        for effect in effects {
            match effect {
                Effect::Send(message) => outbound.push(message),
                Effect::ArmTimer {
                    customer_id,
                    timer,
                    after,
                } => self.arm(customer_id, timer, after),
                Effect::CancelTimer { customer_id, timer } => {
                    self.timers.cancel(&customer_id, timer);
                }
                Effect::RequestCompletion {
                    customer_id,
                    request,
                } => self.spawn_completion(customer_id, request),
            }
        }
        if !outbound.is_empty() {
            self.spawn_sends(outbound);
        }
    }

    fn arm(&mut self, customer_id: String, timer: TimerKind, after: Duration) {
        let tx = self.tx.clone();
        let owned = customer_id.clone();
        self.timers
            .arm(&customer_id, timer, after, move |generation| async move {
                let _ = tx
                    .send(Command::TimerFired {
                        customer_id: owned,
                        timer,
                        generation,
                    })
                    .await;
            });
    }

    /// Sends one event's messages in order on a background task.
    ///
    /// Delivery is best-effort: failures are logged and never retried.
    fn spawn_sends(&mut self, messages: Vec<OutboundMessage>) {
        let channel = Arc::clone(&self.channel);
        self.in_flight.spawn(async move {
            for message in messages {
                let recipient = message.recipient_id.clone();
                match channel.send(message).await {
                    Ok(id) => {
                        debug!(%recipient, message_id = %id.0, "message sent");
                        #[cfg(feature = "prometheus")]
                        vitrina_prometheus::record_outbound("ok");
                    }
                    Err(e) => {
                        warn!(%recipient, error = %e, "message delivery failed");
                        #[cfg(feature = "prometheus")]
                        vitrina_prometheus::record_outbound("error");
                    }
                }
            }
        });
    }

    fn spawn_completion(&mut self, customer_id: String, request: CompletionRequest) {
        let Some(provider) = self.provider.clone() else {
            debug!(customer = %customer_id, "no completion provider, using default reply");
            let effects =
                self.engine
                    .handle_completion(&customer_id, &request.user_text, None, Utc::now());
            self.apply(effects);
            return;
        };

        let tx = self.tx.clone();
        self.in_flight.spawn(async move {
            let user_text = request.user_text.clone();
            let reply = match provider.complete(request).await {
                Ok(reply) => reply,
                Err(e) => {
                    warn!(customer = %customer_id, error = %e, "language model call failed");
                    None
                }
            };
            let _ = tx
                .send(Command::Completed {
                    customer_id,
                    user_text,
                    reply,
                })
                .await;
        });
    }

    async fn persist(&mut self) {
        let Some(store) = self.snapshots.clone() else {
            return;
        };
        let snapshot = self.engine.snapshot(Utc::now());
        match store.save(&snapshot).await {
            Ok(()) => debug!(sessions = snapshot.sessions.len(), "snapshot saved"),
            Err(e) => warn!(error = %e, "snapshot save failed"),
        }
    }

    async fn shutdown(mut self) -> Result<(), VitrinaError> {
        info!("conversation runtime stopping");
        self.timers.cancel_all();
        drain_in_flight(&mut self.in_flight, DRAIN_TIMEOUT).await;
        self.persist().await;
        if let Some(store) = &self.snapshots {
            store.close().await?;
        }
        info!("conversation runtime stopped");
        Ok(())
    }
}

async fn next_tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}
