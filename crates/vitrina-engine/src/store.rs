// SPDX-FileCopyrightText: 2026 Vitrina Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! In-memory session store.

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use chrono::{DateTime, Utc};
use vitrina_core::{Session, SessionState};

use crate::timers::TimerKind;

/// Sessions keyed by customer id. Sessions are created on first contact
/// and never deleted.
#[derive(Debug, Default)]
pub struct SessionStore {
    sessions: HashMap<String, Session>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, customer_id: &str) -> Option<&Session> {
        self.sessions.get(customer_id)
    }

    pub fn get_mut(&mut self, customer_id: &str) -> Option<&mut Session> {
        self.sessions.get_mut(customer_id)
    }

    /// Returns the session, creating it in `NEW` if absent, and records activity.
    pub fn touch(&mut self, customer_id: &str, now: DateTime<Utc>) -> &mut Session {
        let session = self
            .sessions
            .entry(customer_id.to_string())
            .or_insert_with(|| Session::new(customer_id, now));
        session.last_activity_at = now;
        session
    }

    pub fn contains(&self, customer_id: &str) -> bool {
        self.sessions.contains_key(customer_id)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Session> {
        self.sessions.values()
    }

    pub fn counts_by_state(&self) -> BTreeMap<String, usize> {
        let mut counts = BTreeMap::new();
        for session in self.sessions.values() {
            *counts.entry(session.state.to_string()).or_insert(0) += 1;
        }
        counts
    }

    pub fn paused_count(&self) -> usize {
        self.sessions.values().filter(|s| s.paused).count()
    }

    /// Sessions in a stable order, for snapshots.
    pub fn snapshot(&self) -> Vec<Session> {
        let mut sessions: Vec<Session> = self.sessions.values().cloned().collect();
        sessions.sort_by(|a, b| a.id.cmp(&b.id));
        sessions
    }

    pub fn restore(sessions: Vec<Session>) -> Self {
        Self {
            sessions: sessions.into_iter().map(|s| (s.id.clone(), s)).collect(),
        }
    }

    /// Timers to re-arm after a restore, with what is left of each delay.
    ///
    /// Elapsed delays come back as zero so they fire right away.
    pub fn rearm_plan(
        &self,
        now: DateTime<Utc>,
        delays: &TimerDelays,
    ) -> Vec<(String, TimerKind, Duration)> {
        let left = |since: DateTime<Utc>, total: Duration| -> Duration {
            let elapsed = (now - since).to_std().unwrap_or(Duration::ZERO);
            total.saturating_sub(elapsed)
        };

        let mut plan = Vec::new();
        for session in self.sessions.values() {
            let id = session.id.clone();
            if session.state.is_closable() {
                plan.push((
                    id.clone(),
                    TimerKind::Close,
                    left(session.last_activity_at, delays.session_timeout),
                ));
            }
            match session.state {
                SessionState::QuoteSent => {
                    if let Some(reminder) = delays.reminder {
                        let remaining = left(session.last_activity_at, reminder);
                        if !remaining.is_zero() {
                            plan.push((id, TimerKind::Reminder, remaining));
                        }
                    }
                }
                SessionState::AwaitingPayment => {
                    if let (Some(wait), Some(payment)) =
                        (delays.sinpe_wait, session.pending_payment.as_ref())
                    {
                        plan.push((id, TimerKind::SinpeWait, left(payment.created_at, wait)));
                    }
                }
                SessionState::PaymentConfirmed => {
                    let confirmed_at = session
                        .pending_payment
                        .as_ref()
                        .and_then(|p| p.confirmed_at)
                        .unwrap_or(session.last_activity_at);
                    plan.push((
                        id,
                        TimerKind::OrderReset,
                        left(confirmed_at, delays.order_reset),
                    ));
                }
                _ => {}
            }
        }
        plan.sort_by(|a, b| a.0.cmp(&b.0).then(a.2.cmp(&b.2)));
        plan
    }
}

/// Timer delays the store needs to plan re-arming.
#[derive(Debug, Clone, Copy)]
pub struct TimerDelays {
    pub session_timeout: Duration,
    /// `None` when reminders are off.
    pub reminder: Option<Duration>,
    /// `None` when automatic SINPE detection is off.
    pub sinpe_wait: Option<Duration>,
    pub order_reset: Duration,
}
