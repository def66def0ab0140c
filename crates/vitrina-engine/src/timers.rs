// SPDX-FileCopyrightText: 2026 Vitrina Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Cancellable per-customer timers.
//!
//! Each (customer, kind) pair owns at most one slot. Arming a slot aborts the
//! task already in it and bumps a generation counter; a fire carries the
//! generation it was armed with, and [`TimerSlots::claim`] only accepts the
//! current one. A fire that raced with a cancel or re-arm is therefore
//! dropped even if its message was already queued.

use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;

use strum::Display;
use tokio::task::JoinHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
#[strum(serialize_all = "snake_case")]
pub enum TimerKind {
    /// Quiet interval ending a photo burst.
    Burst,
    /// Inactivity close of an in-progress conversation.
    Close,
    /// One-shot nudge after a quote goes unanswered.
    Reminder,
    /// Vendor alert when no SINPE confirmation arrives.
    SinpeWait,
    /// Clears a confirmed order for the next purchase.
    OrderReset,
}

struct Slot {
    generation: u64,
    handle: JoinHandle<()>,
}

#[derive(Default)]
pub struct TimerSlots {
    slots: HashMap<(String, TimerKind), Slot>,
    next_generation: u64,
}

impl TimerSlots {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arms (or re-arms) a slot.
    ///
    /// `on_fire` receives the slot's generation and builds the future that
    /// runs once `after` has elapsed.
    pub fn arm<F, Fut>(&mut self, customer_id: &str, kind: TimerKind, after: Duration, on_fire: F)
    where
        F: FnOnce(u64) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.cancel(customer_id, kind);
        self.next_generation += 1;
        let generation = self.next_generation;
        let fire = on_fire(generation);
        let deadline = tokio::time::Instant::now() + after;
        let handle = tokio::spawn(async move {
            tokio::time::sleep_until(deadline).await;
            fire.await;
        });
        self.slots
            .insert((customer_id.to_string(), kind), Slot { generation, handle });
    }

    /// Cancels a slot. Returns whether one was armed.
    pub fn cancel(&mut self, customer_id: &str, kind: TimerKind) -> bool {
        match self.slots.remove(&(customer_id.to_string(), kind)) {
            Some(slot) => {
                slot.handle.abort();
                true
            }
            None => false,
        }
    }

    /// Accepts a fire if `generation` is still current, freeing the slot.
    pub fn claim(&mut self, customer_id: &str, kind: TimerKind, generation: u64) -> bool {
        let key = (customer_id.to_string(), kind);
        match self.slots.get(&key) {
            Some(slot) if slot.generation == generation => {
                self.slots.remove(&key);
                true
            }
            _ => false,
        }
    }

    pub fn is_armed(&self, customer_id: &str, kind: TimerKind) -> bool {
        self.slots.contains_key(&(customer_id.to_string(), kind))
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Aborts every armed timer.
    pub fn cancel_all(&mut self) {
        for (_, slot) in self.slots.drain() {
            slot.handle.abort();
        }
    }
}

impl Drop for TimerSlots {
    fn drop(&mut self) {
        self.cancel_all();
    }
}
