// SPDX-FileCopyrightText: 2026 Vitrina Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Registry of quote requests waiting on the vendor.

use std::collections::HashMap;

use vitrina_core::{PendingQuote, Session, SessionState};

/// At most one entry per customer; the newest request replaces older ones.
#[derive(Debug, Default)]
pub struct QuoteRegistry {
    entries: HashMap<String, PendingQuote>,
}

impl QuoteRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn open(&mut self, quote: PendingQuote) {
        self.entries.insert(quote.customer_id.clone(), quote);
    }

    /// Removes the customer's entry. Returns whether one existed.
    pub fn close(&mut self, customer_id: &str) -> bool {
        self.entries.remove(customer_id).is_some()
    }

    pub fn contains(&self, customer_id: &str) -> bool {
        self.entries.contains_key(customer_id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Pending quotes, oldest first.
    pub fn list(&self) -> Vec<PendingQuote> {
        let mut quotes: Vec<PendingQuote> = self.entries.values().cloned().collect();
        quotes.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.customer_id.cmp(&b.customer_id))
        });
        quotes
    }

    /// Rebuilds the registry from restored sessions.
    ///
    /// The original request time is not persisted; the session's last
    /// activity stands in for it.
    pub fn rebuild<'a>(sessions: impl IntoIterator<Item = &'a Session>) -> Self {
        let entries = sessions
            .into_iter()
            .filter(|s| s.state == SessionState::QuoteRequested && s.sent_to_vendor)
            .map(|s| {
                (
                    s.id.clone(),
                    PendingQuote {
                        customer_id: s.id.clone(),
                        details_text: s.pending_details_text.clone().unwrap_or_default(),
                        created_at: s.last_activity_at,
                    },
                )
            })
            .collect();
        Self { entries }
    }
}
