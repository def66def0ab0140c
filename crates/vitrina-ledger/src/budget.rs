// SPDX-FileCopyrightText: 2026 Vitrina Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Monthly token allowance with lazy rollover.
//!
//! The ledger keeps the month it belongs to. Every read or write first
//! compares that month with the month of `now`; on a change, used tokens and
//! bonus tokens go back to zero while business counters carry over. It warns
//! at 80% of the allowance and returns [`VitrinaError::TokensExhausted`] once
//! nothing is left.

use chrono::{DateTime, Utc};
use tracing::{info, warn};
use vitrina_config::model::TokenConfig;
use vitrina_core::{LedgerMetrics, LedgerState, VitrinaError};

use crate::metrics::LedgerMetric;

/// Calendar month key (`YYYY-MM`, UTC) used for rollover detection.
pub fn month_key(now: DateTime<Utc>) -> String {
    now.format("%Y-%m").to_string()
}

/// Token allowance plus cumulative business counters.
#[derive(Debug, Clone)]
pub struct AccountLedger {
    state: LedgerState,
}

impl AccountLedger {
    /// A fresh ledger for the month containing `now`.
    pub fn new(config: &TokenConfig, now: DateTime<Utc>) -> Self {
        Self {
            state: LedgerState {
                month_key: month_key(now),
                monthly_allowance: config.monthly_allowance,
                used: 0,
                bonus_added: 0,
                metrics: LedgerMetrics::default(),
            },
        }
    }

    /// Re-hydrates a ledger from a snapshot.
    ///
    /// The configured allowance wins over the persisted one so operators can
    /// change it between restarts. A snapshot from an earlier month rolls over
    /// here.
    pub fn restore(config: &TokenConfig, mut state: LedgerState, now: DateTime<Utc>) -> Self {
        state.monthly_allowance = config.monthly_allowance;
        let mut ledger = Self { state };
        ledger.maybe_rollover(now);
        ledger
    }

    /// Tokens left this month.
    pub fn remaining(&mut self, now: DateTime<Utc>) -> u64 {
        self.maybe_rollover(now);
        self.state.remaining()
    }

    /// Spends one token. Returns the tokens left afterwards.
    pub fn try_consume(&mut self, now: DateTime<Utc>) -> Result<u64, VitrinaError> {
        self.maybe_rollover(now);

        let total = self
            .state
            .monthly_allowance
            .saturating_add(self.state.bonus_added);
        if self.state.remaining() == 0 {
            return Err(VitrinaError::TokensExhausted {
                message: format!(
                    "all {total} tokens for {} are used. Refills next month.",
                    self.state.month_key
                ),
            });
        }

        self.state.used += 1;
        let remaining = self.state.remaining();
        if total > 0 && self.state.used.saturating_mul(5) >= total.saturating_mul(4) {
            warn!(
                used = self.state.used,
                total,
                remaining,
                "approaching monthly token allowance (80%+)"
            );
        }
        Ok(remaining)
    }

    /// Adds bonus tokens for the current month. Returns the new remaining count.
    ///
    /// Fails without changing the ledger when allowance plus bonus would no
    /// longer fit in a `u64`.
    pub fn add_bonus(&mut self, tokens: u64, now: DateTime<Utc>) -> Result<u64, VitrinaError> {
        self.maybe_rollover(now);
        let bonus_added = self
            .state
            .bonus_added
            .checked_add(tokens)
            .filter(|bonus| self.state.monthly_allowance.checked_add(*bonus).is_some())
            .ok_or_else(|| VitrinaError::InvalidTopUp {
                message: format!(
                    "{tokens} tokens would overflow the {} allowance",
                    self.state.month_key
                ),
            })?;
        self.state.bonus_added = bonus_added;
        info!(tokens, bonus_added, "token top-up applied");
        Ok(self.state.remaining())
    }

    /// Increments one business counter.
    pub fn record(&mut self, metric: LedgerMetric, now: DateTime<Utc>) {
        self.maybe_rollover(now);
        metric.bump(&mut self.state.metrics);
    }

    /// A copy of the current state, rolled over to `now`'s month.
    pub fn snapshot(&mut self, now: DateTime<Utc>) -> LedgerState {
        self.maybe_rollover(now);
        self.state.clone()
    }

    pub fn metrics(&self) -> &LedgerMetrics {
        &self.state.metrics
    }

    fn maybe_rollover(&mut self, now: DateTime<Utc>) {
        let key = month_key(now);
        if key != self.state.month_key {
            info!(
                from = %self.state.month_key,
                to = %key,
                used = self.state.used,
                "token allowance rolled over"
            );
            self.state.month_key = key;
            self.state.used = 0;
            self.state.bonus_added = 0;
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use proptest::prelude::*;

    use super::*;

    fn config(allowance: u64) -> TokenConfig {
        TokenConfig {
            monthly_allowance: allowance,
        }
    }

    fn day(month: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, month, d, 12, 0, 0).unwrap()
    }

    #[test]
    fn consume_counts_down_then_exhausts() {
        let mut ledger = AccountLedger::new(&config(2), day(3, 1));
        assert_eq!(ledger.try_consume(day(3, 2)).unwrap(), 1);
        assert_eq!(ledger.try_consume(day(3, 3)).unwrap(), 0);
        let err = ledger.try_consume(day(3, 4)).unwrap_err();
        assert!(matches!(err, VitrinaError::TokensExhausted { .. }));
        assert_eq!(ledger.remaining(day(3, 4)), 0);
    }

    #[test]
    fn zero_allowance_refuses_immediately() {
        let mut ledger = AccountLedger::new(&config(0), day(3, 1));
        assert!(ledger.try_consume(day(3, 1)).is_err());
    }

    #[test]
    fn bonus_extends_current_month() {
        let mut ledger = AccountLedger::new(&config(1), day(3, 1));
        ledger.try_consume(day(3, 1)).unwrap();
        assert_eq!(ledger.add_bonus(5, day(3, 2)).unwrap(), 5);
        assert_eq!(ledger.try_consume(day(3, 2)).unwrap(), 4);
    }

    #[test]
    fn bonus_that_would_overflow_is_refused() {
        let mut ledger = AccountLedger::new(&config(10), day(3, 1));
        let err = ledger.add_bonus(u64::MAX, day(3, 2)).unwrap_err();
        assert!(matches!(err, VitrinaError::InvalidTopUp { .. }));

        let state = ledger.snapshot(day(3, 2));
        assert_eq!(state.bonus_added, 0);
        assert_eq!(state.remaining(), 10);

        assert_eq!(ledger.add_bonus(u64::MAX - 10, day(3, 3)).unwrap(), u64::MAX);
        assert!(ledger.add_bonus(1, day(3, 3)).is_err());
    }

    #[test]
    fn rollover_resets_tokens_but_keeps_metrics() {
        let mut ledger = AccountLedger::new(&config(3), day(3, 1));
        ledger.try_consume(day(3, 10)).unwrap();
        ledger.add_bonus(10, day(3, 10)).unwrap();
        ledger.record(LedgerMetric::QuoteSent, day(3, 10));
        ledger.record(LedgerMetric::QuoteSent, day(3, 11));

        let snapshot = ledger.snapshot(day(4, 1));
        assert_eq!(snapshot.month_key, "2026-04");
        assert_eq!(snapshot.used, 0);
        assert_eq!(snapshot.bonus_added, 0);
        assert_eq!(snapshot.remaining(), 3);
        assert_eq!(snapshot.metrics.quotes_sent, 2);
    }

    #[test]
    fn restore_from_previous_month_rolls_over() {
        let mut old = AccountLedger::new(&config(3), day(1, 5));
        old.try_consume(day(1, 5)).unwrap();
        old.record(LedgerMetric::PaymentConfirmed, day(1, 5));
        let state = old.snapshot(day(1, 6));

        let mut restored = AccountLedger::restore(&config(7), state, day(2, 1));
        assert_eq!(restored.remaining(day(2, 1)), 7);
        assert_eq!(restored.metrics().payments_confirmed, 1);
    }

    #[test]
    fn restore_same_month_keeps_usage() {
        let mut old = AccountLedger::new(&config(3), day(5, 1));
        old.try_consume(day(5, 1)).unwrap();
        let state = old.snapshot(day(5, 2));

        let mut restored = AccountLedger::restore(&config(3), state, day(5, 20));
        assert_eq!(restored.remaining(day(5, 20)), 2);
    }

    proptest! {
        #[test]
        fn remaining_never_exceeds_allowance_plus_bonus(
            allowance in 0u64..50,
            ops in proptest::collection::vec(0u8..3, 0..100),
        ) {
            let mut ledger = AccountLedger::new(&config(allowance), day(6, 1));
            let mut bonus = 0u64;
            for op in ops {
                match op {
                    0 => { let _ = ledger.try_consume(day(6, 2)); }
                    1 => { ledger.add_bonus(2, day(6, 2)).unwrap(); bonus += 2; }
                    _ => { ledger.record(LedgerMetric::IntentYes, day(6, 2)); }
                }
                let remaining = ledger.remaining(day(6, 2));
                prop_assert!(remaining <= allowance + bonus);
            }
        }

        #[test]
        fn successful_consumes_are_bounded_by_allowance(allowance in 0u64..30, attempts in 0usize..60) {
            let mut ledger = AccountLedger::new(&config(allowance), day(7, 1));
            let granted = (0..attempts)
                .filter(|_| ledger.try_consume(day(7, 1)).is_ok())
                .count() as u64;
            prop_assert_eq!(granted, allowance.min(attempts as u64));
        }
    }
}
