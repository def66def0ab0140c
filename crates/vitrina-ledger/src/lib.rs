// SPDX-FileCopyrightText: 2026 Vitrina Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Account ledger for Vitrina.
//!
//! - **Token allowance**: one token is spent each time a customer confirms
//!   they want to buy. The allowance refills on the first request of a new
//!   calendar month; vendor top-ups add bonus tokens for the current month.
//! - **Business counters**: cumulative totals (quotes, payments, closures)
//!   that are never reset on rollover.

pub mod budget;
pub mod metrics;

pub use budget::{AccountLedger, month_key};
pub use metrics::LedgerMetric;
