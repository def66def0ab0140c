// SPDX-FileCopyrightText: 2026 Vitrina Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Metric registration and recording helpers.
//!
//! Uses the metrics-rs facade so any recorder (Prometheus, statsd, etc.)
//! can collect these metrics. With no recorder installed the calls are no-ops.

use metrics::{describe_counter, describe_gauge};

/// Register all Vitrina metric descriptions.
///
/// Called once at startup after the recorder is installed.
pub fn register_metrics() {
    describe_counter!("vitrina_events_total", "Inbound webhook events processed");
    describe_counter!("vitrina_outbound_total", "Outbound message deliveries by result");
    describe_counter!(
        "vitrina_transitions_total",
        "Session state transitions by target state"
    );
    describe_gauge!("vitrina_active_sessions", "Sessions held in memory");
    describe_gauge!(
        "vitrina_tokens_remaining",
        "Purchase-intent tokens left this month"
    );
}

/// Record an inbound event (`text` or `image`).
pub fn record_event(kind: &str) {
    metrics::counter!("vitrina_events_total", "kind" => kind.to_string()).increment(1);
}

/// Record an outbound delivery attempt (`ok` or `error`).
pub fn record_outbound(result: &str) {
    metrics::counter!("vitrina_outbound_total", "result" => result.to_string()).increment(1);
}

/// Record a session entering `to`.
pub fn record_transition(to: &str) {
    metrics::counter!("vitrina_transitions_total", "to" => to.to_string()).increment(1);
}

pub fn set_active_sessions(count: f64) {
    metrics::gauge!("vitrina_active_sessions").set(count);
}

pub fn set_tokens_remaining(tokens: f64) {
    metrics::gauge!("vitrina_tokens_remaining").set(tokens);
}
