// SPDX-FileCopyrightText: 2026 Vitrina Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SINPE Móvil payment helpers: reference codes, the wait-timer check and
//! matching of bank notifications the vendor forwards.

use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use sha2::{Digest, Sha256};
use vitrina_core::{PaymentStatus, Session, SessionState};

/// Bytes of the SHA-256 digest kept for the reference (6 hex characters).
const REFERENCE_BYTES: usize = 3;

/// Amounts such as `12500`, `12.500`, `12,500.00` or `₡ 12 500,00`.
static AMOUNT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\d{1,3}(?:[.,\s]\d{3})+(?:[.,]\d{2})?|\d+(?:[.,]\d{2})?")
        .unwrap_or_else(|e| panic!("invalid amount regex: {e}"))
});

/// Short code the customer writes in the transfer description.
pub fn payment_reference(customer_id: &str, now: DateTime<Utc>) -> String {
    let digest = Sha256::digest(format!("{customer_id}:{}", now.timestamp()));
    hex::encode_upper(&digest[..REFERENCE_BYTES])
}

/// Whether the wait timer should alert the vendor for this session.
///
/// True only while the session still waits on a pending payment.
pub fn should_alert(session: &Session) -> bool {
    session.state == SessionState::AwaitingPayment
        && session
            .pending_payment
            .as_ref()
            .is_some_and(|p| p.status == PaymentStatus::Pending)
}

/// Heuristic for a forwarded bank notification: mentions SINPE and a number.
pub fn looks_like_notification(normalized: &str) -> bool {
    normalized.contains("sinpe") && !extract_amounts(normalized).is_empty()
}

/// Every amount in `text`, in colones, decimals dropped.
pub fn extract_amounts(text: &str) -> Vec<u64> {
    AMOUNT
        .find_iter(text)
        .filter_map(|m| parse_amount(m.as_str()))
        .collect()
}

fn parse_amount(raw: &str) -> Option<u64> {
    let bytes = raw.as_bytes();
    // A separator followed by exactly two digits at the end is a decimal part.
    let whole = if bytes.len() > 3 && matches!(bytes[bytes.len() - 3], b'.' | b',') {
        &raw[..raw.len() - 3]
    } else {
        raw
    };
    let digits: String = whole.chars().filter(char::is_ascii_digit).collect();
    digits.parse().ok()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchOutcome {
    /// Exactly one session matches.
    Matched(String),
    /// Several sessions wait for the same amount and no reference decided.
    Ambiguous(Vec<String>),
    NoMatch,
}

/// Matches a bank notification against sessions awaiting payment.
///
/// A reference code found in the text wins, provided the amount also
/// appears. Otherwise an amount that exactly one session expects wins.
pub fn match_notification<'a>(
    text: &str,
    sessions: impl IntoIterator<Item = &'a Session>,
) -> MatchOutcome {
    let upper = text.to_uppercase();
    let amounts = extract_amounts(text);
    let candidates: Vec<(&str, &str, u64)> = sessions
        .into_iter()
        .filter(|s| should_alert(s))
        .filter_map(|s| {
            s.pending_payment
                .as_ref()
                .map(|p| (s.id.as_str(), p.reference.as_str(), p.expected_amount))
        })
        .collect();

    let by_reference: Vec<&str> = candidates
        .iter()
        .filter(|(_, reference, amount)| upper.contains(reference) && amounts.contains(amount))
        .map(|(id, _, _)| *id)
        .collect();
    if let [id] = by_reference.as_slice() {
        return MatchOutcome::Matched((*id).to_string());
    }

    let by_amount: Vec<&str> = candidates
        .iter()
        .filter(|(_, _, amount)| amounts.contains(amount))
        .map(|(id, _, _)| *id)
        .collect();
    match by_amount.as_slice() {
        [] => MatchOutcome::NoMatch,
        [id] => MatchOutcome::Matched((*id).to_string()),
        many => MatchOutcome::Ambiguous(many.iter().map(|id| id.to_string()).collect()),
    }
}
