// SPDX-FileCopyrightText: 2026 Vitrina Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for Vitrina.

use thiserror::Error;

/// The primary error type used across all Vitrina adapter traits and engine operations.
#[derive(Debug, Error)]
pub enum VitrinaError {
    /// Configuration errors (invalid TOML, missing required fields, type mismatches).
    #[error("configuration error: {0}")]
    Config(String),

    /// Snapshot storage errors (database connection, query failure, serialization).
    #[error("storage error: {source}")]
    Storage {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Messaging transport errors (webhook payload, Graph API failure, rate limiting).
    #[error("channel error: {message}")]
    Channel {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Language-model provider errors (API failure, unparseable reply).
    #[error("provider error: {message}")]
    Provider {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// The monthly purchase-intent token allowance is used up.
    #[error("tokens exhausted: {message}")]
    TokensExhausted { message: String },

    /// A token top-up that would push the allowance past what the counters hold.
    #[error("invalid top-up: {message}")]
    InvalidTopUp { message: String },

    /// A vendor command or ops query named a customer with no session.
    #[error("unknown customer: {customer_id}")]
    UnknownCustomer { customer_id: String },

    /// Operation timed out.
    #[error("operation timed out after {duration:?}")]
    Timeout { duration: std::time::Duration },

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}
