// SPDX-FileCopyrightText: 2026 Vitrina Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP gateway for Vitrina.
//!
//! Serves the WhatsApp webhook (subscription handshake and message
//! delivery), unauthenticated health and metrics endpoints, and a small
//! bearer-protected operational API over the running engine.

pub mod auth;
pub mod handlers;
pub mod server;

pub use auth::AuthConfig;
pub use server::{GatewayState, HealthState, ServerConfig, build_router, start_server};
