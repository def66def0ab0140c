// SPDX-FileCopyrightText: 2026 Vitrina Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test utilities for Vitrina integration tests.
//!
//! Provides mock adapters and a harness that runs the real engine runtime
//! against them, so conversations can be driven end to end without a
//! network.
//!
//! # Components
//!
//! - [`MockChannel`] - Captures outbound messages, can be told to fail
//! - [`MockProvider`] - Language model with queued answers
//! - [`TestHarness`] - Running engine wired to both mocks

pub mod harness;
pub mod mock_channel;
pub mod mock_provider;

pub use harness::{CUSTOMER_ID, TestHarness, TestHarnessBuilder, VENDOR_ID};
pub use mock_channel::MockChannel;
pub use mock_provider::MockProvider;
