// SPDX-FileCopyrightText: 2026 Vitrina Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Conversation engine for Vitrina.
//!
//! The [`ConversationEngine`] is a pure state machine over customer sessions:
//! it consumes inbound messages, vendor commands, timer fires and
//! language-model answers and returns [`Effect`]s. The [`EngineRuntime`]
//! owns the engine, serializes every event through one queue and carries the
//! effects out (sends, timers, model calls, snapshots).

pub mod burst;
pub mod engine;
pub mod intent;
pub mod phrases;
pub mod quotes;
pub mod replies;
pub mod runtime;
pub mod shutdown;
pub mod sinpe;
pub mod store;
pub mod timers;
pub mod vendor;

pub use engine::{ConversationEngine, Effect, EngineSettings};
pub use phrases::{PhraseCategory, PhrasePool};
pub use runtime::{Command, EngineHandle, EngineRuntime};
pub use shutdown::install_signal_handler;
pub use store::{SessionStore, TimerDelays};
pub use timers::TimerKind;
pub use vendor::{VendorAction, VendorCommand};
