// SPDX-FileCopyrightText: 2026 Vitrina Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite snapshot persistence for Vitrina.
//!
//! Stores the engine's sessions and token ledger so a restart resumes open
//! conversations. All access goes through one `tokio-rusqlite` background
//! thread; migrations are embedded and run on open.

pub mod adapter;
pub mod database;
pub mod migrations;

pub use adapter::SqliteSnapshotStore;
pub use database::Database;
