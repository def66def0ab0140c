// SPDX-FileCopyrightText: 2026 Vitrina Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Snapshot persistence trait.

use async_trait::async_trait;

use crate::error::VitrinaError;
use crate::traits::adapter::PluginAdapter;
use crate::types::EngineSnapshot;

/// Persists engine snapshots so sessions and the ledger survive restarts.
#[async_trait]
pub trait SnapshotStore: PluginAdapter {
    /// Prepares the backend (migrations, pragmas).
    async fn initialize(&self) -> Result<(), VitrinaError>;

    /// Replaces the stored snapshot with `snapshot`.
    async fn save(&self, snapshot: &EngineSnapshot) -> Result<(), VitrinaError>;

    /// Loads the last saved snapshot, if any.
    async fn load(&self) -> Result<Option<EngineSnapshot>, VitrinaError>;

    /// Flushes pending writes and releases connections.
    async fn close(&self) -> Result<(), VitrinaError>;
}
