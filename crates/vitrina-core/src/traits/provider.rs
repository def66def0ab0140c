// SPDX-FileCopyrightText: 2026 Vitrina Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Language-model fallback trait.

use async_trait::async_trait;

use crate::error::VitrinaError;
use crate::traits::adapter::PluginAdapter;
use crate::types::{CompletionReply, CompletionRequest};

/// Answers free-form customer questions the rule chain could not handle.
#[async_trait]
pub trait CompletionAdapter: PluginAdapter {
    /// Returns `Ok(None)` when the model produced nothing usable.
    async fn complete(
        &self,
        request: CompletionRequest,
    ) -> Result<Option<CompletionReply>, VitrinaError>;
}
