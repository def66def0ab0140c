// SPDX-FileCopyrightText: 2026 Vitrina Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock language-model provider for deterministic testing.
//!
//! `MockProvider` implements `CompletionAdapter` with queued answers and
//! records every request it receives.

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use vitrina_core::traits::adapter::PluginAdapter;
use vitrina_core::traits::provider::CompletionAdapter;
use vitrina_core::types::{AdapterType, CompletionReply, CompletionRequest, HealthStatus};
use vitrina_core::VitrinaError;

/// A mock provider that answers from a FIFO queue.
///
/// `None` entries, and an empty queue, mean "no usable answer".
pub struct MockProvider {
    replies: Arc<Mutex<VecDeque<Option<CompletionReply>>>>,
    requests: Arc<Mutex<Vec<CompletionRequest>>>,
}

impl MockProvider {
    pub fn new() -> Self {
        Self {
            replies: Arc::new(Mutex::new(VecDeque::new())),
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Create a mock provider pre-loaded with the given answers.
    pub fn with_replies(replies: Vec<CompletionReply>) -> Self {
        Self {
            replies: Arc::new(Mutex::new(replies.into_iter().map(Some).collect())),
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub async fn push_reply(&self, reply: Option<CompletionReply>) {
        self.replies.lock().await.push_back(reply);
    }

    /// Requests received so far.
    pub async fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().await.clone()
    }
}

impl Default for MockProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PluginAdapter for MockProvider {
    fn name(&self) -> &str {
        "mock-provider"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Provider
    }

    async fn health_check(&self) -> Result<HealthStatus, VitrinaError> {
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), VitrinaError> {
        Ok(())
    }
}

#[async_trait]
impl CompletionAdapter for MockProvider {
    async fn complete(
        &self,
        request: CompletionRequest,
    ) -> Result<Option<CompletionReply>, VitrinaError> {
        self.requests.lock().await.push(request);
        Ok(self.replies.lock().await.pop_front().flatten())
    }
}
