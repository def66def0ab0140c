// SPDX-FileCopyrightText: 2026 Vitrina Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock messaging transport for deterministic testing.
//!
//! `MockChannel` implements `ChannelAdapter` and captures every outbound
//! message for assertion. It can be switched into a failing mode to exercise
//! best-effort delivery.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Mutex, Notify};

use vitrina_core::traits::adapter::PluginAdapter;
use vitrina_core::traits::channel::ChannelAdapter;
use vitrina_core::types::{AdapterType, HealthStatus, MessageId, OutboundMessage};
use vitrina_core::VitrinaError;

/// A mock messaging transport.
pub struct MockChannel {
    sent: Arc<Mutex<Vec<OutboundMessage>>>,
    notify: Arc<Notify>,
    failing: AtomicBool,
}

impl MockChannel {
    /// Create a new mock channel with nothing sent.
    pub fn new() -> Self {
        Self {
            sent: Arc::new(Mutex::new(Vec::new())),
            notify: Arc::new(Notify::new()),
            failing: AtomicBool::new(false),
        }
    }

    /// Get all messages that were sent through `send()`.
    pub async fn sent_messages(&self) -> Vec<OutboundMessage> {
        self.sent.lock().await.clone()
    }

    /// Messages sent to one recipient, in order.
    pub async fn sent_to(&self, recipient_id: &str) -> Vec<OutboundMessage> {
        self.sent
            .lock()
            .await
            .iter()
            .filter(|m| m.recipient_id == recipient_id)
            .cloned()
            .collect()
    }

    /// Get the count of sent messages.
    pub async fn sent_count(&self) -> usize {
        self.sent.lock().await.len()
    }

    /// Clear all sent messages.
    pub async fn clear_sent(&self) {
        self.sent.lock().await.clear();
    }

    /// Makes every following `send()` fail with a channel error.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Waits until at least `count` messages were sent or `timeout` passes,
    /// then returns everything sent so far.
    pub async fn wait_for_sent(&self, count: usize, timeout: Duration) -> Vec<OutboundMessage> {
        self.wait_until(timeout, |sent| sent.len() >= count).await;
        self.sent_messages().await
    }

    /// Like [`wait_for_sent`](Self::wait_for_sent) but only counts messages
    /// to `recipient_id`, and returns only those.
    pub async fn wait_for_sent_to(
        &self,
        recipient_id: &str,
        count: usize,
        timeout: Duration,
    ) -> Vec<OutboundMessage> {
        self.wait_until(timeout, |sent| {
            sent.iter().filter(|m| m.recipient_id == recipient_id).count() >= count
        })
        .await;
        self.sent_to(recipient_id).await
    }

    async fn wait_until(&self, timeout: Duration, done: impl Fn(&[OutboundMessage]) -> bool) {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let notified = self.notify.notified();
            if done(&self.sent.lock().await) {
                return;
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return;
            }
        }
    }
}

impl Default for MockChannel {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PluginAdapter for MockChannel {
    fn name(&self) -> &str {
        "mock-channel"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Channel
    }

    async fn health_check(&self) -> Result<HealthStatus, VitrinaError> {
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), VitrinaError> {
        Ok(())
    }
}

#[async_trait]
impl ChannelAdapter for MockChannel {
    async fn send(&self, msg: OutboundMessage) -> Result<MessageId, VitrinaError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(VitrinaError::Channel {
                message: format!("mock delivery to {} failed", msg.recipient_id),
                source: None,
            });
        }
        let id = format!("mock-msg-{}", uuid::Uuid::new_v4());
        self.sent.lock().await.push(msg);
        self.notify.notify_waiters();
        Ok(MessageId(id))
    }
}
