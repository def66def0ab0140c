// SPDX-FileCopyrightText: 2026 Vitrina Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test harness that runs the real engine runtime against mock adapters.
//!
//! `TestHarness` wires a [`ConversationEngine`] with a [`MockChannel`], an
//! optional [`MockProvider`] and an optional snapshot store, spawns the
//! runtime loop and exposes helpers to drive conversations.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use vitrina_config::VitrinaConfig;
use vitrina_core::{CompletionReply, InboundEvent, OutboundMessage, SnapshotStore, VitrinaError};
use vitrina_engine::{ConversationEngine, EngineHandle, EngineRuntime, EngineSettings, PhrasePool};

use crate::mock_channel::MockChannel;
use crate::mock_provider::MockProvider;

/// Vendor number every harness is configured with.
pub const VENDOR_ID: &str = "50670000000";

/// A customer number convenient for single-conversation tests.
pub const CUSTOMER_ID: &str = "50688881234";

/// Builder for constructing a [`TestHarness`] with custom configuration.
pub struct TestHarnessBuilder {
    config: VitrinaConfig,
    replies: Option<Vec<CompletionReply>>,
    snapshots: Option<(Arc<dyn SnapshotStore>, Duration)>,
    seed: u64,
}

impl TestHarnessBuilder {
    /// Store name, catalog, pickup address and SINPE number are preset.
    pub fn new() -> Self {
        let mut config = VitrinaConfig::default();
        config.vendor.phone = Some(VENDOR_ID.to_string());
        config.store.name = "Tienda Prueba".to_string();
        config.store.catalog_links = vec!["https://example.com/catalogo".to_string()];
        config.store.pickup_address = Some("San José centro".to_string());
        config.store.sinpe.number = Some("8888-0000".to_string());
        Self {
            config,
            replies: None,
            snapshots: None,
            seed: 7,
        }
    }

    /// Sets which delivery methods the store supports.
    pub fn with_capabilities(mut self, ships: bool, pickup: bool) -> Self {
        self.config.store.ships = ships;
        self.config.store.pickup = pickup;
        self
    }

    pub fn with_allowance(mut self, tokens: u64) -> Self {
        self.config.tokens.monthly_allowance = tokens;
        self
    }

    pub fn with_auto_payment_detection(mut self) -> Self {
        self.config.payment.auto_detection = true;
        self
    }

    /// Enables the language-model fallback backed by a [`MockProvider`]
    /// answering with `replies` in order.
    pub fn with_replies(mut self, replies: Vec<CompletionReply>) -> Self {
        self.config.anthropic.api_key = Some("test-key".to_string());
        self.replies = Some(replies);
        self
    }

    pub fn with_snapshots(mut self, store: Arc<dyn SnapshotStore>, interval: Duration) -> Self {
        self.snapshots = Some((store, interval));
        self
    }

    /// Arbitrary configuration tweaks not covered by the other setters.
    pub fn with_config(mut self, tweak: impl FnOnce(&mut VitrinaConfig)) -> Self {
        tweak(&mut self.config);
        self
    }

    /// Builds the engine, restores any snapshot and spawns the runtime loop.
    ///
    /// Must be called inside a Tokio runtime.
    pub async fn build(self) -> Result<TestHarness, VitrinaError> {
        let settings = EngineSettings::from_config(&self.config);
        let engine = ConversationEngine::with_phrases(
            settings,
            PhrasePool::with_seed(self.seed),
            Utc::now(),
        );

        let channel = Arc::new(MockChannel::new());
        let (mut runtime, handle) = EngineRuntime::new(engine, channel.clone());

        let provider = self.replies.map(|replies| Arc::new(MockProvider::with_replies(replies)));
        if let Some(provider) = &provider {
            runtime = runtime.with_provider(provider.clone());
        }
        if let Some((store, interval)) = self.snapshots {
            store.initialize().await?;
            runtime = runtime.with_snapshots(store, interval);
            runtime.restore().await?;
        }

        let cancel = CancellationToken::new();
        let task = tokio::spawn(runtime.run(cancel.clone()));

        Ok(TestHarness {
            handle,
            channel,
            provider,
            cancel,
            task,
        })
    }
}

impl Default for TestHarnessBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A running engine wired to mock adapters.
pub struct TestHarness {
    pub handle: EngineHandle,
    pub channel: Arc<MockChannel>,
    /// Present when the harness was built with [`TestHarnessBuilder::with_replies`].
    pub provider: Option<Arc<MockProvider>>,
    cancel: CancellationToken,
    task: JoinHandle<Result<(), VitrinaError>>,
}

impl TestHarness {
    pub fn builder() -> TestHarnessBuilder {
        TestHarnessBuilder::new()
    }

    /// Queues a text message from `from`.
    pub async fn text(&self, from: &str, body: &str) -> Result<(), VitrinaError> {
        self.handle.submit(InboundEvent::text(from, body)).await
    }

    /// Queues an image from `from`.
    pub async fn image(
        &self,
        from: &str,
        image_ref: &str,
        caption: Option<&str>,
    ) -> Result<(), VitrinaError> {
        self.handle
            .submit(InboundEvent::image(from, image_ref, caption.map(str::to_string)))
            .await
    }

    /// Waits until `count` messages in total went out, see
    /// [`MockChannel::wait_for_sent`].
    pub async fn wait_for_sent(&self, count: usize) -> Vec<OutboundMessage> {
        self.channel
            .wait_for_sent(count, Duration::from_secs(30))
            .await
    }

    /// Stops the runtime and waits for its shutdown sequence.
    pub async fn shutdown(self) -> Result<(), VitrinaError> {
        self.cancel.cancel();
        self.task
            .await
            .map_err(|e| VitrinaError::Internal(format!("runtime task failed: {e}")))?
    }
}
