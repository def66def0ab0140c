// SPDX-FileCopyrightText: 2026 Vitrina Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `vitrina serve` command implementation.
//!
//! Wires the WhatsApp channel, the optional language-model fallback and the
//! optional SQLite snapshots around one conversation runtime, then serves
//! the webhook and operational API until SIGINT/SIGTERM.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tracing::{error, info, warn};
use vitrina_config::model::VitrinaConfig;
use vitrina_core::{
    AdapterType, ChannelAdapter, HealthStatus, MessageId, OutboundMessage, PluginAdapter,
    VitrinaError,
};
use vitrina_engine::{ConversationEngine, EngineRuntime, EngineSettings, install_signal_handler};
use vitrina_gateway::{AuthConfig, GatewayState, ServerConfig, start_server};
use vitrina_whatsapp::WhatsAppChannel;

#[cfg(feature = "anthropic")]
use vitrina_anthropic::AnthropicProvider;

#[cfg(feature = "sqlite")]
use vitrina_core::SnapshotStore;
#[cfg(feature = "sqlite")]
use vitrina_storage::SqliteSnapshotStore;

/// Stand-in channel used when WhatsApp credentials are missing: every
/// outbound message is written to the log instead of delivered.
struct LogChannel;

#[async_trait]
impl PluginAdapter for LogChannel {
    fn name(&self) -> &str {
        "log"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Channel
    }

    async fn health_check(&self) -> Result<HealthStatus, VitrinaError> {
        Ok(HealthStatus::Degraded(
            "no WhatsApp credentials; messages are logged, not delivered".into(),
        ))
    }

    async fn shutdown(&self) -> Result<(), VitrinaError> {
        Ok(())
    }
}

#[async_trait]
impl ChannelAdapter for LogChannel {
    async fn send(&self, msg: OutboundMessage) -> Result<MessageId, VitrinaError> {
        info!(
            recipient = %msg.recipient_id,
            image = ?msg.image_ref,
            body = %msg.body,
            "outbound message (not delivered)"
        );
        Ok(MessageId(format!("log-{}", uuid::Uuid::new_v4())))
    }
}

fn build_channel(config: &VitrinaConfig) -> Result<Arc<dyn ChannelAdapter>, VitrinaError> {
    if config.whatsapp.access_token.is_none() {
        warn!("whatsapp.access_token not set -- outbound messages will only be logged");
        return Ok(Arc::new(LogChannel));
    }
    let channel = WhatsAppChannel::new(&config.whatsapp)?;
    info!(url = channel.messages_url(), "WhatsApp channel ready");
    Ok(Arc::new(channel))
}

/// Runs the `vitrina serve` command.
pub async fn run_serve(config: VitrinaConfig) -> Result<(), VitrinaError> {
    init_tracing(&config.bot.log_level);

    info!(store = %config.store.name, "starting vitrina serve");
    if config.vendor.phone.is_none() {
        warn!("vendor.phone not set -- quote requests cannot reach the vendor");
    }

    #[cfg(feature = "prometheus")]
    let prometheus_adapter = match vitrina_prometheus::PrometheusAdapter::new() {
        Ok(adapter) => Some(adapter),
        Err(e) => {
            warn!(error = %e, "prometheus initialization failed, continuing without metrics");
            None
        }
    };

    let channel = build_channel(&config)?;
    let engine = ConversationEngine::new(EngineSettings::from_config(&config), Utc::now());
    let (mut runtime, handle) = EngineRuntime::new(engine, channel);

    #[cfg(feature = "anthropic")]
    {
        if config.anthropic.api_key.is_some() {
            let provider = AnthropicProvider::new(&config.anthropic)?;
            runtime = runtime.with_provider(Arc::new(provider));
        } else {
            info!("anthropic.api_key not set -- language-model fallback disabled");
        }
    }

    #[cfg(feature = "sqlite")]
    {
        if config.storage.enabled {
            let store = Arc::new(SqliteSnapshotStore::new(config.storage.clone()));
            store.initialize().await?;
            runtime = runtime.with_snapshots(
                store,
                std::time::Duration::from_secs(config.storage.snapshot_interval_secs),
            );
            runtime.restore().await?;
        }
    }
    #[cfg(not(feature = "sqlite"))]
    if config.storage.enabled {
        warn!("storage.enabled is set but this build has no sqlite support");
    }

    if config
        .gateway
        .bearer_token
        .as_deref()
        .is_none_or(str::is_empty)
    {
        warn!("gateway.bearer_token not set -- the /v1 operational API will reject every request");
    }

    let state = GatewayState::new(
        handle,
        config.whatsapp.verify_token.clone(),
        AuthConfig {
            bearer_token: config.gateway.bearer_token.clone(),
        },
    );
    #[cfg(feature = "prometheus")]
    let state = match &prometheus_adapter {
        Some(adapter) => {
            let handle = adapter.handle().clone();
            state.with_metrics(Arc::new(move || handle.render()))
        }
        None => state,
    };

    let cancel = install_signal_handler();

    let server_config = ServerConfig::from(&config.gateway);
    let gateway_cancel = cancel.clone();
    let gateway = tokio::spawn(async move {
        let result = start_server(&server_config, state, gateway_cancel.clone()).await;
        if let Err(e) = &result {
            error!(error = %e, "gateway failed, shutting down");
            gateway_cancel.cancel();
        }
        result
    });

    log_memory_usage();
    runtime.run(cancel).await?;

    gateway
        .await
        .map_err(|e| VitrinaError::Internal(format!("gateway task failed: {e}")))??;

    log_memory_usage();
    info!("vitrina serve shutdown complete");
    Ok(())
}

/// Logs jemalloc heap statistics.
#[cfg(not(target_env = "msvc"))]
fn log_memory_usage() {
    let _ = tikv_jemalloc_ctl::epoch::advance();
    let allocated = tikv_jemalloc_ctl::stats::allocated::read().unwrap_or(0);
    let resident = tikv_jemalloc_ctl::stats::resident::read().unwrap_or(0);
    info!(
        allocated_kb = allocated / 1024,
        resident_kb = resident / 1024,
        "memory usage"
    );
}

#[cfg(target_env = "msvc")]
fn log_memory_usage() {}

/// Initializes the tracing subscriber with the given log level.
fn init_tracing(log_level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("vitrina={log_level},warn")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_names(false)
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_credentials_fall_back_to_log_channel() {
        let config = VitrinaConfig::default();
        let channel = build_channel(&config).unwrap();
        assert_eq!(channel.name(), "log");
        let id = channel
            .send(OutboundMessage::text("50688881234", "hola"))
            .await
            .unwrap();
        assert!(id.0.starts_with("log-"));
    }

    #[test]
    fn credentials_select_whatsapp() {
        let mut config = VitrinaConfig::default();
        config.whatsapp.access_token = Some("token".into());
        config.whatsapp.phone_number_id = Some("999".into());
        let channel = build_channel(&config).unwrap();
        assert_eq!(channel.name(), "whatsapp");
    }
}
