// SPDX-FileCopyrightText: 2026 Vitrina Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs.
//!
//! All structs use `#[serde(deny_unknown_fields)]` to reject unrecognized
//! config keys at startup, providing actionable error messages.

use serde::{Deserialize, Serialize};

/// Top-level Vitrina configuration.
///
/// Every section is optional and falls back to defaults that run a
/// ship-and-pickup store with no vendor, no transport credentials and the
/// language model disabled.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct VitrinaConfig {
    #[serde(default)]
    pub bot: BotConfig,

    /// What the store offers and how it answers common questions.
    #[serde(default)]
    pub store: StoreConfig,

    #[serde(default)]
    pub vendor: VendorConfig,

    #[serde(default)]
    pub whatsapp: WhatsAppConfig,

    #[serde(default)]
    pub anthropic: AnthropicConfig,

    #[serde(default)]
    pub timers: TimerConfig,

    #[serde(default)]
    pub tokens: TokenConfig,

    #[serde(default)]
    pub payment: PaymentConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub gateway: GatewayConfig,
}

/// Process identity and logging.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct BotConfig {
    #[serde(default = "default_bot_name")]
    pub name: String,

    /// Logging level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            name: default_bot_name(),
            log_level: default_log_level(),
        }
    }
}

fn default_bot_name() -> String {
    "vitrina".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Store profile: capabilities, catalog, FAQ answers and SINPE details.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StoreConfig {
    /// Display name used in greetings.
    #[serde(default = "default_store_name")]
    pub name: String,

    /// The store ships orders.
    #[serde(default = "default_true")]
    pub ships: bool,

    /// The store accepts in-person pickup.
    #[serde(default = "default_true")]
    pub pickup: bool,

    /// Where pickup happens, quoted back when the customer chooses pickup.
    #[serde(default)]
    pub pickup_address: Option<String>,

    /// Catalog links sent at most once per session unless the vendor asks again.
    #[serde(default)]
    pub catalog_links: Vec<String>,

    /// Forward a single image without caption straight to the vendor instead
    /// of asking the customer for details first.
    #[serde(default)]
    pub forward_without_caption: bool,

    #[serde(default)]
    pub faq: FaqConfig,

    #[serde(default)]
    pub sinpe: SinpeConfig,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            name: default_store_name(),
            ships: true,
            pickup: true,
            pickup_address: None,
            catalog_links: Vec::new(),
            forward_without_caption: false,
            faq: FaqConfig::default(),
            sinpe: SinpeConfig::default(),
        }
    }
}

fn default_store_name() -> String {
    "la tienda".to_string()
}

fn default_true() -> bool {
    true
}

/// Canned answers for frequently asked questions. Unset topics fall through
/// to the rest of the rule chain.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct FaqConfig {
    #[serde(default)]
    pub price: Option<String>,
    #[serde(default)]
    pub stock: Option<String>,
    #[serde(default)]
    pub shipping: Option<String>,
    #[serde(default)]
    pub hours: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub payment_methods: Option<String>,
    #[serde(default)]
    pub warranty: Option<String>,
}

/// Where customers send SINPE transfers.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct SinpeConfig {
    /// SINPE Móvil phone number.
    #[serde(default)]
    pub number: Option<String>,

    /// Account holder name shown to the customer.
    #[serde(default)]
    pub holder: Option<String>,
}

/// The store operator who answers quotes.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct VendorConfig {
    /// Vendor phone number, digits only. `None` means quote requests go nowhere.
    #[serde(default)]
    pub phone: Option<String>,
}

/// WhatsApp Cloud API settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct WhatsAppConfig {
    /// Graph API access token. `None` disables outbound delivery.
    #[serde(default)]
    pub access_token: Option<String>,

    /// Business phone number id messages are sent from.
    #[serde(default)]
    pub phone_number_id: Option<String>,

    /// Token echoed back during the webhook verification handshake.
    #[serde(default)]
    pub verify_token: Option<String>,

    #[serde(default = "default_graph_api_version")]
    pub api_version: String,

    #[serde(default = "default_graph_base_url")]
    pub base_url: String,
}

impl Default for WhatsAppConfig {
    fn default() -> Self {
        Self {
            access_token: None,
            phone_number_id: None,
            verify_token: None,
            api_version: default_graph_api_version(),
            base_url: default_graph_base_url(),
        }
    }
}

fn default_graph_api_version() -> String {
    "v21.0".to_string()
}

fn default_graph_base_url() -> String {
    "https://graph.facebook.com".to_string()
}

/// Anthropic API settings for the language-model fallback.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct AnthropicConfig {
    /// API key. `None` disables the fallback entirely.
    #[serde(default)]
    pub api_key: Option<String>,

    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Anthropic API version header value.
    #[serde(default = "default_api_version")]
    pub api_version: String,

    /// Overrides the built-in system prompt.
    #[serde(default)]
    pub system_prompt: Option<String>,
}

impl Default for AnthropicConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: default_model(),
            max_tokens: default_max_tokens(),
            api_version: default_api_version(),
            system_prompt: None,
        }
    }
}

fn default_model() -> String {
    "claude-haiku-4-5".to_string()
}

fn default_max_tokens() -> u32 {
    300
}

fn default_api_version() -> String {
    "2023-06-01".to_string()
}

/// Timer durations, in seconds.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct TimerConfig {
    /// Quiet interval that ends a photo burst.
    #[serde(default = "default_burst_quiet_secs")]
    pub burst_quiet_secs: u64,

    /// How long to wait for automatic SINPE confirmation before alerting the vendor.
    #[serde(default = "default_sinpe_wait_secs")]
    pub sinpe_wait_secs: u64,

    /// Inactivity before an in-progress conversation is closed.
    #[serde(default = "default_session_timeout_secs")]
    pub session_timeout_secs: u64,

    /// Delay before nudging a customer who has not answered a quote.
    /// Zero disables the reminder.
    #[serde(default = "default_reminder_secs")]
    pub reminder_secs: u64,

    /// Delay before a confirmed order is cleared for the next purchase.
    #[serde(default = "default_order_reset_secs")]
    pub order_reset_secs: u64,
}

impl Default for TimerConfig {
    fn default() -> Self {
        Self {
            burst_quiet_secs: default_burst_quiet_secs(),
            sinpe_wait_secs: default_sinpe_wait_secs(),
            session_timeout_secs: default_session_timeout_secs(),
            reminder_secs: default_reminder_secs(),
            order_reset_secs: default_order_reset_secs(),
        }
    }
}

fn default_burst_quiet_secs() -> u64 {
    5
}

fn default_sinpe_wait_secs() -> u64 {
    180
}

fn default_session_timeout_secs() -> u64 {
    2 * 60 * 60
}

fn default_reminder_secs() -> u64 {
    30 * 60
}

fn default_order_reset_secs() -> u64 {
    24 * 60 * 60
}

/// Monthly purchase-intent allowance.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct TokenConfig {
    #[serde(default = "default_monthly_allowance")]
    pub monthly_allowance: u64,
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self {
            monthly_allowance: default_monthly_allowance(),
        }
    }
}

fn default_monthly_allowance() -> u64 {
    100
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct PaymentConfig {
    /// Match forwarded SINPE notifications against pending payments and
    /// alert the vendor when nothing arrives in time.
    #[serde(default)]
    pub auto_detection: bool,
}

/// Snapshot persistence settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    #[serde(default)]
    pub enabled: bool,

    /// Path to the SQLite database file.
    #[serde(default = "default_database_path")]
    pub database_path: String,

    /// Enable WAL (Write-Ahead Logging) mode for concurrent reads.
    #[serde(default = "default_true")]
    pub wal_mode: bool,

    #[serde(default = "default_snapshot_interval_secs")]
    pub snapshot_interval_secs: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            database_path: default_database_path(),
            wal_mode: true,
            snapshot_interval_secs: default_snapshot_interval_secs(),
        }
    }
}

fn default_database_path() -> String {
    dirs::data_local_dir()
        .map(|d| d.join("vitrina").join("vitrina.db"))
        .unwrap_or_else(|| std::path::PathBuf::from("vitrina.db"))
        .display()
        .to_string()
}

fn default_snapshot_interval_secs() -> u64 {
    60
}

/// HTTP server settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct GatewayConfig {
    #[serde(default = "default_gateway_host")]
    pub host: String,

    #[serde(default = "default_gateway_port")]
    pub port: u16,

    /// Bearer token for the `/v1` operational API. `None` keeps it locked.
    #[serde(default)]
    pub bearer_token: Option<String>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: default_gateway_host(),
            port: default_gateway_port(),
            bearer_token: None,
        }
    }
}

fn default_gateway_host() -> String {
    "127.0.0.1".to_string()
}

fn default_gateway_port() -> u16 {
    3000
}
