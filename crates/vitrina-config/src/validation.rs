// SPDX-FileCopyrightText: 2026 Vitrina Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Post-deserialization validation for configuration values.

use crate::diagnostic::ConfigError;
use crate::model::VitrinaConfig;

/// Checks semantic constraints serde cannot express.
///
/// Collects every failure instead of stopping at the first one.
pub fn validate_config(config: &VitrinaConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();

    if let Some(phone) = &config.vendor.phone {
        if !is_phone_number(phone) {
            errors.push(ConfigError::validation(format!(
                "vendor.phone `{phone}` must be 8 to 15 digits"
            )));
        }
    }

    if !config.store.ships && !config.store.pickup {
        errors.push(ConfigError::validation(
            "store must offer shipping, pickup, or both",
        ));
    }

    for (key, value) in [
        ("timers.burst_quiet_secs", config.timers.burst_quiet_secs),
        ("timers.sinpe_wait_secs", config.timers.sinpe_wait_secs),
        ("timers.session_timeout_secs", config.timers.session_timeout_secs),
        ("timers.order_reset_secs", config.timers.order_reset_secs),
    ] {
        if value == 0 {
            errors.push(ConfigError::validation(format!(
                "{key} must be greater than zero"
            )));
        }
    }

    if config.gateway.host.trim().is_empty() {
        errors.push(ConfigError::validation("gateway.host must not be empty"));
    }

    if config.whatsapp.access_token.is_some() && config.whatsapp.phone_number_id.is_none() {
        errors.push(ConfigError::validation(
            "whatsapp.access_token is set but whatsapp.phone_number_id is missing",
        ));
    }

    if config.storage.enabled {
        if config.storage.snapshot_interval_secs == 0 {
            errors.push(ConfigError::validation(
                "storage.snapshot_interval_secs must be greater than zero",
            ));
        }
        if config.storage.database_path.trim().is_empty() {
            errors.push(ConfigError::validation(
                "storage.database_path must not be empty",
            ));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn is_phone_number(value: &str) -> bool {
    (8..=15).contains(&value.len()) && value.chars().all(|c| c.is_ascii_digit())
}
