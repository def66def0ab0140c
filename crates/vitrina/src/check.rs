// SPDX-FileCopyrightText: 2026 Vitrina Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `vitrina check-config`: prints what a validated configuration enables.

use vitrina_config::model::VitrinaConfig;

/// One line per subsystem, describing how `serve` would run it.
pub fn describe(config: &VitrinaConfig) -> Vec<String> {
    let mut lines = Vec::new();

    let capabilities = match (config.store.ships, config.store.pickup) {
        (true, true) => "shipping and pickup",
        (true, false) => "shipping only",
        _ => "pickup only",
    };
    lines.push(format!("store:     {} ({capabilities})", config.store.name));

    lines.push(match &config.vendor.phone {
        Some(phone) => format!("vendor:    {phone}"),
        None => "vendor:    not set (quote requests cannot be forwarded)".to_string(),
    });

    lines.push(
        match (
            &config.whatsapp.access_token,
            &config.whatsapp.phone_number_id,
        ) {
            (Some(_), Some(id)) => format!(
                "whatsapp:  delivering via {} number {id}",
                config.whatsapp.api_version
            ),
            _ => "whatsapp:  no credentials, outbound messages are only logged".to_string(),
        },
    );
    if config.whatsapp.verify_token.is_none() {
        lines.push("webhook:   no verify_token, subscription handshakes are refused".to_string());
    }

    lines.push(if config.anthropic.api_key.is_some() {
        format!("fallback:  {}", config.anthropic.model)
    } else {
        "fallback:  disabled (no anthropic.api_key)".to_string()
    });

    lines.push(format!(
        "tokens:    {} per month, payment auto-detection {}",
        config.tokens.monthly_allowance,
        if config.payment.auto_detection { "on" } else { "off" }
    ));

    lines.push(if config.storage.enabled {
        format!(
            "storage:   {} (snapshot every {}s)",
            config.storage.database_path, config.storage.snapshot_interval_secs
        )
    } else {
        "storage:   disabled, state is lost on restart".to_string()
    });

    let api = if config.gateway.bearer_token.is_some() {
        "ops API enabled"
    } else {
        "ops API locked (no bearer_token)"
    };
    lines.push(format!(
        "gateway:   {}:{} ({api})",
        config.gateway.host, config.gateway.port
    ));

    lines
}

pub fn run_check_config(config: &VitrinaConfig) {
    println!("vitrina: configuration OK");
    for line in describe(config) {
        println!("  {line}");
    }
}
