// SPDX-FileCopyrightText: 2026 Vitrina Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `vitrina status` command implementation.
//!
//! Queries `/v1/status` on the running gateway and prints session counts,
//! pending quotes and the token balance. Reports "not running" when the
//! gateway cannot be reached.

use std::fmt::Write as _;
use std::time::Duration;

use serde::Serialize;
use vitrina_config::model::{GatewayConfig, VitrinaConfig};
use vitrina_core::{StatusReport, VitrinaError};

/// Structured status output for `--json` mode.
#[derive(Debug, Serialize)]
pub struct StatusOutput {
    pub running: bool,
    pub gateway: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report: Option<StatusReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Base URL for reaching the gateway from this host.
fn base_url(config: &GatewayConfig) -> String {
    let host = match config.host.as_str() {
        "0.0.0.0" | "::" | "[::]" => "127.0.0.1",
        other => other,
    };
    format!("http://{host}:{}", config.port)
}

/// Fetches the status report from a running gateway.
pub async fn fetch_status(config: &GatewayConfig) -> Result<StatusReport, VitrinaError> {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(3))
        .build()
        .map_err(|e| VitrinaError::Internal(format!("failed to create HTTP client: {e}")))?;

    let url = format!("{}/v1/status", base_url(config));
    let mut request = client.get(&url);
    if let Some(token) = &config.bearer_token {
        request = request.bearer_auth(token);
    }

    let response = request.send().await.map_err(|e| VitrinaError::Channel {
        message: format!("gateway not reachable at {url}: {e}"),
        source: Some(Box::new(e)),
    })?;

    let status = response.status();
    if status == reqwest::StatusCode::UNAUTHORIZED {
        return Err(VitrinaError::Config(
            "gateway rejected the request: set gateway.bearer_token to the server's token".into(),
        ));
    }
    if !status.is_success() {
        return Err(VitrinaError::Internal(format!(
            "gateway answered {status}"
        )));
    }

    response
        .json()
        .await
        .map_err(|e| VitrinaError::Internal(format!("failed to parse status response: {e}")))
}

/// Renders a report for the terminal.
pub fn format_report(report: &StatusReport) -> String {
    let mut out = String::new();
    let ledger = &report.ledger;
    let _ = writeln!(out);
    let _ = writeln!(out, "  vitrina status");
    let _ = writeln!(out, "  {}", "-".repeat(35));
    let _ = writeln!(
        out,
        "    Sessions:       {} ({} paused)",
        report.sessions_total, report.paused_sessions
    );
    for (state, count) in &report.sessions_by_state {
        let _ = writeln!(out, "      {state:<26}{count}");
    }
    let _ = writeln!(out, "    Pending quotes: {}", report.pending_quotes);
    let _ = writeln!(
        out,
        "    Tokens:         {} left ({}: {} used of {}, +{} bonus)",
        report.tokens_remaining,
        ledger.month_key,
        ledger.used,
        ledger.monthly_allowance,
        ledger.bonus_added
    );
    let _ = writeln!(
        out,
        "    Purchases:      {} yes / {} no, {} paid",
        ledger.metrics.intent_yes, ledger.metrics.intent_no, ledger.metrics.payments_confirmed
    );
    out
}

/// Runs the `vitrina status` command.
pub async fn run_status(config: &VitrinaConfig, json: bool) -> Result<(), VitrinaError> {
    let gateway = base_url(&config.gateway);
    let output = match fetch_status(&config.gateway).await {
        Ok(report) => StatusOutput {
            running: true,
            gateway,
            report: Some(report),
            error: None,
        },
        Err(e) => StatusOutput {
            running: false,
            gateway,
            report: None,
            error: Some(e.to_string()),
        },
    };

    if json {
        let text = serde_json::to_string_pretty(&output)
            .map_err(|e| VitrinaError::Internal(format!("failed to encode status: {e}")))?;
        println!("{text}");
        return Ok(());
    }

    match (&output.report, &output.error) {
        (Some(report), _) => print!("{}", format_report(report)),
        (None, error) => {
            println!();
            println!("  vitrina status");
            println!("  {}", "-".repeat(35));
            println!("    State:    not running ({})", output.gateway);
            if let Some(error) = error {
                println!("    Detail:   {error}");
            }
            println!();
        }
    }
    Ok(())
}
