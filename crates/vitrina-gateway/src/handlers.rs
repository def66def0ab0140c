// SPDX-FileCopyrightText: 2026 Vitrina Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP request handlers for the gateway.
//!
//! Public: `GET/POST /webhook`, `GET /health`, `GET /metrics`.
//! Bearer-protected: `GET /v1/status`, `GET /v1/quotes`,
//! `POST /v1/tokens/topup`.

use axum::{
    Json,
    body::Bytes,
    extract::{Query, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use vitrina_core::{LedgerState, PendingQuote, StatusReport, VitrinaError};
use vitrina_whatsapp::webhook::{parse_payload, verify_subscription};

use crate::server::GatewayState;

/// Query string of the webhook subscription handshake.
#[derive(Debug, Default, Deserialize)]
pub struct VerifyParams {
    #[serde(rename = "hub.mode")]
    pub mode: Option<String>,
    #[serde(rename = "hub.verify_token")]
    pub verify_token: Option<String>,
    #[serde(rename = "hub.challenge")]
    pub challenge: Option<String>,
}

/// Response body for GET /health.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_secs: u64,
}

/// Response body for GET /v1/quotes.
#[derive(Debug, Serialize)]
pub struct QuoteListResponse {
    pub quotes: Vec<PendingQuote>,
}

/// Request body for POST /v1/tokens/topup.
#[derive(Debug, Deserialize)]
pub struct TopUpRequest {
    pub tokens: u64,
}

/// Response body for POST /v1/tokens/topup.
#[derive(Debug, Serialize)]
pub struct TopUpResponse {
    pub tokens_remaining: u64,
    pub ledger: LedgerState,
}

/// Error response body.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

fn error_response(status: StatusCode, error: impl Into<String>) -> Response {
    (
        status,
        Json(ErrorResponse {
            error: error.into(),
        }),
    )
        .into_response()
}

fn engine_unavailable(e: VitrinaError) -> Response {
    warn!(error = %e, "engine did not answer");
    error_response(StatusCode::SERVICE_UNAVAILABLE, "engine not available")
}

/// GET /webhook
///
/// Echoes the challenge when the verify token matches, 403 otherwise.
pub async fn get_webhook(
    State(state): State<GatewayState>,
    Query(params): Query<VerifyParams>,
) -> Response {
    match verify_subscription(
        params.mode.as_deref(),
        params.verify_token.as_deref(),
        params.challenge.as_deref(),
        state.verify_token.as_deref(),
    ) {
        Some(challenge) => {
            info!("webhook subscription verified");
            (StatusCode::OK, challenge).into_response()
        }
        None => {
            warn!(mode = ?params.mode, "webhook subscription refused");
            StatusCode::FORBIDDEN.into_response()
        }
    }
}

/// POST /webhook
///
/// Always answers 200 so the platform does not redeliver; malformed
/// payloads are logged and dropped.
pub async fn post_webhook(State(state): State<GatewayState>, body: Bytes) -> StatusCode {
    let events = match parse_payload(&body) {
        Ok(events) => events,
        Err(e) => {
            warn!(error = %e, "ignoring malformed webhook payload");
            return StatusCode::OK;
        }
    };
    debug!(count = events.len(), "webhook events received");
    for event in events {
        if let Err(e) = state.engine.submit(event).await {
            warn!(error = %e, "dropping webhook event");
        }
    }
    StatusCode::OK
}

/// GET /health
///
/// Reports `ok` while the engine answers queries, `unavailable` (503) once
/// it has stopped.
pub async fn get_health(State(state): State<GatewayState>) -> (StatusCode, Json<HealthResponse>) {
    let (code, status) = match state.engine.status().await {
        Ok(_) => (StatusCode::OK, "ok"),
        Err(_) => (StatusCode::SERVICE_UNAVAILABLE, "unavailable"),
    };
    (
        code,
        Json(HealthResponse {
            status: status.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            uptime_secs: state.health.start_time.elapsed().as_secs(),
        }),
    )
}

/// GET /metrics
///
/// Prometheus text format, or 404 when metrics are not enabled.
pub async fn get_metrics(State(state): State<GatewayState>) -> Response {
    match &state.health.prometheus_render {
        Some(render) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            render(),
        )
            .into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

/// GET /v1/status
pub async fn get_status(State(state): State<GatewayState>) -> Result<Json<StatusReport>, Response> {
    state.engine.status().await.map(Json).map_err(engine_unavailable)
}

/// GET /v1/quotes
pub async fn get_quotes(
    State(state): State<GatewayState>,
) -> Result<Json<QuoteListResponse>, Response> {
    let quotes = state
        .engine
        .pending_quotes()
        .await
        .map_err(engine_unavailable)?;
    Ok(Json(QuoteListResponse { quotes }))
}

/// POST /v1/tokens/topup
pub async fn post_top_up(
    State(state): State<GatewayState>,
    Json(body): Json<TopUpRequest>,
) -> Result<Json<TopUpResponse>, Response> {
    if body.tokens == 0 {
        return Err(error_response(
            StatusCode::BAD_REQUEST,
            "tokens must be greater than zero",
        ));
    }
    let ledger = state
        .engine
        .top_up(body.tokens)
        .await
        .map_err(|e| match e {
            VitrinaError::InvalidTopUp { message } => {
                error_response(StatusCode::BAD_REQUEST, message)
            }
            other => engine_unavailable(other),
        })?;
    info!(tokens = body.tokens, remaining = ledger.remaining(), "token pack added");
    Ok(Json(TopUpResponse {
        tokens_remaining: ledger.remaining(),
        ledger,
    }))
}
