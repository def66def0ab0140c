// SPDX-FileCopyrightText: 2026 Vitrina Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Router tests driven through `tower::ServiceExt::oneshot` against a live
//! engine runtime with a mock channel.

use std::sync::Arc;
use std::time::Duration;

use axum::body::{Body, to_bytes};
use http::{Request, StatusCode, header};
use tower::ServiceExt;
use vitrina_gateway::{AuthConfig, GatewayState, build_router};
use vitrina_test_utils::{CUSTOMER_ID, TestHarness, VENDOR_ID};

const TOKEN: &str = "ops-token";

fn state(harness: &TestHarness, bearer: Option<&str>) -> GatewayState {
    GatewayState::new(
        harness.handle.clone(),
        Some("verify-me".to_string()),
        AuthConfig {
            bearer_token: bearer.map(str::to_string),
        },
    )
}

async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn text_payload(from: &str, body: &str) -> String {
    serde_json::json!({
        "object": "whatsapp_business_account",
        "entry": [{
            "id": "1",
            "changes": [{
                "field": "messages",
                "value": {
                    "messaging_product": "whatsapp",
                    "messages": [{
                        "from": from,
                        "id": "wamid.1",
                        "timestamp": "1760000000",
                        "type": "text",
                        "text": {"body": body}
                    }]
                }
            }]
        }]
    })
    .to_string()
}

fn authed(method: &str, uri: &str, body: Body) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {TOKEN}"))
        .header(header::CONTENT_TYPE, "application/json")
        .body(body)
        .unwrap()
}

#[tokio::test]
async fn handshake_echoes_challenge_with_matching_token() {
    let harness = TestHarness::builder().build().await.unwrap();
    let app = build_router(state(&harness, Some(TOKEN)));

    let response = app
        .oneshot(
            Request::get("/webhook?hub.mode=subscribe&hub.verify_token=verify-me&hub.challenge=1158201444")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert_eq!(&bytes[..], b"1158201444");
    harness.shutdown().await.unwrap();
}

#[tokio::test]
async fn handshake_with_wrong_token_is_forbidden() {
    let harness = TestHarness::builder().build().await.unwrap();
    let app = build_router(state(&harness, Some(TOKEN)));

    let response = app
        .oneshot(
            Request::get("/webhook?hub.mode=subscribe&hub.verify_token=nope&hub.challenge=1")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    harness.shutdown().await.unwrap();
}

#[tokio::test]
async fn webhook_message_reaches_the_engine() {
    let harness = TestHarness::builder().build().await.unwrap();
    let app = build_router(state(&harness, Some(TOKEN)));

    let response = app
        .oneshot(
            Request::post("/webhook")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(text_payload(CUSTOMER_ID, "hola")))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let sent = harness.wait_for_sent(1).await;
    assert_eq!(sent[0].recipient_id, CUSTOMER_ID);
    harness.shutdown().await.unwrap();
}

#[tokio::test]
async fn malformed_webhook_is_acknowledged() {
    let harness = TestHarness::builder().build().await.unwrap();
    let app = build_router(state(&harness, Some(TOKEN)));

    let response = app
        .oneshot(
            Request::post("/webhook")
                .body(Body::from("{not json"))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(harness.channel.sent_count().await, 0);
    harness.shutdown().await.unwrap();
}

#[tokio::test]
async fn health_is_public() {
    let harness = TestHarness::builder().build().await.unwrap();
    let app = build_router(state(&harness, None));

    let response = app
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["status"], "ok");
    harness.shutdown().await.unwrap();
}

#[tokio::test]
async fn health_reports_stopped_engine() {
    let harness = TestHarness::builder().build().await.unwrap();
    let app = build_router(state(&harness, None));
    harness.shutdown().await.unwrap();

    let response = app
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn metrics_render_when_enabled() {
    let harness = TestHarness::builder().build().await.unwrap();
    let without = build_router(state(&harness, None));
    let response = without
        .oneshot(Request::get("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let with = build_router(
        state(&harness, None).with_metrics(Arc::new(|| "vitrina_active_sessions 0\n".into())),
    );
    let response = with
        .oneshot(Request::get("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert!(String::from_utf8_lossy(&bytes).contains("vitrina_active_sessions"));
    harness.shutdown().await.unwrap();
}

#[tokio::test]
async fn ops_api_is_closed_without_configured_token() {
    let harness = TestHarness::builder().build().await.unwrap();
    let app = build_router(state(&harness, None));

    let response = app
        .oneshot(authed("GET", "/v1/status", Body::empty()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    harness.shutdown().await.unwrap();
}

#[tokio::test]
async fn ops_api_rejects_wrong_token() {
    let harness = TestHarness::builder().build().await.unwrap();
    let app = build_router(state(&harness, Some(TOKEN)));

    let response = app
        .oneshot(
            Request::get("/v1/status")
                .header(header::AUTHORIZATION, "Bearer wrong")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    harness.shutdown().await.unwrap();
}

#[tokio::test]
async fn status_reports_ledger() {
    let harness = TestHarness::builder()
        .with_allowance(40)
        .build()
        .await
        .unwrap();
    let app = build_router(state(&harness, Some(TOKEN)));

    let response = app
        .oneshot(authed("GET", "/v1/status", Body::empty()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["tokens_remaining"], 40);
    assert_eq!(json["sessions_total"], 0);
    harness.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn quotes_list_pending_requests() {
    let harness = TestHarness::builder().build().await.unwrap();
    harness
        .image(CUSTOMER_ID, "media-1", Some("talla M azul"))
        .await
        .unwrap();
    let forwarded = harness
        .channel
        .wait_for_sent_to(VENDOR_ID, 1, Duration::from_secs(300))
        .await;
    assert_eq!(forwarded.len(), 1);
    let app = build_router(state(&harness, Some(TOKEN)));

    let response = app
        .oneshot(authed("GET", "/v1/quotes", Body::empty()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["quotes"][0]["customer_id"], CUSTOMER_ID);
    harness.shutdown().await.unwrap();
}

#[tokio::test]
async fn top_up_adds_bonus_tokens() {
    let harness = TestHarness::builder()
        .with_allowance(10)
        .build()
        .await
        .unwrap();
    let app = build_router(state(&harness, Some(TOKEN)));

    let response = app
        .clone()
        .oneshot(authed("POST", "/v1/tokens/topup", Body::from(r#"{"tokens": 50}"#)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["tokens_remaining"], 60);
    assert_eq!(json["ledger"]["bonus_added"], 50);

    let response = app
        .oneshot(authed("POST", "/v1/tokens/topup", Body::from(r#"{"tokens": 0}"#)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    harness.shutdown().await.unwrap();
}

#[tokio::test]
async fn oversized_top_up_is_rejected_and_engine_keeps_running() {
    let harness = TestHarness::builder()
        .with_allowance(10)
        .build()
        .await
        .unwrap();
    let app = build_router(state(&harness, Some(TOKEN)));

    let response = app
        .clone()
        .oneshot(authed(
            "POST",
            "/v1/tokens/topup",
            Body::from(r#"{"tokens": 18446744073709551615}"#),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app
        .oneshot(authed("GET", "/v1/status", Body::empty()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["tokens_remaining"], 10);
    harness.shutdown().await.unwrap();
}
