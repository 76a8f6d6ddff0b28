//! End-to-end checks of the HTTP surface against an in-process router

use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
    Router,
};
use chrono::Duration;
use mt5_bridge::api::{create_router, AppState};
use mt5_bridge::config::AppConfig;
use mt5_bridge::{Bridge, ManualClock};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

fn test_app() -> (Router, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::default());
    let bridge = Bridge::with_clock(&AppConfig::default(), clock.clone());
    (create_router(AppState::new(bridge)), clock)
}

fn small_queue_app(max_len: usize) -> Router {
    let mut config = AppConfig::default();
    config.queue.max_len = max_len;
    let bridge = Bridge::with_clock(&config, Arc::new(ManualClock::default()));
    create_router(AppState::new(bridge))
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

async fn get(app: &Router, uri: &str) -> (StatusCode, Value) {
    send(
        app,
        Request::builder().uri(uri).body(Body::empty()).unwrap(),
    )
    .await
}

async fn post(app: &Router, uri: &str, body: Value) -> (StatusCode, Value) {
    send(
        app,
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
    )
    .await
}

fn command_ids(batch: &Value) -> Vec<u64> {
    batch["commands"]
        .as_array()
        .unwrap()
        .iter()
        .map(|c| c["id"].as_u64().unwrap())
        .collect()
}

#[tokio::test]
async fn root_lists_endpoints() {
    let (app, _) = test_app();
    let (status, body) = get(&app, "/").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "online");
    assert!(body["endpoints"]
        .as_object()
        .unwrap()
        .contains_key("POST /api/mt5/ack"));
}

#[tokio::test]
async fn status_update_and_stale_rejection() {
    let (app, _) = test_app();

    let (status, body) = post(
        &app,
        "/api/mt5/update",
        json!({"terminal_id": "T1", "observed_at": 100, "payload": {"equity": 1000}}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "success");

    let (status, body) = post(
        &app,
        "/api/mt5/update",
        json!({"terminal_id": "T1", "observed_at": 90, "payload": {"equity": 1}}),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "stale_update");

    // Equal timestamps are stale as well
    let (status, _) = post(
        &app,
        "/api/mt5/update",
        json!({"terminal_id": "T1", "observed_at": 100, "payload": {"equity": 2}}),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, body) = get(&app, "/api/mt5/status?terminal_id=T1").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["payload"], json!({"equity": 1000}));
    assert_eq!(body["observed_at"], 100);
}

#[tokio::test]
async fn unknown_terminal_status_is_not_found() {
    let (app, _) = test_app();
    let (status, body) = get(&app, "/api/mt5/status?terminal_id=nobody").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "not_found");
}

#[tokio::test]
async fn legacy_account_body_and_overview() {
    let (app, _) = test_app();

    let (status, _) = post(
        &app,
        "/api/mt5/update",
        json!({
            "account": 5012345,
            "timestamp": 1700000000,
            "balance": 1000.5,
            "trade": {"ticket": 42, "symbol": "XAUUSD"}
        }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (_, body) = get(&app, "/api/mt5/status?account=5012345").await;
    assert_eq!(body["payload"], json!({"balance": 1000.5}));

    let (_, overview) = get(&app, "/api/mt5/status").await;
    assert_eq!(overview["summary"]["total_terminals"], 1);
    assert_eq!(overview["summary"]["online_terminals"], 1);
    assert_eq!(overview["summary"]["total_trades"], 1);

    let (_, trades) = get(&app, "/api/mt5/trades?terminal_id=5012345").await;
    assert_eq!(trades["count"], 1);
    assert_eq!(trades["trades"][0]["trade"]["ticket"], 42);
}

#[tokio::test]
async fn command_poll_ack_redelivery() {
    let (app, clock) = test_app();

    let mut submitted = Vec::new();
    for action in ["C1", "C2", "C3"] {
        let (status, body) = post(
            &app,
            "/api/mt5/command",
            json!({"terminal_id": "T1", "payload": {"action": action}}),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "queued");
        submitted.push(body["command_id"].as_u64().unwrap());
    }
    assert_eq!(submitted, vec![1, 2, 3]);

    let (status, batch) = get(&app, "/api/mt5/commands?terminal_id=T1&limit=10").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(command_ids(&batch), vec![1, 2, 3]);
    assert_eq!(batch["commands"][0]["attempt"], 1);

    let (status, ack) = post(
        &app,
        "/api/mt5/ack",
        json!({"terminal_id": "T1", "command_id": 2}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(ack["outcome"], "acknowledged");

    // Delivered and not yet due: nothing to hand out
    let (_, batch) = get(&app, "/api/mt5/commands?terminal_id=T1").await;
    assert_eq!(batch["count"], 0);

    clock.advance(Duration::seconds(30));
    let (_, batch) = get(&app, "/api/mt5/commands?terminal_id=T1").await;
    assert_eq!(command_ids(&batch), vec![1, 3]);
    assert_eq!(batch["commands"][0]["attempt"], 2);

    // Duplicate ack is harmless
    let (status, ack) = post(
        &app,
        "/api/mt5/ack",
        json!({"terminal_id": "T1", "command_id": 2}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(ack["outcome"], "already_acknowledged");
}

#[tokio::test]
async fn expired_commands_are_not_delivered() {
    let (app, clock) = test_app();
    post(
        &app,
        "/api/mt5/command",
        json!({"terminal_id": "T1", "payload": "close_all"}),
    )
    .await;

    clock.advance(Duration::seconds(300));
    let (_, batch) = get(&app, "/api/mt5/commands?terminal_id=T1").await;
    assert_eq!(batch["count"], 0);

    let (status, ack) = post(
        &app,
        "/api/mt5/ack",
        json!({"terminal_id": "T1", "command_id": 1}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(ack["outcome"], "expired");
}

#[tokio::test]
async fn full_queue_rejects_with_429() {
    let app = small_queue_app(2);
    for _ in 0..2 {
        let (status, _) = post(
            &app,
            "/api/mt5/command",
            json!({"terminal_id": "T1", "payload": "x"}),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
    }

    let (status, body) = post(
        &app,
        "/api/mt5/command",
        json!({"terminal_id": "T1", "payload": "y"}),
    )
    .await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(body["error"], "queue_full");

    // Other terminals are unaffected
    let (status, _) = post(
        &app,
        "/api/mt5/command",
        json!({"terminal_id": "T2", "payload": "y"}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn malformed_requests_are_rejected() {
    let (app, _) = test_app();

    let (status, body) = post(&app, "/api/mt5/update", json!({"payload": {}})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "validation_error");

    let (status, _) = post(&app, "/api/mt5/command", json!({"terminal_id": "T1"})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = get(&app, "/api/mt5/commands").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = post(&app, "/api/mt5/ack", json!({"terminal_id": "T1"})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(
        &app,
        Request::builder()
            .method("POST")
            .uri("/api/mt5/update")
            .header("content-type", "application/json")
            .body(Body::from("{not json"))
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn ack_for_unknown_command_is_not_found() {
    let (app, _) = test_app();
    let (status, body) = post(
        &app,
        "/api/mt5/ack",
        json!({"terminal_id": "T1", "command_id": 99}),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "command_not_found");
}

#[tokio::test]
async fn heartbeat_reports_counts() {
    let (app, _) = test_app();
    post(
        &app,
        "/api/mt5/update",
        json!({"terminal_id": "T1", "observed_at": 1, "payload": {}}),
    )
    .await;
    post(
        &app,
        "/api/mt5/command",
        json!({"terminal_id": "T1", "payload": "x"}),
    )
    .await;

    let (status, body) = get(&app, "/api/mt5/heartbeat").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "alive");
    assert_eq!(body["terminals_count"], 1);
    assert_eq!(body["pending_commands"], 1);
}
