//! # Integration Tests for isopep-api
//!
//! Drives the full router with `oneshot`: the agreement lifecycle over
//! HTTP, domain error mapping, bearer authentication, the oracle feed, the
//! ERP simulator, CAS pinning, and the OpenAPI document.

use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;

use isopep_api::state::{AppConfig, AppState};
use isopep_core::Timestamp;

fn test_app() -> axum::Router {
    isopep_api::app(AppState::new())
}

fn test_app_with_auth(token: &str) -> axum::Router {
    let config = AppConfig {
        auth_token: Some(token.to_string()),
        ..AppConfig::default()
    };
    isopep_api::app(AppState::with_config(config).unwrap())
}

async fn send(
    app: &axum::Router,
    method: &str,
    uri: &str,
    caller: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(c) = caller {
        builder = builder.header("x-caller-id", c);
    }
    let body = match body {
        Some(v) => {
            builder = builder.header("content-type", "application/json");
            Body::from(serde_json::to_vec(&v).unwrap())
        }
        None => Body::empty(),
    };
    let response = app.clone().oneshot(builder.body(body).unwrap()).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let value = serde_json::from_slice(&bytes)
        .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()));
    (status, value)
}

fn deadline_in(secs: i64) -> Value {
    serde_json::to_value(Timestamp::now().plus_secs(secs).unwrap()).unwrap()
}

async fn create(app: &axum::Router, quantity: u64, price: u64) -> String {
    let (status, body) = send(
        app,
        "POST",
        "/v1/agreements",
        Some("buyer"),
        Some(json!({
            "quantity": quantity,
            "unit_price": price.to_string(),
            "deadline": deadline_in(3_600),
            "document_ref": "QmHashIsopepTOPSIS2025",
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    body["agreement_id"].as_str().unwrap().to_string()
}

// -- Health Probes ------------------------------------------------------------

#[tokio::test]
async fn test_health_probes_skip_auth() {
    let app = test_app_with_auth("secret");
    let (status, body) = send(&app, "GET", "/health/liveness", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, Value::String("ok".into()));
    let (status, body) = send(&app, "GET", "/health/readiness", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, Value::String("ready".into()));
}

#[tokio::test]
async fn test_bearer_token_required_when_configured() {
    let app = test_app_with_auth("secret");
    let (status, body) = send(&app, "GET", "/oracle-data", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["code"], "UNAUTHORIZED");

    let response = app
        .oneshot(
            Request::builder()
                .uri("/oracle-data")
                .header("Authorization", "Bearer secret")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

// -- Agreement Lifecycle ------------------------------------------------------

#[tokio::test]
async fn test_reference_run_over_http() {
    let app = test_app();

    let (status, _) = send(
        &app,
        "POST",
        "/v1/tokens/mint",
        Some("buyer"),
        Some(json!({"to": "buyer", "amount": "10000"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let id = create(&app, 1000, 10).await;
    let base = format!("/v1/agreements/{id}");

    let (status, _) = send(&app, "POST", &format!("{base}/accept"), Some("S3"), None).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send(
        &app,
        "POST",
        "/v1/tokens/approve",
        Some("buyer"),
        Some(json!({"spender": format!("escrow:{id}"), "amount": "10000"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["allowance"], "10000");

    let (status, body) = send(
        &app,
        "POST",
        &format!("{base}/payment"),
        Some("buyer"),
        Some(json!({"amount": "10000"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["agreement"]["escrow_amount"], "10000");
    assert_eq!(body["events"][0]["detail"]["kind"], "PaymentConfirmed");

    let (status, body) = send(&app, "POST", &format!("{base}/start"), Some("buyer"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["state"], "PENDING");

    let (status, body) = send(&app, "POST", &format!("{base}/dispatch"), Some("S3"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["state"], "DISPATCHED");

    let (status, _) = send(&app, "PUT", "/oracle-data", None, Some(json!({"value": 900}))).await;
    assert_eq!(status, StatusCode::OK);
    let (_, body) = send(&app, "GET", "/oracle-data", None, None).await;
    assert_eq!(body["oracleData"], "900");

    let (status, body) = send(
        &app,
        "POST",
        &format!("{base}/delivery"),
        Some("oracle"),
        Some(json!({"ok": true})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["state"], "COMPLETED");

    let (status, _) = send(
        &app,
        "POST",
        &format!("{base}/ratings"),
        Some("buyer"),
        Some(json!({"supplier": "S3", "score": 5})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (_, view) = send(&app, "GET", &base, None, None).await;
    assert_eq!(view["state_code"], 5);
    assert_eq!(view["escrow_amount"], "0");
    assert_eq!(view["dispatched_by"], "S3");

    let (_, supplier) = send(&app, "GET", &format!("{base}/suppliers/S3"), None, None).await;
    assert_eq!(supplier["supplier"]["accepted"], true);
    assert_eq!(supplier["supplier"]["rating"], 5);

    let (_, balance) = send(&app, "GET", "/v1/tokens/S3", None, None).await;
    assert_eq!(balance["balance"], "10000");
    let (_, balance) = send(&app, "GET", "/v1/tokens/buyer", None, None).await;
    assert_eq!(balance["balance"], "0");

    let (_, active) = send(&app, "GET", "/v1/agreements/active", None, None).await;
    assert_eq!(active["id"], id.as_str());

    let (_, events) = send(&app, "GET", "/v1/events", None, None).await;
    let kinds: Vec<&str> = events
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["detail"]["kind"].as_str().unwrap())
        .collect();
    assert_eq!(
        kinds,
        [
            "AgreementCreated",
            "PaymentConfirmed",
            "OrderDispatched",
            "DeliveryUpdated",
            "SupplierRated"
        ]
    );
    let (_, filtered) = send(&app, "GET", "/v1/events?kind=DeliveryUpdated", None, None).await;
    assert_eq!(filtered.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_dispute_refund_over_http() {
    let app = test_app();
    send(&app, "POST", "/v1/tokens/mint", Some("buyer"), Some(json!({"to": "buyer", "amount": 200}))).await;
    let id = create(&app, 100, 2).await;
    let base = format!("/v1/agreements/{id}");
    send(&app, "POST", &format!("{base}/accept"), Some("S"), None).await;
    send(
        &app,
        "POST",
        "/v1/tokens/approve",
        Some("buyer"),
        Some(json!({"spender": format!("escrow:{id}"), "amount": 200})),
    )
    .await;
    send(&app, "POST", &format!("{base}/payment"), Some("buyer"), Some(json!({"amount": 200}))).await;
    send(&app, "POST", &format!("{base}/start"), Some("buyer"), None).await;
    send(&app, "POST", &format!("{base}/dispatch"), Some("S"), None).await;
    let (_, body) = send(
        &app,
        "POST",
        &format!("{base}/delivery"),
        Some("oracle"),
        Some(json!({"ok": false})),
    )
    .await;
    assert_eq!(body["state"], "DISPUTED");

    let (status, body) = send(
        &app,
        "POST",
        &format!("{base}/resolve"),
        Some("arbitrator"),
        Some(json!({"decision": "Bogus"})),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"]["code"], "INVALID_ARGUMENT");

    let (status, body) = send(
        &app,
        "POST",
        &format!("{base}/resolve"),
        Some("arbitrator"),
        Some(json!({"decision": "RefundBuyer"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["state"], "CANCELLED");
    let (_, balance) = send(&app, "GET", "/v1/tokens/buyer", None, None).await;
    assert_eq!(balance["balance"], "200");
}

// -- Error Mapping ------------------------------------------------------------

#[tokio::test]
async fn test_domain_errors_map_to_statuses() {
    let app = test_app();

    let (status, body) = send(
        &app,
        "POST",
        "/v1/agreements",
        Some("S3"),
        Some(json!({
            "quantity": 1,
            "unit_price": "1",
            "deadline": deadline_in(60),
            "document_ref": "Qm",
        })),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"]["code"], "UNAUTHORIZED");
    assert_eq!(body["error"]["details"]["required_role"], "buyer");

    let id = create(&app, 10, 1).await;
    let base = format!("/v1/agreements/{id}");

    let (status, body) = send(
        &app,
        "POST",
        "/v1/agreements",
        Some("buyer"),
        Some(json!({
            "quantity": 1,
            "unit_price": "1",
            "deadline": deadline_in(60),
            "document_ref": "Qm",
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], "ALREADY_ACTIVE");

    let (status, body) = send(&app, "POST", &format!("{base}/dispatch"), Some("S9"), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"]["code"], "NOT_ACCEPTED");

    send(&app, "POST", &format!("{base}/accept"), Some("S9"), None).await;
    let (status, body) = send(&app, "POST", &format!("{base}/dispatch"), Some("S9"), None).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], "INVALID_STATE");

    let (status, body) = send(
        &app,
        "POST",
        &format!("{base}/ratings"),
        Some("buyer"),
        Some(json!({"supplier": "S9", "score": 6})),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"]["code"], "INVALID_RATING");

    let (status, body) = send(
        &app,
        "POST",
        &format!("{base}/payment"),
        Some("buyer"),
        Some(json!({"amount": "5"})),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"]["code"], "INSUFFICIENT_FUNDS");

    let unknown = isopep_core::AgreementId::new();
    let (status, body) = send(&app, "GET", &format!("/v1/agreements/{unknown}"), None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "NOT_FOUND");

    let (status, _) = send(&app, "GET", "/v1/agreements/not-a-uuid", None, None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_missing_caller_is_unauthorized() {
    let app = test_app();
    let id = create(&app, 1, 1).await;
    let (status, _) = send(&app, "POST", &format!("/v1/agreements/{id}/accept"), None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_malformed_body_is_bad_request() {
    let app = test_app();
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/v1/agreements")
                .header("x-caller-id", "buyer")
                .header("content-type", "application/json")
                .body(Body::from("{not json"))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

// -- Supporting Services ------------------------------------------------------

#[tokio::test]
async fn test_erp_simulator() {
    let app = test_app();
    let record = json!({
        "agreementId": isopep_core::AgreementId::new(),
        "quantity": 1000,
        "price": "10",
        "deadline": deadline_in(60),
        "documentRef": "QmHashIsopepTOPSIS2025",
        "txRef": isopep_core::sha256_raw(b"commit"),
    });
    let id = record["agreementId"].as_str().unwrap().to_string();

    let (status, _) = send(&app, "GET", &format!("/sync-status/{id}"), None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = send(&app, "POST", "/sync-agreement?fail=true", None, Some(record.clone())).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["status"], "failed");
    let (_, body) = send(&app, "GET", &format!("/sync-status/{id}"), None, None).await;
    assert_eq!(body["status"], "failed");

    let (status, body) = send(&app, "POST", "/sync-agreement", None, Some(record)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["agreementId"], id.as_str());
    let (_, body) = send(&app, "GET", &format!("/sync-status/{id}"), None, None).await;
    assert_eq!(body["status"], "success");
}

#[tokio::test]
async fn test_pin_json_is_content_addressed() {
    let app = test_app();
    let (status, a) = send(&app, "POST", "/api/ipfs/pin-json", None, Some(json!({"b": 1, "a": [3, 2]}))).await;
    assert_eq!(status, StatusCode::OK);
    let (_, b) = send(&app, "POST", "/api/ipfs/pin-json", None, Some(json!({"a": [3, 2], "b": 1}))).await;
    assert_eq!(a["cid"], b["cid"]);
    assert!(a["cid"].as_str().unwrap().starts_with("sha256:"));

    let (status, body) = send(&app, "POST", "/api/ipfs/pin-json", None, Some(json!({"w": 0.5}))).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn test_unknown_event_kind_is_bad_request() {
    let app = test_app();
    let (status, _) = send(&app, "GET", "/v1/events?kind=Nope", None, None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_openapi_document() {
    let app = test_app();
    let (status, doc) = send(&app, "GET", "/openapi.json", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(doc["info"]["title"], "isopep API");
    assert!(doc["paths"]["/v1/agreements/{id}/resolve"].is_object());
}
