mod common;

use axum::http::{Method, StatusCode};
use common::{occurred_at, read_json, TestApp, DEVICE};
use rust_decimal_macros::dec;
use serde_json::json;

fn sale_body(tenant: uuid::Uuid, seq: i64, qty: i64) -> serde_json::Value {
    json!({
        "tenant_id": tenant,
        "events": [{
            "device_id": DEVICE,
            "device_seq": seq,
            "event_type": "sale",
            "occurred_at": occurred_at(),
            "payload": {
                "lines": [{ "sku": "A", "qty": qty, "unit_price_usd": 10 }],
                "payment": "cash",
            },
        }],
    })
}

#[tokio::test]
async fn submit_accepts_then_dedups() {
    let app = TestApp::new().await;

    let response = app
        .request(Method::POST, "/api/v1/outbox/submit", Some(sale_body(app.fx.official, 1, 1)))
        .await;
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let body = read_json(response).await;
    assert_eq!(body["accepted"], 1);
    assert_eq!(body["duplicates"], 0);
    assert_eq!(body["acks"][0]["status"], "pending");

    let response = app
        .request(Method::POST, "/api/v1/outbox/submit", Some(sale_body(app.fx.official, 1, 1)))
        .await;
    let body = read_json(response).await;
    assert_eq!(body["accepted"], 0);
    assert_eq!(body["duplicates"], 1);
}

#[tokio::test]
async fn empty_batch_is_rejected() {
    let app = TestApp::new().await;
    let response = app
        .request(
            Method::POST,
            "/api/v1/outbox/submit",
            Some(json!({ "tenant_id": app.fx.official, "events": [] })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn held_sale_is_released_over_http() {
    let app = TestApp::new().await;
    app.request(Method::POST, "/api/v1/outbox/submit", Some(sale_body(app.fx.official, 1, 2)))
        .await;
    assert_eq!(app.drain().await.held, 1);

    let response = app
        .request(
            Method::GET,
            &format!("/api/v1/exceptions?tenant_id={}&status=open", app.fx.official),
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let list = read_json(response).await;
    assert_eq!(list.as_array().map(Vec::len), Some(1));
    assert_eq!(list[0]["reason_code"], "INVENTORY_SHORTAGE");
    let exception_id = list[0]["id"].as_str().unwrap().to_string();
    let event_id = list[0]["event_id"].as_str().unwrap().to_string();

    let detail = read_json(
        app.request(Method::GET, &format!("/api/v1/exceptions/{exception_id}"), None)
            .await,
    )
    .await;
    assert_eq!(detail["actions"][0]["action"], "hold");

    let response = app
        .request(
            Method::POST,
            &format!("/api/v1/exceptions/{exception_id}/release"),
            Some(json!({ "actor": "" })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    app.lot(app.fx.official, app.fx.item_a, "L1", None, dec!(5), dec!(4))
        .await;
    let response = app
        .request(
            Method::POST,
            &format!("/api/v1/exceptions/{exception_id}/release"),
            Some(json!({ "actor": "ops", "note": "stock arrived" })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(read_json(response).await["status"], "released");
    assert_eq!(app.drain().await.posted, 1);

    let response = app
        .request(Method::GET, &format!("/api/v1/documents/by-event/{event_id}"), None)
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let view = read_json(response).await;
    assert_eq!(view["document"]["doc_type"], "invoice");
    assert!(view["journal"]["lines"].as_array().is_some());
}

#[tokio::test]
async fn unknown_document_is_404() {
    let app = TestApp::new().await;
    let response = app
        .request(
            Method::GET,
            &format!("/api/v1/documents/{}", uuid::Uuid::new_v4()),
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn lot_lifecycle_over_http() {
    let app = TestApp::new().await;
    let lot = app
        .lot(app.fx.official, app.fx.item_a, "Q1", None, dec!(5), dec!(4))
        .await;

    let response = app
        .request(
            Method::POST,
            &format!("/api/v1/lots/{lot}/quarantine"),
            Some(json!({ "reason": "recall" })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(read_json(response).await["status"], "quarantine");

    let response = app
        .request(Method::POST, &format!("/api/v1/lots/{lot}/expire"), None)
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    // Expired is terminal.
    let response = app
        .request(Method::POST, &format!("/api/v1/lots/{lot}/release"), None)
        .await;
    assert!(response.status().is_client_error());
}

#[tokio::test]
async fn ops_summary_counts_outbox_and_exceptions() {
    let app = TestApp::new().await;
    app.request(Method::POST, "/api/v1/outbox/submit", Some(sale_body(app.fx.official, 1, 1)))
        .await;
    app.drain().await;

    let response = app
        .request(
            Method::GET,
            &format!("/ops/summary?tenant_id={}", app.fx.official),
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let summary = read_json(response).await;
    assert_eq!(summary["outbox"]["held"], 1);
    assert_eq!(summary["open_exceptions"]["INVENTORY_SHORTAGE"], 1);
}

#[tokio::test]
async fn liveness_is_always_up() {
    let app = TestApp::new().await;
    let response = app.request(Method::GET, "/health/live", None).await;
    assert_eq!(response.status(), StatusCode::OK);
}
