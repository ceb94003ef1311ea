mod common;

use axum::http::StatusCode;
use mockito::Matcher;
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

use common::{create_body, send, test_app, USER};
use valpago_core::domain::Merchant;
use valpago_core::ports::StatusRegister;
use valpago_core::services::webhook::{APPROVED_MESSAGE, REJECTED_MESSAGE};
use valpago_core::services::HttpWebhookNotifier;

fn quiet_webhook() -> Arc<HttpWebhookNotifier> {
    Arc::new(HttpWebhookNotifier::new(None))
}

#[tokio::test]
async fn test_create_registers_pending_and_appends_created() {
    let t = test_app(quiet_webhook()).await;

    let (status, body) = send(
        &t.app,
        "POST",
        "/api/transactions",
        Some(create_body(json!("50000"), "ACC1")),
        Some(USER),
    )
    .await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["status"], "pending");
    assert_eq!(body["destination_account"], "ACC1");
    let id: Uuid = body["id"].as_str().unwrap().parse().unwrap();

    assert_eq!(t.register.current(id).await.unwrap().as_deref(), Some("pending"));

    let entries = t.events.entries().await;
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].kind.as_deref(), Some("transaction.created"));

    let (status, stored) =
        send(&t.app, "GET", &format!("/api/transactions/{}", id), None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(stored["status"], "pending");
}

#[tokio::test]
async fn test_review_twice_conflicts() {
    let t = test_app(quiet_webhook()).await;
    let (_, created) = send(
        &t.app,
        "POST",
        "/api/transactions",
        Some(create_body(json!(50000), "ACC1")),
        Some(USER),
    )
    .await;
    let id = created["id"].as_str().unwrap().to_string();

    let (status, reviewed) =
        send(&t.app, "POST", &format!("/api/transactions/{}/review", id), None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(reviewed["status"], "review");

    let (status, conflict) =
        send(&t.app, "POST", &format!("/api/transactions/{}/review", id), None, None).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(conflict["current"], "review");

    let kinds: Vec<_> = t
        .events
        .entries()
        .await
        .into_iter()
        .filter_map(|record| record.kind)
        .collect();
    assert_eq!(kinds, vec!["transaction.created", "transaction.review"]);
}

#[tokio::test]
async fn test_approve_sends_one_webhook_to_merchant() {
    let mut server = mockito::Server::new_async().await;
    let hook = server
        .mock("POST", "/notify")
        .match_body(Matcher::Json(json!({
            "tel": "+571234567",
            "msg": APPROVED_MESSAGE,
        })))
        .with_status(200)
        .with_body("queued")
        .expect(1)
        .create_async()
        .await;

    let webhook = Arc::new(HttpWebhookNotifier::new(Some(format!("{}/notify", server.url()))));
    let t = test_app(webhook).await;
    t.records
        .insert_merchant(Merchant {
            id: Uuid::new_v4(),
            responsible: "Owner".to_string(),
            name: "Shop".to_string(),
            phone: "+571234567".to_string(),
            accounts: vec!["ACC0".to_string(), "ACC1".to_string()],
        })
        .await;

    let (_, created) = send(
        &t.app,
        "POST",
        "/api/transactions",
        Some(create_body(json!("50000"), "ACC1")),
        Some(USER),
    )
    .await;
    let id = created["id"].as_str().unwrap().to_string();
    send(&t.app, "POST", &format!("/api/transactions/{}/review", id), None, None).await;

    let (status, approved) =
        send(&t.app, "POST", &format!("/api/transactions/{}/approve", id), None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(approved["status"], "approved");

    // A second decision is a conflict and must not notify again.
    let (status, conflict) =
        send(&t.app, "POST", &format!("/api/transactions/{}/reject", id), None, None).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(conflict["current"], "approved");

    hook.assert_async().await;
}

#[tokio::test]
async fn test_reject_sends_invalid_receipt_message() {
    let mut server = mockito::Server::new_async().await;
    let hook = server
        .mock("POST", "/notify")
        .match_body(Matcher::PartialJson(json!({ "msg": REJECTED_MESSAGE })))
        .with_status(200)
        .expect(1)
        .create_async()
        .await;

    let webhook = Arc::new(HttpWebhookNotifier::new(Some(format!("{}/notify", server.url()))));
    let t = test_app(webhook).await;
    t.records
        .insert_merchant(Merchant {
            id: Uuid::new_v4(),
            responsible: "Owner".to_string(),
            name: "Shop".to_string(),
            phone: "+571234567".to_string(),
            accounts: vec!["ACC1".to_string()],
        })
        .await;

    let (_, created) = send(
        &t.app,
        "POST",
        "/api/transactions",
        Some(create_body(json!("10"), "ACC1")),
        Some(USER),
    )
    .await;
    let id = created["id"].as_str().unwrap().to_string();
    send(&t.app, "POST", &format!("/api/transactions/{}/review", id), None, None).await;
    let (status, rejected) =
        send(&t.app, "POST", &format!("/api/transactions/{}/reject", id), None, None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(rejected["status"], "rejected");
    hook.assert_async().await;
}

#[tokio::test]
async fn test_concurrent_decisions_notify_once() {
    let mut server = mockito::Server::new_async().await;
    let hook = server
        .mock("POST", "/notify")
        .match_body(Matcher::PartialJson(json!({ "tel": "+571234567" })))
        .with_status(200)
        .expect(1)
        .create_async()
        .await;

    let webhook = Arc::new(HttpWebhookNotifier::new(Some(format!("{}/notify", server.url()))));
    let t = test_app(webhook).await;
    t.records
        .insert_merchant(Merchant {
            id: Uuid::new_v4(),
            responsible: "Owner".to_string(),
            name: "Shop".to_string(),
            phone: "+571234567".to_string(),
            accounts: vec!["ACC1".to_string()],
        })
        .await;

    let (_, created) = send(
        &t.app,
        "POST",
        "/api/transactions",
        Some(create_body(json!("75"), "ACC1")),
        Some(USER),
    )
    .await;
    let id = created["id"].as_str().unwrap().to_string();
    send(&t.app, "POST", &format!("/api/transactions/{}/review", id), None, None).await;

    let approve_uri = format!("/api/transactions/{}/approve", id);
    let reject_uri = format!("/api/transactions/{}/reject", id);
    let ((approve_status, approve_body), (reject_status, reject_body)) = tokio::join!(
        send(&t.app, "POST", &approve_uri, None, None),
        send(&t.app, "POST", &reject_uri, None, None)
    );

    let (winner, conflict) = match (approve_status, reject_status) {
        (StatusCode::OK, StatusCode::CONFLICT) => (approve_body, reject_body),
        (StatusCode::CONFLICT, StatusCode::OK) => (reject_body, approve_body),
        other => panic!("expected one success and one conflict, got {:?}", other),
    };
    assert_eq!(conflict["current"], winner["status"]);
    assert_eq!(t.events.entries().await.len(), 3);

    hook.assert_async().await;
}

#[tokio::test]
async fn test_invalid_amount_has_no_side_effects() {
    let t = test_app(quiet_webhook()).await;

    let (status, body) = send(
        &t.app,
        "POST",
        "/api/transactions",
        Some(create_body(json!("0"), "ACC1")),
        Some(USER),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("amount"));
    assert!(t.events.entries().await.is_empty());
}

#[tokio::test]
async fn test_unbounded_amounts_are_rejected_without_side_effects() {
    let t = test_app(quiet_webhook()).await;

    for amount in ["1e9999999999", "1e-20000", "0.000000001", "1000000000000000000"] {
        let (status, body) = send(
            &t.app,
            "POST",
            "/api/transactions",
            Some(create_body(json!(amount), "ACC1")),
            Some(USER),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST, "amount {}", amount);
        assert!(body["error"].as_str().unwrap().contains("amount"));
    }
    assert!(t.events.entries().await.is_empty());
}

#[tokio::test]
async fn test_malformed_body_is_bad_request() {
    let t = test_app(quiet_webhook()).await;

    let (status, _) = send(
        &t.app,
        "POST",
        "/api/transactions",
        Some(json!({"amount": "10"})),
        Some(USER),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_create_requires_known_user() {
    let t = test_app(quiet_webhook()).await;

    let (status, _) = send(
        &t.app,
        "POST",
        "/api/transactions",
        Some(create_body(json!("10"), "ACC1")),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = send(
        &t.app,
        "POST",
        "/api/transactions",
        Some(create_body(json!("10"), "ACC1")),
        Some("stranger"),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(t.events.entries().await.is_empty());
}

#[tokio::test]
async fn test_unknown_and_malformed_ids() {
    let t = test_app(quiet_webhook()).await;

    let (status, _) = send(
        &t.app,
        "POST",
        &format!("/api/transactions/{}/review", Uuid::new_v4()),
        None,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let missing = format!("/api/transactions/{}", Uuid::new_v4());
    let (status, _) = send(&t.app, "GET", &missing, None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) =
        send(&t.app, "POST", "/api/transactions/not-a-uuid/approve", None, None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_list_filters_by_status() {
    let t = test_app(quiet_webhook()).await;
    for _ in 0..2 {
        send(
            &t.app,
            "POST",
            "/api/transactions",
            Some(create_body(json!("10"), "ACC1")),
            Some(USER),
        )
        .await;
    }
    let (_, first) = send(&t.app, "GET", "/api/transactions", None, None).await;
    let id = first[0]["id"].as_str().unwrap().to_string();
    send(&t.app, "POST", &format!("/api/transactions/{}/review", id), None, None).await;

    let (status, pending) = send(&t.app, "GET", "/api/transactions", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(pending.as_array().unwrap().len(), 1);

    let (_, review) = send(&t.app, "GET", "/api/transactions?status=review", None, None).await;
    assert_eq!(review.as_array().unwrap().len(), 1);
    assert_eq!(review[0]["id"], id.as_str());

    let (status, _) = send(&t.app, "GET", "/api/transactions?status=done", None, None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_health_endpoint() {
    let t = test_app(quiet_webhook()).await;

    let (status, body) = send(&t.app, "GET", "/health", None, None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["dependencies"]["postgres"]["status"], "healthy");
}
