#![allow(dead_code)]

use axum::body::{Body, HttpBody};
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::Value;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tower::ServiceExt;

use valpago_core::adapters::memory::{
    MemoryBroadcastLog, MemoryEventLog, MemoryRecordStore, MemoryStatusRegister,
};
use valpago_core::health::{Dependency, DependencyChecker, DependencyStatus};
use valpago_core::ports::WebhookNotifier;
use valpago_core::services::LiveGateway;
use valpago_core::use_cases::TransactionService;
use valpago_core::{create_app, AppState};

pub const USER: &str = "user-1";

pub struct TestApp {
    pub app: Router,
    pub register: Arc<MemoryStatusRegister>,
    pub records: Arc<MemoryRecordStore>,
    pub events: MemoryEventLog,
    pub broadcast: MemoryBroadcastLog,
    pub shutdown: watch::Sender<bool>,
}

struct AlwaysHealthy;

#[async_trait::async_trait]
impl DependencyChecker for AlwaysHealthy {
    async fn check(&self) -> DependencyStatus {
        DependencyStatus::Healthy {
            status: "healthy".to_string(),
            latency_ms: 0,
        }
    }
}

pub async fn test_app(webhook: Arc<dyn WebhookNotifier>) -> TestApp {
    let health = vec![Dependency {
        name: "postgres",
        critical: true,
        checker: Arc::new(AlwaysHealthy),
    }];
    test_app_with_health(webhook, health).await
}

pub async fn test_app_with_health(
    webhook: Arc<dyn WebhookNotifier>,
    health: Vec<Dependency>,
) -> TestApp {
    let register = Arc::new(MemoryStatusRegister::new());
    let records = Arc::new(MemoryRecordStore::new());
    let events = MemoryEventLog::new();
    let broadcast = MemoryBroadcastLog::new();
    let (shutdown, shutdown_rx) = watch::channel(false);
    records.insert_user(USER).await;

    let transactions = TransactionService::new(
        register.clone(),
        records.clone(),
        Arc::new(events.clone()),
        webhook,
    );
    let gateway = LiveGateway::new(
        Arc::new(broadcast.clone()),
        10,
        Duration::from_millis(50),
        shutdown_rx,
    );

    let state = AppState {
        transactions: Arc::new(transactions),
        gateway,
        health: Arc::new(health),
        start_time: Instant::now(),
    };

    TestApp {
        app: create_app(state),
        register,
        records,
        events,
        broadcast,
        shutdown,
    }
}

pub fn create_body(amount: Value, destination: &str) -> Value {
    serde_json::json!({
        "amount": amount,
        "payment_method": "transfer",
        "source_account": "SRC1",
        "destination_account": destination,
        "reference": "REF-1",
        "beneficiary": "Jane Doe",
        "requester_phone": "+570000000",
    })
}

pub async fn send(
    app: &Router,
    method: &str,
    uri: &str,
    body: Option<Value>,
    user: Option<&str>,
) -> (StatusCode, Value) {
    let mut request = Request::builder().method(method).uri(uri);
    if let Some(user) = user {
        request = request.header("x-user-id", user);
    }
    let body = match body {
        Some(json) => {
            request = request.header("content-type", "application/json");
            Body::from(json.to_string())
        }
        None => Body::empty(),
    };

    let response = app
        .clone()
        .oneshot(request.body(body).unwrap())
        .await
        .unwrap();
    let status = response.status();

    let mut body = response.into_body();
    let mut bytes = Vec::new();
    while let Some(chunk) = body.data().await {
        bytes.extend_from_slice(&chunk.unwrap());
    }
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };

    (status, json)
}
