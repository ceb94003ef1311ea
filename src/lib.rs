pub mod adapters;
pub mod cli;
pub mod config;
pub mod db;
pub mod domain;
pub mod error;
pub mod handlers;
pub mod health;
pub mod media;
pub mod ports;
pub mod schemas;
pub mod services;
pub mod startup;
pub mod use_cases;
pub mod validation;

use axum::{
    http::HeaderValue,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use std::time::Instant;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};

use crate::health::Dependency;
use crate::services::LiveGateway;
use crate::use_cases::TransactionService;

#[derive(Clone)]
pub struct AppState {
    pub transactions: Arc<TransactionService>,
    pub gateway: LiveGateway,
    pub health: Arc<Vec<Dependency>>,
    pub start_time: Instant,
}

pub fn create_app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route(
            "/api/transactions",
            post(handlers::transactions::create_transaction)
                .get(handlers::transactions::list_transactions),
        )
        .route(
            "/api/transactions/:id",
            get(handlers::transactions::get_transaction),
        )
        .route(
            "/api/transactions/:id/review",
            post(handlers::transactions::review_transaction),
        )
        .route(
            "/api/transactions/:id/approve",
            post(handlers::transactions::approve_transaction),
        )
        .route(
            "/api/transactions/:id/reject",
            post(handlers::transactions::reject_transaction),
        )
        .route("/api/sse", get(handlers::sse::live_events))
        .with_state(state)
}

/// Permissive without an origin list, otherwise restricted to the listed origins.
pub fn cors_layer(origins: Option<Vec<String>>) -> CorsLayer {
    match origins {
        None => CorsLayer::permissive(),
        Some(origins) => {
            let origins: Vec<HeaderValue> = origins
                .iter()
                .filter_map(|origin| origin.parse().ok())
                .collect();
            CorsLayer::new()
                .allow_origin(AllowOrigin::list(origins))
                .allow_methods(Any)
                .allow_headers(Any)
        }
    }
}
