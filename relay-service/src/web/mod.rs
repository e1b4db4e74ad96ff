//! Web server module for handling inbound email webhooks.
//!
//! This module provides:
//! - `GET /health` liveness probe
//! - `POST /webhooks/inbound` which runs the relay pipeline per delivery

pub mod handlers;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

pub use handlers::{health, inbound_webhook, AppState, HealthResponse, RelayResponse};

/// Build the application router.
pub fn router(state: AppState, max_body_bytes: usize) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/webhooks/inbound", post(inbound_webhook))
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
