//! Webhook endpoint handlers.
//!
//! The inbound handler runs the whole relay pipeline inside the request and
//! maps its terminal state to an HTTP status:
//! - 200 on success or when there was nothing to process
//! - 404 when the recipient does not resolve to an active tenant
//! - 500 on any other failure

use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::Serialize;
use tracing::{info, warn};

use crate::inbound::InboundEmailEvent;
use crate::pipeline::{Pipeline, PipelineOutcome};

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<Pipeline>,
}

impl AppState {
    pub fn new(pipeline: Pipeline) -> Self {
        Self {
            pipeline: Arc::new(pipeline),
        }
    }
}

// =============================================================================
// Health Check
// =============================================================================

/// Health check response.
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

/// Health check endpoint.
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

// =============================================================================
// Inbound Email Webhook
// =============================================================================

/// Webhook response.
#[derive(Debug, Serialize)]
pub struct RelayResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attachments: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<&'static str>,
}

impl RelayResponse {
    fn failure(error: String, kind: &'static str) -> Self {
        Self {
            success: false,
            attachments: None,
            message: None,
            error: Some(error),
            kind: Some(kind),
        }
    }
}

/// Inbound email webhook endpoint.
pub async fn inbound_webhook(
    State(state): State<AppState>,
    payload: Result<Json<InboundEmailEvent>, JsonRejection>,
) -> impl IntoResponse {
    let Json(event) = match payload {
        Ok(payload) => payload,
        Err(rejection) => {
            warn!(error = %rejection.body_text(), "inbound_payload_rejected");
            return (
                StatusCode::BAD_REQUEST,
                Json(RelayResponse::failure(
                    rejection.body_text(),
                    "invalid_payload",
                )),
            );
        }
    };

    info!(
        to = %event.to,
        from = %event.from,
        subject = %event.subject,
        attachments = event.attachments.len(),
        "inbound_webhook_received"
    );

    match state.pipeline.run(&event).await {
        Ok(PipelineOutcome::NoDocuments) => (
            StatusCode::OK,
            Json(RelayResponse {
                success: true,
                attachments: Some(0),
                message: Some("No PDF attachments to process".to_string()),
                error: None,
                kind: None,
            }),
        ),
        Ok(PipelineOutcome::Relayed { attachments, .. }) => (
            StatusCode::OK,
            Json(RelayResponse {
                success: true,
                attachments: Some(attachments),
                message: None,
                error: None,
                kind: None,
            }),
        ),
        Err(e) => (
            e.status_code(),
            Json(RelayResponse::failure(e.to_string(), e.kind())),
        ),
    }
}
