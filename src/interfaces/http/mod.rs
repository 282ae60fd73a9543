//! HTTP surface: the provider webhook endpoint and a health probe.

use crate::application::webhook::{Ack, WebhookIngestor};
use crate::error::IngestError;
use crate::interfaces::stripe::SIGNATURE_HEADER;
use axum::{
    Json, Router,
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

pub const WEBHOOK_PATH: &str = "/webhooks/stripe";
pub const HEALTH_PATH: &str = "/health";

pub fn router(ingestor: Arc<WebhookIngestor>) -> Router {
    Router::new()
        .route(WEBHOOK_PATH, post(stripe_webhook))
        .route(HEALTH_PATH, get(health))
        .layer(TraceLayer::new_for_http())
        .with_state(ingestor)
}

pub async fn serve(addr: SocketAddr, app: Router) -> std::io::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    info!(%addr, "webhook listener ready");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("shutting down");
    }
}

async fn health() -> &'static str {
    "ok"
}

/// The body must reach the verifier byte for byte, so it is taken as raw
/// `Bytes` and never through a JSON extractor.
async fn stripe_webhook(
    State(ingestor): State<Arc<WebhookIngestor>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|value| value.to_str().ok());

    match ingestor.ingest(&body, signature).await {
        Ok(ack) => (StatusCode::OK, Json(ack_body(&ack))).into_response(),
        Err(err) => err.into_response(),
    }
}

fn ack_body(ack: &Ack) -> serde_json::Value {
    match ack {
        Ack::Applied(entry) | Ack::AlreadyApplied(entry) => json!({
            "received": true,
            "status": ack.label(),
            "entry_id": entry.entry_id.to_string(),
        }),
        Ack::Ignored(reason) => json!({
            "received": true,
            "status": ack.label(),
            "reason": reason.to_string(),
        }),
    }
}

impl IntoResponse for IngestError {
    fn into_response(self) -> Response {
        let status = match &self {
            IngestError::InvalidSignature(_) | IngestError::MalformedEvent(_) => {
                StatusCode::BAD_REQUEST
            }
            IngestError::Storage(e) => {
                error!(error = %e, "webhook could not be recorded");
                StatusCode::SERVICE_UNAVAILABLE
            }
        };
        let message = match &self {
            IngestError::Storage(_) => "ledger unavailable, retry later".to_string(),
            other => other.to_string(),
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}
