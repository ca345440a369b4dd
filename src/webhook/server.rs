//! Webhook HTTP server
//!
//! - `POST /webhook` - signed provider events
//! - `GET /healthz` - liveness probe
//! - `GET /metrics` - Prometheus metrics in text format

use crate::webhook::handlers::{dispatch, AppState};
use crate::webhook::signature::{verify_signature, SIGNATURE_HEADER};
use axum::{
    body::Bytes,
    extract::State,
    http::{header::CONTENT_TYPE, HeaderMap, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info};

/// Header naming the event kind
pub const EVENT_HEADER: &str = "X-GitHub-Event";

/// Webhook endpoint handler
///
/// The signature is verified over the raw body before anything is parsed;
/// a mismatch never reaches a handler.
async fn webhook(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> (StatusCode, String) {
    let kind = headers
        .get(EVENT_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("unknown");

    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    if !verify_signature(&body, signature, &state.config.webhook_secret) {
        state.metrics.record_event(kind, "forbidden");
        return (StatusCode::FORBIDDEN, "signature mismatch".to_string());
    }

    match dispatch(&state, kind, &body).await {
        Ok(message) => (StatusCode::OK, message),
        Err(err) => {
            // Full error (with type) stays in the logs; clients get
            // generic text
            error!(event = %kind, error = ?err, "Webhook handler failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal error".to_string(),
            )
        }
    }
}

/// Liveness probe handler
async fn healthz() -> StatusCode {
    StatusCode::OK
}

/// Prometheus metrics handler
async fn metrics(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match state.metrics.encode() {
        Ok(body) => (
            StatusCode::OK,
            [(CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
            body,
        )
            .into_response(),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Failed to encode metrics: {}", e),
        )
            .into_response(),
    }
}

/// Run the webhook server until the shutdown future resolves
pub async fn run_webhook_server(
    bind: &str,
    state: Arc<AppState>,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<(), std::io::Error> {
    let app = Router::new()
        .route("/webhook", post(webhook))
        .route("/healthz", get(healthz))
        .route("/metrics", get(self::metrics))
        .with_state(state);

    let listener = TcpListener::bind(bind).await?;
    // Log after successful bind - the server is actually listening
    info!(addr = %bind, "Webhook server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(std::io::Error::other)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[path = "server_test.rs"]
mod tests;
