//! Validating admission webhook
//!
//! Serves `POST /validate` for every custom resource kind. TLS is expected
//! to be terminated in front of the operator.

pub mod validate;

pub use validate::*;

use axum::routing::{get, post};
use axum::{Json, Router};
use kube::core::admission::AdmissionReview;
use kube::core::DynamicObject;
use std::net::SocketAddr;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::error::{Error, Result};

async fn validate_handler(
    Json(body): Json<AdmissionReview<DynamicObject>>,
) -> Json<AdmissionReview<DynamicObject>> {
    Json(review(body))
}

async fn health() -> &'static str {
    "ok"
}

/// Webhook routes
pub fn router() -> Router {
    Router::new()
        .route("/validate", post(validate_handler))
        .route("/healthz", get(health))
        .layer(TraceLayer::new_for_http())
}

/// Serve the webhook until `shutdown` fires
pub async fn run_webhook_server(addr: SocketAddr, shutdown: CancellationToken) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| Error::Internal(format!("failed to bind webhook server: {}", e)))?;
    info!(%addr, "webhook server listening");

    axum::serve(listener, router())
        .with_graceful_shutdown(async move {
            shutdown.cancelled().await;
            info!("webhook server shutting down");
        })
        .await
        .map_err(|e| Error::Internal(format!("webhook server error: {}", e)))?;
    Ok(())
}
