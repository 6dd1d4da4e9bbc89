//! HTTP API for message ingestion
//!
//! This module provides the inbound surface of the service:
//! - One POST route per correlated message kind
//! - A health check
//!
//! Handlers decode the tagged message, run it through the correlation
//! pipeline, and return the enriched message; a configured bus forward
//! happens after success, best-effort.

use crate::{FlowPrepApp, PrepError};
use axum::{
    http::StatusCode,
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use tracing::info;

mod health;
mod messages;

pub use health::*;
pub use messages::*;

/// API state shared across handlers
#[derive(Clone)]
pub struct ApiState {
    /// The application
    pub app: FlowPrepApp,
}

/// Build the API router
fn build_router(app: FlowPrepApp) -> Router {
    let state = ApiState { app };

    Router::new()
        // Health check
        .route("/health", get(health_check))
        // Message ingestion, one route per kind
        .route("/v1/messages/quote", post(handle_quote))
        .route("/v1/messages/quote-reply", post(handle_quote_reply))
        .route("/v1/messages/transfer", post(handle_transfer))
        .route("/v1/messages/transfer-status", post(handle_transfer_status))
        // Add state
        .with_state(state)
}

/// Start the HTTP API server with graceful shutdown
pub async fn serve_with_shutdown(
    app: FlowPrepApp,
    shutdown_rx: tokio::sync::oneshot::Receiver<()>,
) -> anyhow::Result<()> {
    let config = app.config.clone();

    // Build the router
    let router = build_router(app);

    // Add CORS if enabled
    let router = if config.api.enable_cors {
        router.layer(tower_http::cors::CorsLayer::permissive())
    } else {
        router
    };

    // Parse bind address
    let addr: std::net::SocketAddr = config
        .api
        .bind_address
        .parse()
        .map_err(|e| anyhow::anyhow!("Invalid bind address: {}", e))?;

    info!("Starting HTTP API server on {}", addr);

    // Start the server with graceful shutdown
    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            let _ = shutdown_rx.await;
            info!("Received shutdown signal, stopping API server...");
        })
        .await?;

    info!("API server stopped gracefully");
    Ok(())
}

/// Standard API response wrapper
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    /// Whether the request was successful
    pub success: bool,
    /// Response data (only present if success is true)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    /// Error message (only present if success is false)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    /// Create a successful response
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    /// Create an error response
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.into()),
        }
    }
}

/// Convert a pipeline error to an HTTP status code
pub fn error_to_status_code(err: &PrepError) -> StatusCode {
    match err {
        PrepError::Message(_) => StatusCode::BAD_REQUEST,
        PrepError::Cache(_) => StatusCode::INTERNAL_SERVER_ERROR,
        PrepError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        PrepError::Notify(_) => StatusCode::INTERNAL_SERVER_ERROR,
        PrepError::Bus(_) => StatusCode::BAD_GATEWAY,
        PrepError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}
