//! Message ingestion handlers
//!
//! One handler per correlated message kind. Each decodes the tagged
//! payload, rejects a payload whose type code does not match the route,
//! and hands the message to the correlation pipeline. The enriched
//! message is echoed back to the caller; bus forwarding happens after
//! success and never affects the response.

use super::{error_to_status_code, ApiResponse, ApiState};
use crate::messages::PaymentMessage;
use axum::{
    extract::{Json, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use tracing::{error, info};

/// Successful processing response body
#[derive(Debug, Serialize)]
pub struct ProcessedMessage {
    /// Outcome description
    pub message: String,
    /// The enriched message
    pub data: PaymentMessage,
}

/// Handle an originating quote
pub async fn handle_quote(
    State(state): State<ApiState>,
    Json(msg): Json<PaymentMessage>,
) -> Response {
    if !matches!(msg, PaymentMessage::Quote(_)) {
        return kind_mismatch("quote", &msg);
    }
    run(state, msg).await
}

/// Handle a quote reply
pub async fn handle_quote_reply(
    State(state): State<ApiState>,
    Json(msg): Json<PaymentMessage>,
) -> Response {
    if !matches!(msg, PaymentMessage::QuoteReply(_)) {
        return kind_mismatch("quote-reply", &msg);
    }
    run(state, msg).await
}

/// Handle a funds transfer
pub async fn handle_transfer(
    State(state): State<ApiState>,
    Json(msg): Json<PaymentMessage>,
) -> Response {
    if !matches!(msg, PaymentMessage::Transfer(_)) {
        return kind_mismatch("transfer", &msg);
    }
    run(state, msg).await
}

/// Handle a transfer status report
pub async fn handle_transfer_status(
    State(state): State<ApiState>,
    Json(msg): Json<PaymentMessage>,
) -> Response {
    if !matches!(msg, PaymentMessage::TransferStatus(_)) {
        return kind_mismatch("transfer-status", &msg);
    }
    run(state, msg).await
}

async fn run(state: ApiState, mut msg: PaymentMessage) -> Response {
    let label = msg.label();
    info!("Start - Handle {label} request");

    let result = state.app.pipeline.process(&mut msg).await;

    let response = match result {
        Ok(()) => {
            state.app.forward(&msg).await;
            (
                StatusCode::OK,
                Json(ApiResponse::success(ProcessedMessage {
                    message: "Transaction is valid".to_string(),
                    data: msg,
                })),
            )
                .into_response()
        }
        Err(e) => {
            error!("Failed to process {label} request: {e}");
            (
                error_to_status_code(&e),
                Json(ApiResponse::<ProcessedMessage>::error(e.to_string())),
            )
                .into_response()
        }
    };

    info!("End - Handle {label} request");
    response
}

fn kind_mismatch(expected: &str, msg: &PaymentMessage) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(ApiResponse::<ProcessedMessage>::error(format!(
            "expected a {expected} message, got {}",
            msg.label()
        ))),
    )
        .into_response()
}
