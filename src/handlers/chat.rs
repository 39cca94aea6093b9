//! Inbound WhatsApp webhook handler

use axum::{extract::State, http::StatusCode, Form};
use serde::Deserialize;

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// Subset of the provider's webhook form we care about. Everything else
/// in the post body is ignored.
#[derive(Debug, Deserialize)]
pub struct InboundMessage {
    #[serde(rename = "From")]
    pub from: String,
    #[serde(rename = "Body", default)]
    pub body: String,
}

/// Entry point for every message a rider sends. Replies go out through
/// the messaging client, so the webhook answer itself stays empty.
pub async fn inbound_message(
    State(state): State<AppState>,
    Form(inbound): Form<InboundMessage>,
) -> ApiResult<StatusCode> {
    state
        .chat_engine
        .handle_message(&inbound.from, &inbound.body)
        .await
        .map_err(|e| {
            tracing::error!(sender = %inbound.from, "Failed to process inbound message: {:#}", e);
            ApiError::InternalError("Failed to process message".to_string())
        })?;

    Ok(StatusCode::OK)
}
