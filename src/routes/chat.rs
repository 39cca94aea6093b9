//! Webhook route definitions

use axum::{routing::post, Router};

use crate::handlers::inbound_message;
use crate::state::AppState;

pub fn chat_routes() -> Router<AppState> {
    Router::new().route("/webhook", post(inbound_message))
}
