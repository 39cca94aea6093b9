//! Payment callback route definitions

use axum::{routing::get, Router};

use crate::handlers::payment_callback;
use crate::state::AppState;

pub fn payment_routes() -> Router<AppState> {
    Router::new().route("/payments/callback", get(payment_callback))
}
