//! Unlock route definitions

use axum::{routing::post, Router};

use crate::handlers::redeem_unlock_code;
use crate::state::AppState;

pub fn unlock_routes() -> Router<AppState> {
    Router::new().route("/api/unlock", post(redeem_unlock_code))
}
