//! Rodada: dockless bike rentals over WhatsApp.
//!
//! The server runs the conversational flow (registration, bike selection,
//! balance top-ups), issues single-use unlock codes, talks to the lock
//! vendor's instruction API, and settles rides against the rider's balance.

pub mod assistant;
pub mod billing;
pub mod chat;
pub mod config;
pub mod db;
pub mod error;
pub mod handlers;
pub mod iot;
pub mod messaging;
pub mod middleware;
pub mod models;
pub mod payments;
pub mod registry;
pub mod riders;
pub mod rides;
pub mod routes;
pub mod state;
pub mod tokens;

pub use config::Config;
pub use error::{ApiError, ApiResult};
pub use state::AppState;
