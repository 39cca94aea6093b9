//! Application state shared across handlers

use std::sync::Arc;

use sqlx::PgPool;

use crate::billing::BillingService;
use crate::chat::{ChatEngine, SessionStore};
use crate::iot::IotClient;
use crate::messaging::WhatsAppClient;
use crate::riders::RiderService;
use crate::rides::RideService;
use crate::tokens::TokenStore;

/// Everything the HTTP layer needs. Cloning is cheap, the services all
/// sit behind `Arc` or carry a pool handle.
#[derive(Clone)]
pub struct AppState {
    pub chat_engine: Arc<ChatEngine>,
    pub tokens: Arc<TokenStore>,
    pub riders: Arc<RiderService>,
    pub rides: Arc<RideService>,
    pub billing: Arc<BillingService>,
    pub iot: Arc<IotClient>,
    pub messaging: Arc<WhatsAppClient>,
    pub sessions: SessionStore,
    pub db_pool: PgPool,
}

impl AppState {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        chat_engine: Arc<ChatEngine>,
        tokens: Arc<TokenStore>,
        riders: Arc<RiderService>,
        rides: Arc<RideService>,
        billing: Arc<BillingService>,
        iot: Arc<IotClient>,
        messaging: Arc<WhatsAppClient>,
        sessions: SessionStore,
        db_pool: PgPool,
    ) -> Self {
        Self {
            chat_engine,
            tokens,
            riders,
            rides,
            billing,
            iot,
            messaging,
            sessions,
            db_pool,
        }
    }
}
