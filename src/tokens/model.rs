use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A one-shot unlock code bound to a rider and a bike.
#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, Clone)]
pub struct UnlockToken {
    pub code: String,
    pub rider_phone: String,
    pub bike_id: String,
    pub device_id: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl UnlockToken {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

/// Outcome of presenting a code. An expired code is reported as expired,
/// never as unknown, so the rider knows to ask for a fresh one.
#[derive(Debug, Clone)]
pub enum Redemption {
    Redeemed(UnlockToken),
    Expired,
    Invalid,
}
