use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A bike in the fleet, keyed by its public name.
#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, Clone)]
pub struct Bike {
    /// Public name riders use in chat ("Pegasus").
    pub bike_id: String,
    /// IMEI of the lock unit mounted on this bike.
    pub device_id: String,
    pub lat: f64,
    pub lon: f64,
    pub is_reserved: bool,
    pub is_disabled: bool,
    pub battery_percent: Option<i32>,
    pub last_reported_at: Option<DateTime<Utc>>,
}

impl Bike {
    pub fn is_available(&self) -> bool {
        !self.is_reserved && !self.is_disabled
    }
}

/// Result of resolving a bike name from chat input.
#[derive(Debug, Clone)]
pub enum BikeLookup {
    Available(Bike),
    Unavailable(Bike),
    NotFound,
}

/// Pricing: a flat unlock fee plus a per-minute rate.
#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, Clone)]
pub struct FarePlan {
    pub id: String,
    pub base_fee: i64,
    pub per_minute_rate: i64,
    pub currency: String,
    pub active: bool,
}

impl FarePlan {
    pub fn cost_for(&self, duration_minutes: i64) -> i64 {
        self.base_fee + self.per_minute_rate * duration_minutes
    }
}
