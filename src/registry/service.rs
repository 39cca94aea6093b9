use anyhow::{Context, Result};
use sqlx::PgPool;

use super::model::{Bike, BikeLookup, FarePlan};

#[derive(Clone)]
pub struct RegistryService {
    db_pool: PgPool,
}

impl RegistryService {
    pub fn new(db_pool: PgPool) -> Self {
        Self { db_pool }
    }

    /// Resolve a bike by the name a rider typed. Matching is case-insensitive.
    pub async fn find_bike_by_name(&self, name: &str) -> Result<BikeLookup> {
        let bike = sqlx::query_as::<_, Bike>("SELECT * FROM bikes WHERE LOWER(bike_id) = LOWER($1)")
            .bind(name.trim())
            .fetch_optional(&self.db_pool)
            .await
            .context("Failed to look up bike by name")?;

        Ok(match bike {
            None => BikeLookup::NotFound,
            Some(b) if b.is_available() => BikeLookup::Available(b),
            Some(b) => BikeLookup::Unavailable(b),
        })
    }

    pub async fn get_bike(&self, bike_id: &str) -> Result<Option<Bike>> {
        sqlx::query_as::<_, Bike>("SELECT * FROM bikes WHERE bike_id = $1")
            .bind(bike_id)
            .fetch_optional(&self.db_pool)
            .await
            .context("Failed to fetch bike")
    }

    /// Operational toggle for the reservation flag. The ride paths flip the
    /// flag inside their own transactions; this standalone form exists for
    /// fleet maintenance.
    pub async fn set_reserved(&self, bike_id: &str, reserved: bool) -> Result<bool> {
        let updated = sqlx::query("UPDATE bikes SET is_reserved = $2 WHERE bike_id = $1")
            .bind(bike_id)
            .bind(reserved)
            .execute(&self.db_pool)
            .await
            .context("Failed to update reservation flag")?;

        Ok(updated.rows_affected() > 0)
    }

    /// The tariff applied to new rides. There is one active plan at a time.
    pub async fn current_fare_plan(&self) -> Result<Option<FarePlan>> {
        sqlx::query_as::<_, FarePlan>(
            "SELECT * FROM fare_plans WHERE active = TRUE ORDER BY id LIMIT 1",
        )
        .fetch_optional(&self.db_pool)
        .await
        .context("Failed to fetch active fare plan")
    }
}
