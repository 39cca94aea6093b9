use anyhow::{bail, Context, Result};
use chrono::{Duration, Utc};
use rand::Rng;
use sqlx::PgPool;

use super::model::{Redemption, UnlockToken};
use crate::registry::Bike;

const CODE_ALLOCATION_ATTEMPTS: u32 = 5;

#[derive(Clone)]
pub struct TokenStore {
    db_pool: PgPool,
    ttl_secs: i64,
}

impl TokenStore {
    pub fn new(db_pool: PgPool, ttl_secs: i64) -> Self {
        Self { db_pool, ttl_secs }
    }

    /// Issue a fresh code for the given rider and bike. Collisions with a
    /// live code are retried with a new draw.
    pub async fn issue(&self, rider_phone: &str, bike: &Bike) -> Result<UnlockToken> {
        let now = Utc::now();
        let expires_at = now + Duration::seconds(self.ttl_secs);

        for _ in 0..CODE_ALLOCATION_ATTEMPTS {
            let code = generate_code();

            let inserted = sqlx::query(
                r#"
                INSERT INTO unlock_tokens (code, rider_phone, bike_id, device_id, created_at, expires_at)
                VALUES ($1, $2, $3, $4, $5, $6)
                ON CONFLICT (code) DO NOTHING
                "#,
            )
            .bind(&code)
            .bind(rider_phone)
            .bind(&bike.bike_id)
            .bind(&bike.device_id)
            .bind(now)
            .bind(expires_at)
            .execute(&self.db_pool)
            .await
            .context("Failed to store unlock token")?;

            if inserted.rows_affected() == 1 {
                tracing::info!(
                    bike_id = %bike.bike_id,
                    expires_at = %expires_at,
                    "Issued unlock code"
                );
                return Ok(UnlockToken {
                    code,
                    rider_phone: rider_phone.to_string(),
                    bike_id: bike.bike_id.clone(),
                    device_id: bike.device_id.clone(),
                    created_at: now,
                    expires_at,
                });
            }
        }

        bail!("Could not allocate a free unlock code")
    }

    /// Atomically consume a code. The row is deleted whether it turns out
    /// live or expired, so a second caller always sees `Invalid`.
    pub async fn redeem(&self, code: &str) -> Result<Redemption> {
        let token = sqlx::query_as::<_, UnlockToken>(
            "DELETE FROM unlock_tokens WHERE code = $1 RETURNING *",
        )
        .bind(code.trim())
        .fetch_optional(&self.db_pool)
        .await
        .context("Failed to redeem unlock token")?;

        Ok(match token {
            None => Redemption::Invalid,
            Some(t) if t.is_expired(Utc::now()) => Redemption::Expired,
            Some(t) => Redemption::Redeemed(t),
        })
    }

    /// Drop codes past their expiry. Runs on the watchdog cycle.
    pub async fn purge_expired(&self) -> Result<u64> {
        let purged = sqlx::query("DELETE FROM unlock_tokens WHERE expires_at <= $1")
            .bind(Utc::now())
            .execute(&self.db_pool)
            .await
            .context("Failed to purge expired unlock tokens")?;

        Ok(purged.rows_affected())
    }
}

/// Six digits, no leading zero, so the code survives copy-paste into numeric
/// keypads.
fn generate_code() -> String {
    rand::thread_rng().gen_range(100_000..1_000_000).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_codes_are_six_digits() {
        for _ in 0..200 {
            let code = generate_code();
            assert_eq!(code.len(), 6);
            assert!(code.chars().all(|c| c.is_ascii_digit()));
            assert!(!code.starts_with('0'));
        }
    }

    #[test]
    fn test_expiry_is_inclusive() {
        let now = Utc::now();
        let token = UnlockToken {
            code: "482193".to_string(),
            rider_phone: "whatsapp:+5493510000000".to_string(),
            bike_id: "Pegasus".to_string(),
            device_id: "867000000000001".to_string(),
            created_at: now,
            expires_at: now,
        };
        assert!(token.is_expired(now));
        assert!(!token.is_expired(now - Duration::seconds(1)));
    }
}
