use anyhow::{Context, Result};
use chrono::Utc;
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use super::model::{LedgerEntry, LedgerKind, NewRider, RegisterOutcome, Rider};

#[derive(Clone)]
pub struct RiderService {
    db_pool: PgPool,
}

impl RiderService {
    pub fn new(db_pool: PgPool) -> Self {
        Self { db_pool }
    }

    /// Create or refresh the rider bound to a phone number. A DNI that
    /// belongs to a different account is reported, not overwritten.
    pub async fn register(&self, new: NewRider) -> Result<RegisterOutcome> {
        let now = Utc::now();

        let result = sqlx::query_as::<_, Rider>(
            r#"
            INSERT INTO riders (id, phone, first_name, last_name, dni, email, balance, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, 0, $7, $7)
            ON CONFLICT (phone) DO UPDATE
            SET first_name = EXCLUDED.first_name,
                last_name = EXCLUDED.last_name,
                dni = EXCLUDED.dni,
                email = EXCLUDED.email,
                updated_at = EXCLUDED.updated_at
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&new.phone)
        .bind(&new.first_name)
        .bind(&new.last_name)
        .bind(&new.dni)
        .bind(&new.email)
        .bind(now)
        .fetch_one(&self.db_pool)
        .await;

        match result {
            Ok(rider) => Ok(RegisterOutcome::Registered(rider)),
            Err(sqlx::Error::Database(db)) if db.constraint() == Some("riders_dni_key") => {
                Ok(RegisterOutcome::DniTaken)
            }
            Err(e) => Err(e).context("Failed to register rider"),
        }
    }

    pub async fn find_by_phone(&self, phone: &str) -> Result<Option<Rider>> {
        sqlx::query_as::<_, Rider>("SELECT * FROM riders WHERE phone = $1")
            .bind(phone)
            .fetch_optional(&self.db_pool)
            .await
            .context("Failed to fetch rider by phone")
    }

    pub async fn find_by_dni(&self, dni: &str) -> Result<Option<Rider>> {
        sqlx::query_as::<_, Rider>("SELECT * FROM riders WHERE dni = $1")
            .bind(dni)
            .fetch_optional(&self.db_pool)
            .await
            .context("Failed to fetch rider by DNI")
    }

    /// Bind a WhatsApp number to the account holding this DNI. Succeeds only
    /// when the account has no number yet or already holds this one.
    pub async fn claim_phone(&self, dni: &str, phone: &str) -> Result<Option<Rider>> {
        let result = sqlx::query_as::<_, Rider>(
            r#"
            UPDATE riders
            SET phone = $2, updated_at = $3
            WHERE dni = $1 AND (phone IS NULL OR phone = $2)
            RETURNING *
            "#,
        )
        .bind(dni)
        .bind(phone)
        .bind(Utc::now())
        .fetch_optional(&self.db_pool)
        .await;

        match result {
            Ok(rider) => Ok(rider),
            Err(sqlx::Error::Database(db)) if db.constraint() == Some("riders_phone_key") => {
                tracing::warn!(dni = %dni, "Phone already bound to a different rider");
                Ok(None)
            }
            Err(e) => Err(e).context("Failed to claim phone for rider"),
        }
    }

    pub async fn recent_entries(&self, rider_id: Uuid, limit: i64) -> Result<Vec<LedgerEntry>> {
        sqlx::query_as::<_, LedgerEntry>(
            "SELECT * FROM ledger_entries WHERE rider_id = $1 ORDER BY created_at DESC LIMIT $2",
        )
        .bind(rider_id)
        .bind(limit)
        .fetch_all(&self.db_pool)
        .await
        .context("Failed to fetch ledger entries")
    }
}

/// Move a rider's balance and append the matching ledger entry. Runs on the
/// caller's transaction; the rider row is locked for the read-modify-write.
pub async fn apply_balance_delta(
    conn: &mut PgConnection,
    rider_id: Uuid,
    kind: LedgerKind,
    amount: i64,
    concept: &str,
    ride_id: Option<Uuid>,
    topup_id: Option<Uuid>,
) -> Result<i64> {
    let (balance,): (i64,) = sqlx::query_as("SELECT balance FROM riders WHERE id = $1 FOR UPDATE")
        .bind(rider_id)
        .fetch_one(&mut *conn)
        .await
        .context("Rider row missing for balance update")?;

    let new_balance = match kind {
        LedgerKind::Credit => balance + amount,
        LedgerKind::Debit => balance - amount,
    };

    sqlx::query("UPDATE riders SET balance = $1, updated_at = $2 WHERE id = $3")
        .bind(new_balance)
        .bind(Utc::now())
        .bind(rider_id)
        .execute(&mut *conn)
        .await
        .context("Failed to update rider balance")?;

    sqlx::query(
        r#"
        INSERT INTO ledger_entries (id, rider_id, kind, amount, concept, ride_id, topup_id, created_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(rider_id)
    .bind(kind)
    .bind(amount)
    .bind(concept)
    .bind(ride_id)
    .bind(topup_id)
    .bind(Utc::now())
    .execute(&mut *conn)
    .await
    .context("Failed to append ledger entry")?;

    Ok(new_balance)
}
