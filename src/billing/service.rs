use anyhow::{Context, Result};
use chrono::Utc;
use sqlx::PgPool;
use std::sync::Arc;
use uuid::Uuid;

use super::model::{Settlement, Topup};
use crate::payments::{CheckoutClient, ExternalReference};
use crate::riders::{apply_balance_delta, LedgerKind};

pub struct BillingService {
    db_pool: PgPool,
    checkout: Arc<CheckoutClient>,
}

impl BillingService {
    pub fn new(db_pool: PgPool, checkout: Arc<CheckoutClient>) -> Self {
        Self { db_pool, checkout }
    }

    /// Record a pending top-up and fetch its checkout link. A record whose
    /// link cannot be created is closed as `failure` right away.
    pub async fn create_topup(
        &self,
        rider_id: Uuid,
        rider_phone: &str,
        payer_email: &str,
        amount: i64,
    ) -> Result<Topup> {
        let topup_id = Uuid::new_v4();
        let now = Utc::now();

        sqlx::query(
            r#"
            INSERT INTO topups (id, rider_id, rider_phone, amount, status, created_at, updated_at)
            VALUES ($1, $2, $3, $4, 'pending', $5, $5)
            "#,
        )
        .bind(topup_id)
        .bind(rider_id)
        .bind(rider_phone)
        .bind(amount)
        .bind(now)
        .execute(&self.db_pool)
        .await
        .context("Failed to record top-up")?;

        let reference = ExternalReference {
            user_id: rider_id,
            topup_record_id: topup_id,
        };

        let preference = match self
            .checkout
            .create_preference(payer_email, amount, &reference, &topup_id.to_string())
            .await
        {
            Ok(preference) => preference,
            Err(e) => {
                sqlx::query("UPDATE topups SET status = 'failure', updated_at = $2 WHERE id = $1")
                    .bind(topup_id)
                    .bind(Utc::now())
                    .execute(&self.db_pool)
                    .await
                    .context("Failed to close unfunded top-up")?;
                return Err(e).context("Failed to create checkout preference");
            }
        };

        let topup = sqlx::query_as::<_, Topup>(
            "UPDATE topups SET checkout_url = $2, updated_at = $3 WHERE id = $1 RETURNING *",
        )
        .bind(topup_id)
        .bind(&preference.init_point)
        .bind(Utc::now())
        .fetch_one(&self.db_pool)
        .await
        .context("Failed to attach checkout link to top-up")?;

        tracing::info!(topup_id = %topup_id, amount, "Top-up created with checkout link");

        Ok(topup)
    }

    /// Credit an approved payment. The pending->approved flip and the balance
    /// credit commit together; a replayed callback finds nothing pending and
    /// credits nothing.
    pub async fn settle_approved(
        &self,
        topup_id: Uuid,
        rider_id: Uuid,
        payment_id: Option<&str>,
    ) -> Result<Settlement> {
        let mut tx = self
            .db_pool
            .begin()
            .await
            .context("Failed to open settlement transaction")?;

        let settled = sqlx::query_as::<_, Topup>(
            r#"
            UPDATE topups
            SET status = 'approved', payment_id = COALESCE($3, payment_id), updated_at = $4
            WHERE id = $1 AND rider_id = $2 AND status = 'pending'
            RETURNING *
            "#,
        )
        .bind(topup_id)
        .bind(rider_id)
        .bind(payment_id)
        .bind(Utc::now())
        .fetch_optional(&mut *tx)
        .await
        .context("Failed to settle top-up")?;

        let Some(topup) = settled else {
            tx.rollback().await.ok();
            let known = self.get_topup(topup_id).await?;
            return Ok(match known {
                Some(_) => Settlement::AlreadySettled,
                None => Settlement::NotFound,
            });
        };

        let new_balance = apply_balance_delta(
            &mut tx,
            rider_id,
            LedgerKind::Credit,
            topup.amount,
            "Recarga de saldo",
            None,
            Some(topup.id),
        )
        .await?;

        tx.commit()
            .await
            .context("Failed to commit settlement transaction")?;

        tracing::info!(
            topup_id = %topup_id,
            amount = topup.amount,
            new_balance,
            "Top-up credited"
        );

        Ok(Settlement::Credited { topup, new_balance })
    }

    /// Close a pending top-up after a failed payment. Settled records are
    /// left alone.
    pub async fn mark_failed(&self, topup_id: Uuid, rider_id: Uuid) -> Result<Option<Topup>> {
        sqlx::query_as::<_, Topup>(
            r#"
            UPDATE topups
            SET status = 'failure', updated_at = $3
            WHERE id = $1 AND rider_id = $2 AND status = 'pending'
            RETURNING *
            "#,
        )
        .bind(topup_id)
        .bind(rider_id)
        .bind(Utc::now())
        .fetch_optional(&self.db_pool)
        .await
        .context("Failed to mark top-up as failed")
    }

    /// Rider-initiated cancellation from chat.
    pub async fn cancel_pending(&self, topup_id: Uuid, rider_phone: &str) -> Result<bool> {
        let cancelled = sqlx::query(
            r#"
            UPDATE topups
            SET status = 'canceled', updated_at = $3
            WHERE id = $1 AND rider_phone = $2 AND status = 'pending'
            "#,
        )
        .bind(topup_id)
        .bind(rider_phone)
        .bind(Utc::now())
        .execute(&self.db_pool)
        .await
        .context("Failed to cancel top-up")?;

        Ok(cancelled.rows_affected() > 0)
    }

    pub async fn get_topup(&self, topup_id: Uuid) -> Result<Option<Topup>> {
        sqlx::query_as::<_, Topup>("SELECT * FROM topups WHERE id = $1")
            .bind(topup_id)
            .fetch_optional(&self.db_pool)
            .await
            .context("Failed to fetch top-up")
    }
}
