use anyhow::{Context, Result};
use chrono::Utc;
use sqlx::PgPool;
use std::sync::Arc;
use uuid::Uuid;

use super::model::{billed_minutes, FinalizeOutcome, Ride, RideReceipt, RideStart, RideStatus};
use crate::chat::SessionStore;
use crate::messaging::WhatsAppClient;
use crate::registry::FarePlan;
use crate::riders::{apply_balance_delta, LedgerKind, Rider};
use crate::tokens::UnlockToken;

pub struct RideService {
    db_pool: PgPool,
    sessions: SessionStore,
    messaging: Arc<WhatsAppClient>,
}

impl RideService {
    pub fn new(db_pool: PgPool, sessions: SessionStore, messaging: Arc<WhatsAppClient>) -> Self {
        Self {
            db_pool,
            sessions,
            messaging,
        }
    }

    /// Open a ride for a redeemed token. The bike is claimed with a
    /// check-and-set on the reserved flag, so concurrent redeems for the
    /// same bike leave exactly one ride.
    pub async fn start_ride(&self, token: &UnlockToken, rider: &Rider) -> Result<RideStart> {
        let mut tx = self
            .db_pool
            .begin()
            .await
            .context("Failed to open ride start transaction")?;

        let (riding,): (bool,) = sqlx::query_as(
            "SELECT EXISTS(SELECT 1 FROM rides WHERE rider_id = $1 AND status = 'started')",
        )
        .bind(rider.id)
        .fetch_one(&mut *tx)
        .await
        .context("Failed to check for an open ride")?;

        if riding {
            tx.rollback().await.ok();
            return Ok(RideStart::RiderAlreadyRiding);
        }

        let claimed: Option<(f64, f64)> = sqlx::query_as(
            r#"
            UPDATE bikes
            SET is_reserved = TRUE
            WHERE bike_id = $1 AND NOT is_reserved AND NOT is_disabled
            RETURNING lat, lon
            "#,
        )
        .bind(&token.bike_id)
        .fetch_optional(&mut *tx)
        .await
        .context("Failed to claim bike")?;

        let Some((lat, lon)) = claimed else {
            tx.rollback().await.ok();
            return Ok(RideStart::BikeUnavailable);
        };

        let ride = sqlx::query_as::<_, Ride>(
            r#"
            INSERT INTO rides (id, rider_id, rider_phone, bike_id, device_id, status, started_at, start_lat, start_lon)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(rider.id)
        .bind(&token.rider_phone)
        .bind(&token.bike_id)
        .bind(&token.device_id)
        .bind(RideStatus::Started)
        .bind(Utc::now())
        .bind(lat)
        .bind(lon)
        .fetch_one(&mut *tx)
        .await
        .context("Failed to record ride")?;

        tx.commit()
            .await
            .context("Failed to commit ride start transaction")?;

        tracing::info!(ride_id = %ride.id, bike_id = %ride.bike_id, "Ride started");

        Ok(RideStart::Started(ride))
    }

    /// Close a ride: flip it to finished, bill the fare, release the bike
    /// and debit the rider, all in one transaction. The status-guarded flip
    /// makes concurrent closers settle the fare exactly once.
    pub async fn finalize_ride(&self, ride_id: Uuid) -> Result<FinalizeOutcome> {
        let ended_at = Utc::now();

        let mut tx = self
            .db_pool
            .begin()
            .await
            .context("Failed to open ride finalize transaction")?;

        let closed = sqlx::query_as::<_, Ride>(
            r#"
            UPDATE rides
            SET status = 'finished', ended_at = $2
            WHERE id = $1 AND status = 'started'
            RETURNING *
            "#,
        )
        .bind(ride_id)
        .bind(ended_at)
        .fetch_optional(&mut *tx)
        .await
        .context("Failed to close ride")?;

        let Some(ride) = closed else {
            tx.rollback().await.ok();
            let (known,): (bool,) =
                sqlx::query_as("SELECT EXISTS(SELECT 1 FROM rides WHERE id = $1)")
                    .bind(ride_id)
                    .fetch_one(&self.db_pool)
                    .await
                    .context("Failed to check ride existence")?;
            return Ok(if known {
                FinalizeOutcome::AlreadyFinalized
            } else {
                FinalizeOutcome::NotFound
            });
        };

        let plan = sqlx::query_as::<_, FarePlan>(
            "SELECT * FROM fare_plans WHERE active = TRUE ORDER BY id LIMIT 1",
        )
        .fetch_optional(&mut *tx)
        .await
        .context("Failed to fetch fare plan")?
        .context("No active fare plan")?;

        let duration = billed_minutes(ended_at - ride.started_at);
        let cost = plan.cost_for(duration);

        let end_position: Option<(f64, f64)> =
            sqlx::query_as("SELECT lat, lon FROM bikes WHERE bike_id = $1")
                .bind(&ride.bike_id)
                .fetch_optional(&mut *tx)
                .await
                .context("Failed to fetch bike position")?;
        let (end_lat, end_lon) = end_position.unwrap_or((ride.start_lat, ride.start_lon));

        sqlx::query("UPDATE bikes SET is_reserved = FALSE WHERE bike_id = $1")
            .bind(&ride.bike_id)
            .execute(&mut *tx)
            .await
            .context("Failed to release bike")?;

        let ride = sqlx::query_as::<_, Ride>(
            r#"
            UPDATE rides
            SET end_lat = $2, end_lon = $3, duration_minutes = $4, total_cost = $5
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(ride.id)
        .bind(end_lat)
        .bind(end_lon)
        .bind(duration)
        .bind(cost)
        .fetch_one(&mut *tx)
        .await
        .context("Failed to record fare")?;

        let new_balance = apply_balance_delta(
            &mut tx,
            ride.rider_id,
            LedgerKind::Debit,
            cost,
            &format!("Viaje en {}", ride.bike_id),
            Some(ride.id),
            None,
        )
        .await?;

        tx.commit()
            .await
            .context("Failed to commit ride finalize transaction")?;

        tracing::info!(
            ride_id = %ride.id,
            duration_minutes = duration,
            total_cost = cost,
            new_balance,
            "Ride finalized"
        );

        let receipt = RideReceipt {
            duration_minutes: duration,
            total_cost: cost,
            new_balance,
            ride,
        };

        // Post-settlement niceties. Neither may undo the settlement.
        let summary = format!(
            "🚲 Viaje finalizado.\nDuración: {} min\nCosto: ${}\nSaldo restante: ${}",
            receipt.duration_minutes, receipt.total_cost, receipt.new_balance
        );
        self.messaging.notify(&receipt.ride.rider_phone, &summary).await;

        if let Err(e) = self.sessions.reset(&receipt.ride.rider_phone).await {
            tracing::warn!(
                rider_phone = %receipt.ride.rider_phone,
                "Failed to reset chat session after ride: {:#}",
                e
            );
        }

        Ok(FinalizeOutcome::Finalized(receipt))
    }
}
