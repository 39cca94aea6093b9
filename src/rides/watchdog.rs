use anyhow::{Context, Result};
use sqlx::PgPool;
use std::sync::Arc;
use tokio_cron_scheduler::{Job, JobScheduler};

use super::model::{FinalizeOutcome, Ride};
use super::service::RideService;
use crate::iot::{IotClient, LockState};
use crate::tokens::TokenStore;

/// Periodic sweep that closes rides whose lock reports itself bolted again,
/// and drops expired unlock codes while at it.
pub struct RideWatchdog {
    db_pool: PgPool,
    rides: Arc<RideService>,
    iot: Arc<IotClient>,
    tokens: Arc<TokenStore>,
}

impl RideWatchdog {
    pub fn new(
        db_pool: PgPool,
        rides: Arc<RideService>,
        iot: Arc<IotClient>,
        tokens: Arc<TokenStore>,
    ) -> Self {
        Self {
            db_pool,
            rides,
            iot,
            tokens,
        }
    }

    /// One sweep. A lock that cannot be read stays untouched: `Unknown` is
    /// never grounds to bill anyone.
    pub async fn tick(&self) -> Result<()> {
        match self.tokens.purge_expired().await {
            Ok(0) => {}
            Ok(purged) => tracing::debug!(purged, "Dropped expired unlock codes"),
            Err(e) => tracing::warn!("Expired code purge failed: {:#}", e),
        }

        let active = sqlx::query_as::<_, Ride>("SELECT * FROM rides WHERE status = 'started'")
            .fetch_all(&self.db_pool)
            .await
            .context("Failed to list started rides")?;

        if active.is_empty() {
            return Ok(());
        }

        tracing::debug!(count = active.len(), "Polling lock state of open rides");

        for ride in active {
            match self.iot.query_lock_state(&ride.device_id).await {
                LockState::Locked => match self.rides.finalize_ride(ride.id).await {
                    Ok(FinalizeOutcome::Finalized(receipt)) => {
                        tracing::info!(
                            ride_id = %ride.id,
                            total_cost = receipt.total_cost,
                            "Ride closed by watchdog"
                        );
                    }
                    Ok(_) => {
                        tracing::debug!(ride_id = %ride.id, "Ride was already closed");
                    }
                    Err(e) => {
                        tracing::error!(ride_id = %ride.id, "Failed to close ride: {:#}", e);
                    }
                },
                LockState::Unlocked => {}
                LockState::Unknown => {
                    tracing::warn!(
                        ride_id = %ride.id,
                        device_id = %ride.device_id,
                        "Lock state unknown, leaving ride open"
                    );
                }
            }
        }

        Ok(())
    }

    /// Register the sweep on a cron scheduler. The returned handle must be
    /// kept alive for the jobs to keep firing.
    pub async fn start(self: Arc<Self>, schedule: &str) -> Result<JobScheduler> {
        let scheduler = JobScheduler::new()
            .await
            .context("Failed to create watchdog scheduler")?;

        let watchdog = self;
        let job = Job::new_async(schedule, move |_id, _scheduler| {
            let watchdog = watchdog.clone();
            Box::pin(async move {
                if let Err(e) = watchdog.tick().await {
                    tracing::error!("Watchdog sweep failed: {:#}", e);
                }
            })
        })
        .context("Invalid watchdog schedule")?;

        scheduler
            .add(job)
            .await
            .context("Failed to register watchdog job")?;
        scheduler
            .start()
            .await
            .context("Failed to start watchdog scheduler")?;

        tracing::info!("Ride watchdog started");

        Ok(scheduler)
    }
}
