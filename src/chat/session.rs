use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::PgPool;
use uuid::Uuid;

/// Where a conversation stands. Steps that gather data carry what was
/// collected so far, so a session survives a server restart mid-flow.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "step", rename_all = "snake_case")]
pub enum SessionStep {
    MenuMain,
    AskName,
    AskLastname {
        first_name: String,
    },
    AskDni {
        first_name: String,
        last_name: String,
    },
    AskEmail {
        first_name: String,
        last_name: String,
        dni: String,
    },
    ConfirmData {
        first_name: String,
        last_name: String,
        dni: String,
        email: String,
    },
    RequestDni,
    SoporteMode,
    AskRecargaConfirm,
    AskRecargaCustom,
    AskRecarga {
        amount: i64,
    },
    AwaitPayment {
        topup_id: Uuid,
    },
    ReportIssue,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Session {
    pub rider_phone: String,
    pub step: Json<SessionStep>,
    pub selected_bike_id: Option<String>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct SessionStore {
    db_pool: PgPool,
}

impl SessionStore {
    pub fn new(db_pool: PgPool) -> Self {
        Self { db_pool }
    }

    pub async fn load(&self, rider_phone: &str) -> Result<Option<Session>> {
        sqlx::query_as::<_, Session>("SELECT * FROM chat_sessions WHERE rider_phone = $1")
            .bind(rider_phone)
            .fetch_optional(&self.db_pool)
            .await
            .context("Failed to load chat session")
    }

    /// First contact: open a session at the main menu. A concurrent create
    /// for the same phone keeps whatever step the winner stored.
    pub async fn create(&self, rider_phone: &str) -> Result<Session> {
        sqlx::query_as::<_, Session>(
            r#"
            INSERT INTO chat_sessions (rider_phone, step, selected_bike_id, updated_at)
            VALUES ($1, $2, NULL, $3)
            ON CONFLICT (rider_phone) DO UPDATE SET updated_at = EXCLUDED.updated_at
            RETURNING *
            "#,
        )
        .bind(rider_phone)
        .bind(Json(SessionStep::MenuMain))
        .bind(Utc::now())
        .fetch_one(&self.db_pool)
        .await
        .context("Failed to create chat session")
    }

    /// Move the conversation to a new step, keeping the selected bike.
    pub async fn save_step(&self, rider_phone: &str, step: &SessionStep) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO chat_sessions (rider_phone, step, selected_bike_id, updated_at)
            VALUES ($1, $2, NULL, $3)
            ON CONFLICT (rider_phone) DO UPDATE
            SET step = EXCLUDED.step, updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(rider_phone)
        .bind(Json(step))
        .bind(Utc::now())
        .execute(&self.db_pool)
        .await
        .context("Failed to save session step")?;

        Ok(())
    }

    pub async fn set_selected_bike(&self, rider_phone: &str, bike_id: Option<&str>) -> Result<()> {
        sqlx::query(
            "UPDATE chat_sessions SET selected_bike_id = $2, updated_at = $3 WHERE rider_phone = $1",
        )
        .bind(rider_phone)
        .bind(bike_id)
        .bind(Utc::now())
        .execute(&self.db_pool)
        .await
        .context("Failed to store bike selection")?;

        Ok(())
    }

    /// Back to the main menu with no bike selected. Used after a ride or a
    /// settled payment.
    pub async fn reset(&self, rider_phone: &str) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO chat_sessions (rider_phone, step, selected_bike_id, updated_at)
            VALUES ($1, $2, NULL, $3)
            ON CONFLICT (rider_phone) DO UPDATE
            SET step = EXCLUDED.step, selected_bike_id = NULL, updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(rider_phone)
        .bind(Json(SessionStep::MenuMain))
        .bind(Utc::now())
        .execute(&self.db_pool)
        .await
        .context("Failed to reset chat session")?;

        Ok(())
    }

    pub async fn delete(&self, rider_phone: &str) -> Result<()> {
        sqlx::query("DELETE FROM chat_sessions WHERE rider_phone = $1")
            .bind(rider_phone)
            .execute(&self.db_pool)
            .await
            .context("Failed to delete chat session")?;

        Ok(())
    }
}
