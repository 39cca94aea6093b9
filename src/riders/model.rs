use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A registered rider. `phone` is nullable: accounts imported from the
/// walk-up desk only get their WhatsApp number on first DNI verification.
#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, Clone)]
pub struct Rider {
    pub id: Uuid,
    pub phone: Option<String>,
    pub first_name: String,
    pub last_name: String,
    pub dni: String,
    pub email: String,
    /// Prepaid balance in ARS. Goes negative when a ride costs more than
    /// what is left; new rides are blocked until topped up.
    pub balance: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewRider {
    pub phone: String,
    pub first_name: String,
    pub last_name: String,
    pub dni: String,
    pub email: String,
}

#[derive(Debug)]
pub enum RegisterOutcome {
    Registered(Rider),
    DniTaken,
}

#[derive(Debug, Serialize, Deserialize, sqlx::Type, Clone, Copy, PartialEq, Eq)]
#[sqlx(type_name = "ledger_kind", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum LedgerKind {
    Debit,
    Credit,
}

/// One balance movement. Amounts are stored positive; `kind` carries the
/// direction.
#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, Clone)]
pub struct LedgerEntry {
    pub id: Uuid,
    pub rider_id: Uuid,
    pub kind: LedgerKind,
    pub amount: i64,
    pub concept: String,
    pub ride_id: Option<Uuid>,
    pub topup_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}
