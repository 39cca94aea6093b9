use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Serialize, Deserialize, sqlx::Type, Clone, Copy, PartialEq, Eq)]
#[sqlx(type_name = "topup_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum TopupStatus {
    Pending,
    Approved,
    Failure,
    Canceled,
}

/// One balance top-up attempt. The status is the idempotency guard: only a
/// `pending` record can ever be credited, exactly once.
#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, Clone)]
pub struct Topup {
    pub id: Uuid,
    pub rider_id: Uuid,
    pub rider_phone: String,
    pub amount: i64,
    pub status: TopupStatus,
    pub checkout_url: Option<String>,
    pub payment_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug)]
pub enum Settlement {
    Credited { topup: Topup, new_balance: i64 },
    AlreadySettled,
    NotFound,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_topup_status_serialization() {
        assert_eq!(
            serde_json::to_string(&TopupStatus::Pending).unwrap(),
            "\"pending\""
        );
        assert_eq!(
            serde_json::to_string(&TopupStatus::Approved).unwrap(),
            "\"approved\""
        );
        assert_eq!(
            serde_json::to_string(&TopupStatus::Canceled).unwrap(),
            "\"canceled\""
        );
    }
}
