use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Serialize, Deserialize, sqlx::Type, Clone, Copy, PartialEq, Eq)]
#[sqlx(type_name = "ride_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum RideStatus {
    Started,
    Finished,
}

#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, Clone)]
pub struct Ride {
    pub id: Uuid,
    pub rider_id: Uuid,
    pub rider_phone: String,
    pub bike_id: String,
    pub device_id: String,
    pub status: RideStatus,
    pub started_at: DateTime<Utc>,
    pub start_lat: f64,
    pub start_lon: f64,
    pub ended_at: Option<DateTime<Utc>>,
    pub end_lat: Option<f64>,
    pub end_lon: Option<f64>,
    pub duration_minutes: Option<i64>,
    pub total_cost: Option<i64>,
}

#[derive(Debug)]
pub enum RideStart {
    Started(Ride),
    BikeUnavailable,
    RiderAlreadyRiding,
}

#[derive(Debug, Clone)]
pub struct RideReceipt {
    pub ride: Ride,
    pub duration_minutes: i64,
    pub total_cost: i64,
    pub new_balance: i64,
}

#[derive(Debug)]
pub enum FinalizeOutcome {
    Finalized(RideReceipt),
    AlreadyFinalized,
    NotFound,
}

/// Billable whole minutes for an elapsed ride time. Partial minutes round
/// up and every ride bills at least one minute.
pub fn billed_minutes(elapsed: Duration) -> i64 {
    let secs = elapsed.num_seconds().max(0);
    ((secs + 59) / 60).max(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_billed_minutes_rounds_up() {
        assert_eq!(billed_minutes(Duration::seconds(61)), 2);
        assert_eq!(billed_minutes(Duration::seconds(119)), 2);
        assert_eq!(billed_minutes(Duration::seconds(121)), 3);
        assert_eq!(billed_minutes(Duration::seconds(1800)), 30);
    }

    #[test]
    fn test_billed_minutes_minimum_is_one() {
        assert_eq!(billed_minutes(Duration::seconds(0)), 1);
        assert_eq!(billed_minutes(Duration::seconds(1)), 1);
        assert_eq!(billed_minutes(Duration::seconds(60)), 1);
    }

    #[test]
    fn test_billed_minutes_clamps_clock_skew() {
        assert_eq!(billed_minutes(Duration::seconds(-30)), 1);
    }

    #[test]
    fn test_ride_status_serialization() {
        assert_eq!(
            serde_json::to_string(&RideStatus::Started).unwrap(),
            "\"started\""
        );
        assert_eq!(
            serde_json::to_string(&RideStatus::Finished).unwrap(),
            "\"finished\""
        );
    }
}
