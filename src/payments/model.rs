use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Serialize)]
pub struct PreferenceRequest {
    pub items: Vec<PreferenceItem>,
    pub payer: PreferencePayer,
    pub external_reference: String,
    pub back_urls: BackUrls,
    pub auto_return: String,
}

#[derive(Debug, Serialize)]
pub struct PreferenceItem {
    pub title: String,
    pub quantity: u32,
    pub unit_price: i64,
    pub currency_id: String,
}

#[derive(Debug, Serialize)]
pub struct PreferencePayer {
    pub email: String,
}

#[derive(Debug, Serialize)]
pub struct BackUrls {
    pub success: String,
    pub failure: String,
    pub pending: String,
}

#[derive(Debug, Deserialize)]
pub struct PreferenceResponse {
    pub id: String,
    /// Hosted checkout URL the rider opens to pay.
    pub init_point: String,
}

/// Query parameters the provider appends when redirecting back to us.
#[derive(Debug, Deserialize)]
pub struct CallbackParams {
    pub payment_id: Option<String>,
    pub status: String,
    pub external_reference: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentStatus {
    Approved,
    Failure,
    Pending,
}

impl PaymentStatus {
    pub fn from_param(raw: &str) -> Option<Self> {
        match raw.to_lowercase().as_str() {
            "approved" => Some(PaymentStatus::Approved),
            "failure" => Some(PaymentStatus::Failure),
            "pending" => Some(PaymentStatus::Pending),
            _ => None,
        }
    }
}

/// Correlation payload round-tripped through the provider as a JSON string.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ExternalReference {
    pub user_id: Uuid,
    pub topup_record_id: Uuid,
}

impl ExternalReference {
    pub fn encode(&self) -> Result<String> {
        serde_json::to_string(self).context("Failed to encode external reference")
    }

    pub fn decode(raw: &str) -> Result<Self> {
        serde_json::from_str(raw).context("Failed to decode external reference")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_external_reference_round_trip() {
        let reference = ExternalReference {
            user_id: Uuid::new_v4(),
            topup_record_id: Uuid::new_v4(),
        };

        let encoded = reference.encode().unwrap();
        assert!(encoded.contains("\"userId\""));
        assert!(encoded.contains("\"topupRecordId\""));

        let decoded = ExternalReference::decode(&encoded).unwrap();
        assert_eq!(decoded, reference);
    }

    #[test]
    fn test_external_reference_rejects_garbage() {
        assert!(ExternalReference::decode("not json").is_err());
        assert!(ExternalReference::decode("{}").is_err());
    }

    #[test]
    fn test_payment_status_parsing() {
        assert_eq!(
            PaymentStatus::from_param("approved"),
            Some(PaymentStatus::Approved)
        );
        assert_eq!(
            PaymentStatus::from_param("APPROVED"),
            Some(PaymentStatus::Approved)
        );
        assert_eq!(
            PaymentStatus::from_param("failure"),
            Some(PaymentStatus::Failure)
        );
        assert_eq!(
            PaymentStatus::from_param("pending"),
            Some(PaymentStatus::Pending)
        );
        assert_eq!(PaymentStatus::from_param("rejected"), None);
    }
}
