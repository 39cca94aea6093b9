use anyhow::{bail, Context, Result};
use reqwest::Client;
use std::time::Duration;

use super::model::{
    BackUrls, ExternalReference, PreferenceItem, PreferencePayer, PreferenceRequest,
    PreferenceResponse,
};

pub struct CheckoutClient {
    http: Client,
    api_url: String,
    access_token: String,
    public_base_url: String,
}

impl CheckoutClient {
    pub fn new(api_url: String, access_token: String, public_base_url: String) -> Self {
        let http = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            http,
            api_url,
            access_token,
            public_base_url,
        }
    }

    /// Create a hosted checkout preference for one top-up. The provider
    /// redirects the payer to our callback with the reference echoed back.
    pub async fn create_preference(
        &self,
        payer_email: &str,
        amount: i64,
        reference: &ExternalReference,
        idempotency_key: &str,
    ) -> Result<PreferenceResponse> {
        let callback_url = format!("{}/payments/callback", self.public_base_url);

        let request = PreferenceRequest {
            items: vec![PreferenceItem {
                title: "Recarga de saldo Rodada".to_string(),
                quantity: 1,
                unit_price: amount,
                currency_id: "ARS".to_string(),
            }],
            payer: PreferencePayer {
                email: payer_email.to_string(),
            },
            external_reference: reference.encode()?,
            back_urls: BackUrls {
                success: callback_url.clone(),
                failure: callback_url.clone(),
                pending: callback_url,
            },
            auto_return: "approved".to_string(),
        };

        let response = self
            .http
            .post(format!("{}/checkout/preferences", self.api_url))
            .bearer_auth(&self.access_token)
            .header("X-Idempotency-Key", idempotency_key)
            .json(&request)
            .send()
            .await
            .context("Checkout provider unreachable")?;

        if !response.status().is_success() {
            bail!("Checkout provider returned HTTP {}", response.status());
        }

        response
            .json::<PreferenceResponse>()
            .await
            .context("Checkout provider reply was not valid JSON")
    }
}
