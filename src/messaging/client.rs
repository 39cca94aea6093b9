use anyhow::{bail, Context, Result};
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Deserialize)]
struct MessageResource {
    sid: String,
}

pub struct WhatsAppClient {
    http: Client,
    api_url: String,
    account_sid: String,
    auth_token: String,
    from: String,
}

impl WhatsAppClient {
    pub fn new(api_url: String, account_sid: String, auth_token: String, from: String) -> Self {
        let http = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            http,
            api_url,
            account_sid,
            auth_token,
            from,
        }
    }

    pub async fn send_message(&self, to: &str, body: &str) -> Result<String> {
        let url = format!(
            "{}/2010-04-01/Accounts/{}/Messages.json",
            self.api_url, self.account_sid
        );

        let params = [("From", self.from.as_str()), ("To", to), ("Body", body)];

        let response = self
            .http
            .post(&url)
            .basic_auth(&self.account_sid, Some(&self.auth_token))
            .form(&params)
            .send()
            .await
            .context("Messaging provider unreachable")?;

        if !response.status().is_success() {
            bail!("Messaging provider returned HTTP {}", response.status());
        }

        let sent: MessageResource = response
            .json()
            .await
            .context("Messaging provider reply was not valid JSON")?;

        Ok(sent.sid)
    }

    /// Fire-and-forget delivery. State transitions must not hinge on the
    /// provider, so failures are logged and swallowed.
    pub async fn notify(&self, to: &str, body: &str) {
        if let Err(e) = self.send_message(to, body).await {
            tracing::warn!(recipient = %to, "Failed to deliver WhatsApp message: {:#}", e);
        }
    }
}
