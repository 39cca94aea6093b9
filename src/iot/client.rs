use anyhow::{anyhow, bail, Context, Result};
use chrono::Utc;
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;

use super::credentials::IotCredentialState;
use super::protocol::{
    self, InstructionReply, LockState, TokenGrant, TokenReply, UnlockReply,
    METHOD_INSTRUCTION_SEND, METHOD_TOKEN_GET, METHOD_TOKEN_REFRESH, STATUS_INSTRUCTION_ID,
    STATUS_INSTRUCTION_TEMPLATE, UNLOCK_INSTRUCTION_ID, UNLOCK_INSTRUCTION_TEMPLATE,
};

/// What an unlock attempt established about the bolt. Transport problems
/// surface as `Err` and leave the bolt state unasserted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnlockOutcome {
    Confirmed,
    NotConfirmed,
}

pub struct IotClient {
    http: Client,
    api_url: String,
    app_key: String,
    app_secret: String,
    account: String,
    password: String,
    credentials: IotCredentialState,
}

impl IotClient {
    pub fn new(
        api_url: String,
        app_key: String,
        app_secret: String,
        account: String,
        password: String,
        request_timeout_secs: u64,
    ) -> Self {
        let http = Client::builder()
            .timeout(Duration::from_secs(request_timeout_secs))
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            http,
            api_url,
            app_key,
            app_secret,
            account,
            password,
            credentials: IotCredentialState::new(),
        }
    }

    /// Send the OPEN instruction to a lock and report whether the lock
    /// confirmed the bolt actually moved.
    pub async fn unlock(&self, device_id: &str) -> Result<UnlockOutcome> {
        let reply = self
            .send_instruction(
                device_id,
                UNLOCK_INSTRUCTION_ID,
                UNLOCK_INSTRUCTION_TEMPLATE,
                true,
            )
            .await?;

        match protocol::parse_unlock_reply(&reply) {
            UnlockReply::Confirmed => Ok(UnlockOutcome::Confirmed),
            UnlockReply::AlreadyUnlocked => {
                tracing::warn!(
                    device_id = %device_id,
                    "Lock reports it is already open, not confirming the unlock"
                );
                Ok(UnlockOutcome::NotConfirmed)
            }
            UnlockReply::NotConfirmed => {
                tracing::warn!(
                    device_id = %device_id,
                    code = reply.code,
                    result = reply.result.as_deref().unwrap_or(""),
                    "Lock did not confirm the unlock"
                );
                Ok(UnlockOutcome::NotConfirmed)
            }
        }
    }

    /// Ask a lock for its bolt position. Every failure mode collapses to
    /// `Unknown` so callers never mistake silence for a locked bike.
    pub async fn query_lock_state(&self, device_id: &str) -> LockState {
        match self
            .send_instruction(
                device_id,
                STATUS_INSTRUCTION_ID,
                STATUS_INSTRUCTION_TEMPLATE,
                false,
            )
            .await
        {
            Ok(reply) => protocol::parse_lock_state(&reply),
            Err(e) => {
                tracing::warn!(device_id = %device_id, "Status query failed: {:#}", e);
                LockState::Unknown
            }
        }
    }

    /// Refresh the cached vendor token, falling back to a cold fetch when
    /// the refresh grant is rejected or no token is cached yet.
    pub async fn refresh_credentials(&self) -> Result<()> {
        let refreshed = match self.credentials.current().await {
            Some(grant) => match self.refresh_grant(&grant).await {
                Ok(fresh) => fresh,
                Err(e) => {
                    tracing::warn!("Vendor token refresh rejected, fetching anew: {:#}", e);
                    self.fetch_token().await?
                }
            },
            None => self.fetch_token().await?,
        };

        self.credentials.replace(refreshed).await;
        tracing::debug!("Vendor credentials refreshed");
        Ok(())
    }

    pub async fn run_refresh_loop(self: Arc<Self>, interval_secs: u64) {
        loop {
            tokio::time::sleep(Duration::from_secs(interval_secs)).await;
            if let Err(e) = self.refresh_credentials().await {
                tracing::error!("Vendor credential refresh failed: {:#}", e);
            }
        }
    }

    async fn ensure_token(&self) -> Result<TokenGrant> {
        if let Some(grant) = self.credentials.current().await {
            return Ok(grant);
        }

        let grant = self.fetch_token().await?;
        self.credentials.replace(grant.clone()).await;
        Ok(grant)
    }

    async fn fetch_token(&self) -> Result<TokenGrant> {
        let mut params = protocol::common_params(METHOD_TOKEN_GET, &self.app_key, Utc::now());
        params.push(("user_id".to_string(), self.account.clone()));
        params.push((
            "user_pwd_md5".to_string(),
            protocol::md5_hex_lower(&self.password),
        ));
        params.push(("expires_in".to_string(), "7200".to_string()));

        let reply: TokenReply = self
            .post_form(params)
            .await
            .context("Vendor token request failed")?;

        if reply.code != 0 {
            bail!(
                "Vendor rejected the token request: code {} {}",
                reply.code,
                reply.message.unwrap_or_default()
            );
        }

        reply
            .result
            .ok_or_else(|| anyhow!("Vendor token reply carried no grant"))
    }

    async fn refresh_grant(&self, grant: &TokenGrant) -> Result<TokenGrant> {
        let mut params = protocol::common_params(METHOD_TOKEN_REFRESH, &self.app_key, Utc::now());
        params.push(("access_token".to_string(), grant.access_token.clone()));
        params.push(("refresh_token".to_string(), grant.refresh_token.clone()));
        params.push(("expires_in".to_string(), "7200".to_string()));

        let reply: TokenReply = self
            .post_form(params)
            .await
            .context("Vendor token refresh failed")?;

        if reply.code != 0 {
            bail!(
                "Vendor rejected the token refresh: code {} {}",
                reply.code,
                reply.message.unwrap_or_default()
            );
        }

        reply
            .result
            .ok_or_else(|| anyhow!("Vendor refresh reply carried no grant"))
    }

    async fn send_instruction(
        &self,
        device_id: &str,
        instruction_id: &str,
        template: &str,
        is_cover: bool,
    ) -> Result<InstructionReply> {
        let grant = self.ensure_token().await?;

        let mut params =
            protocol::common_params(METHOD_INSTRUCTION_SEND, &self.app_key, Utc::now());
        params.push(("access_token".to_string(), grant.access_token));
        params.push(("imei".to_string(), device_id.to_string()));
        params.push(("inst_id".to_string(), instruction_id.to_string()));
        params.push(("inst_template".to_string(), template.to_string()));
        params.push(("params".to_string(), "[]".to_string()));
        params.push(("is_cover".to_string(), is_cover.to_string()));

        self.post_form(params)
            .await
            .context("Vendor instruction send failed")
    }

    async fn post_form<T: serde::de::DeserializeOwned>(
        &self,
        params: Vec<(String, String)>,
    ) -> Result<T> {
        let form = protocol::signed_form(params, &self.app_secret);

        let response = self
            .http
            .post(&self.api_url)
            .form(&form)
            .send()
            .await
            .context("Vendor API unreachable")?;

        if !response.status().is_success() {
            bail!("Vendor API returned HTTP {}", response.status());
        }

        response
            .json::<T>()
            .await
            .context("Vendor API reply was not valid JSON")
    }
}
