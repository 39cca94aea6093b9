//! Support-mode assistant. Free-text questions go to a chat completion
//! API; without a key, or on any upstream problem, the rider gets a canned
//! reply instead of silence.

use anyhow::{anyhow, bail, Context, Result};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const FALLBACK_REPLY: &str =
    "Perdón, ahora mismo no puedo responder eso. Escribí *menu* para volver al menú principal.";

/// Replies travel as a single WhatsApp message.
const MAX_REPLY_TOKENS: u32 = 300;

const SYSTEM_PROMPT: &str = "Sos el asistente de soporte de Rodada, un servicio de alquiler de \
bicicletas por WhatsApp en Argentina. Respondé en español, corto y amable. Si la consulta es \
sobre cobros o desbloqueos fallidos, pedile al usuario que escriba *menu* y use la opción de \
reportar un problema.";

#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: Vec<CompletionMessage<'a>>,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct CompletionMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    choices: Vec<CompletionChoice>,
}

#[derive(Debug, Deserialize)]
struct CompletionChoice {
    message: CompletionReply,
}

#[derive(Debug, Deserialize)]
struct CompletionReply {
    content: String,
}

pub struct AssistantClient {
    http: Client,
    api_url: String,
    api_key: Option<String>,
    model: String,
}

impl AssistantClient {
    pub fn new(api_url: String, api_key: Option<String>, model: String) -> Self {
        let http = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            http,
            api_url,
            api_key,
            model,
        }
    }

    /// Always returns something to say.
    pub async fn reply_to(&self, user_text: &str) -> String {
        let Some(api_key) = &self.api_key else {
            return FALLBACK_REPLY.to_string();
        };

        match self.request_completion(api_key, user_text).await {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!("Assistant request failed: {:#}", e);
                FALLBACK_REPLY.to_string()
            }
        }
    }

    async fn request_completion(&self, api_key: &str, user_text: &str) -> Result<String> {
        let request = CompletionRequest {
            model: &self.model,
            messages: vec![
                CompletionMessage {
                    role: "system",
                    content: SYSTEM_PROMPT,
                },
                CompletionMessage {
                    role: "user",
                    content: user_text,
                },
            ],
            max_tokens: MAX_REPLY_TOKENS,
        };

        let response = self
            .http
            .post(format!("{}/v1/chat/completions", self.api_url))
            .bearer_auth(api_key)
            .json(&request)
            .send()
            .await
            .context("Assistant API unreachable")?;

        if !response.status().is_success() {
            bail!("Assistant API returned HTTP {}", response.status());
        }

        let completion: CompletionResponse = response
            .json()
            .await
            .context("Assistant API reply was not valid JSON")?;

        completion
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or_else(|| anyhow!("Assistant reply carried no choices"))
    }
}
