//! Chat-completion clients used by ticket triage.

pub mod gemini;

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

use crate::core::config::{AiConfig, AiProviderKind};

pub use gemini::GeminiClient;

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("provider returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("unexpected response shape: {0}")]
    Malformed(String),
}

#[async_trait]
pub trait LLMProvider: Send + Sync {
    /// Single completion for `prompt` under the `system` instruction.
    async fn generate(&self, system: &str, prompt: &str) -> Result<String, LlmError>;

    fn name(&self) -> &str;
}

/// Reads the body of a non-2xx response into an [`LlmError::Status`].
pub(crate) async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, LlmError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let mut body = response.text().await.unwrap_or_default();
    if body.len() > 512 {
        let cut = (0..=512).rev().find(|i| body.is_char_boundary(*i)).unwrap_or(0);
        body.truncate(cut);
    }
    Err(LlmError::Status {
        status: status.as_u16(),
        body,
    })
}

pub(crate) fn http_client(timeout_seconds: u64) -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_seconds.max(1)))
        .build()
        .unwrap_or_else(|e| {
            warn!("Failed to build HTTP client with timeout, using defaults: {e}");
            reqwest::Client::new()
        })
}

pub struct OpenAIClient {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl OpenAIClient {
    pub fn new(api_key: String, base_url: Option<String>, model: String, timeout_seconds: u64) -> Self {
        Self {
            client: http_client(timeout_seconds),
            api_key,
            base_url: base_url
                .unwrap_or_else(|| "https://api.openai.com".to_string())
                .trim_end_matches('/')
                .to_string(),
            model,
        }
    }
}

#[async_trait]
impl LLMProvider for OpenAIClient {
    async fn generate(&self, system: &str, prompt: &str) -> Result<String, LlmError> {
        let response = self
            .client
            .post(format!("{}/v1/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&serde_json::json!({
                "model": self.model,
                "messages": [
                    {"role": "system", "content": system},
                    {"role": "user", "content": prompt}
                ],
                "temperature": 0.2
            }))
            .send()
            .await?;

        let result: Value = check_status(response).await?.json().await?;
        result["choices"][0]["message"]["content"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| LlmError::Malformed("missing choices[0].message.content".into()))
    }

    fn name(&self) -> &str {
        "openai"
    }
}

/// Provider for the configured backend, or `None` when no API key is set.
pub fn create_provider(config: &AiConfig) -> Option<Arc<dyn LLMProvider>> {
    let Some(api_key) = config.api_key.clone() else {
        warn!("No API key configured for {:?}, triage will use the keyword fallback", config.provider);
        return None;
    };

    info!("Using {:?} model {} for triage", config.provider, config.model);
    let provider: Arc<dyn LLMProvider> = match config.provider {
        AiProviderKind::Gemini => Arc::new(GeminiClient::new(
            api_key,
            Some(config.base_url.clone()),
            config.model.clone(),
            config.timeout_seconds,
        )),
        AiProviderKind::OpenAi => Arc::new(OpenAIClient::new(
            api_key,
            Some(config.base_url.clone()),
            config.model.clone(),
            config.timeout_seconds,
        )),
    };
    Some(provider)
}
