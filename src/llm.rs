//! Language-model collaborator interface and the Ollama-backed client.
//!
//! The pipeline never talks to the model service directly — everything goes
//! through the [`LanguageModel`] trait so resolvers can be tested against
//! scripted implementations. Every request carries a bounded timeout; a
//! timed-out call surfaces as [`LlmError::Timeout`] and is treated by the
//! callers as a resolver failure, never retried at this layer.

use anyhow::Result;
use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

use crate::config::LlmConfig;

/// Errors crossing the language-model collaborator boundary.
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("language model request timed out after {0}s")]
    Timeout(u64),
    #[error("language model service error: {0}")]
    Service(String),
}

/// A text-completion collaborator.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Complete a prompt and return the raw response text.
    async fn complete(&self, prompt: &str) -> Result<String, LlmError>;
}

/// Client for a local Ollama instance.
///
/// Uses the non-streaming `POST /api/generate` endpoint. The request
/// timeout comes from `[llm].timeout_secs`.
pub struct OllamaClient {
    base_url: String,
    model: String,
    timeout_secs: u64,
    client: reqwest::Client,
}

impl OllamaClient {
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            timeout_secs: config.timeout_secs,
            client,
        })
    }

    /// Quick availability probe against `GET /api/tags` (5s timeout).
    pub async fn is_running(&self) -> bool {
        let url = format!("{}/api/tags", self.base_url);
        let resp = self
            .client
            .get(&url)
            .timeout(Duration::from_secs(5))
            .send()
            .await;
        matches!(resp, Ok(r) if r.status().is_success())
    }

    fn map_transport_error(&self, e: reqwest::Error) -> LlmError {
        if e.is_timeout() {
            LlmError::Timeout(self.timeout_secs)
        } else {
            LlmError::Service(e.to_string())
        }
    }
}

#[async_trait]
impl LanguageModel for OllamaClient {
    async fn complete(&self, prompt: &str) -> Result<String, LlmError> {
        let url = format!("{}/api/generate", self.base_url);
        let body = serde_json::json!({
            "model": self.model,
            "prompt": prompt,
            "stream": false,
        });

        let resp = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| self.map_transport_error(e))?;

        let status = resp.status();
        if !status.is_success() {
            let detail = resp.text().await.unwrap_or_default();
            return Err(LlmError::Service(format!(
                "ollama API error {}: {}",
                status, detail
            )));
        }

        let json: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| self.map_transport_error(e))?;

        json.get("response")
            .and_then(|r| r.as_str())
            .map(|s| s.to_string())
            .ok_or_else(|| LlmError::Service("invalid ollama response: missing 'response'".into()))
    }
}
