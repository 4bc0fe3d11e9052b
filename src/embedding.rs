//! Embedding provider abstraction and implementations.
//!
//! Defines the [`EmbeddingProvider`] trait and two backends:
//! - **[`HashEmbeddings`]** — deterministic pseudo-vectors seeded from a
//!   content hash; no network, used as the offline default and in tests.
//! - **[`OllamaEmbeddings`]** — calls the Ollama embeddings API with retry
//!   and backoff.
//!
//! Also provides [`cosine_similarity`] for scoring document vectors.
//!
//! # Provider Selection
//!
//! Use [`create_provider`] to instantiate the backend named by the
//! configuration (`embedding.provider = "hash" | "ollama"`).
//!
//! # Retry Strategy
//!
//! The Ollama provider retries transient failures with exponential backoff:
//! - HTTP 429 and 5xx → retry
//! - other HTTP 4xx → fail immediately
//! - network errors → retry
//! - Backoff: 1s, 2s, 4s, 8s, 16s, 32s (capped at 2^5)

use anyhow::{bail, Result};
use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::time::Duration;

use crate::config::EmbeddingConfig;
use crate::llm::LlmError;

/// Trait for embedding backends.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Embed a single text into a fixed-length vector.
    async fn embed(&self, text: &str) -> Result<Vec<f32>, LlmError>;
    /// Returns the model identifier (e.g. `"all-minilm"`).
    fn model_name(&self) -> &str;
    /// Returns the embedding vector dimensionality.
    fn dims(&self) -> usize;
}

/// Create the appropriate [`EmbeddingProvider`] based on configuration.
///
/// # Errors
///
/// Returns an error for unknown provider names.
pub fn create_provider(config: &EmbeddingConfig) -> Result<Box<dyn EmbeddingProvider>> {
    match config.provider.as_str() {
        "hash" => Ok(Box::new(HashEmbeddings::new(config.dims))),
        "ollama" => Ok(Box::new(OllamaEmbeddings::new(config)?)),
        other => bail!("Unknown embedding provider: {}", other),
    }
}

// ============ Hash Provider ============

/// Deterministic embedding provider with no external dependencies.
///
/// Seeds a xorshift generator from the SHA-256 of the input text and emits
/// `dims` values in `[0, 1)`. Identical texts always produce identical
/// vectors, which is all the offline similarity path needs.
pub struct HashEmbeddings {
    dims: usize,
}

impl HashEmbeddings {
    pub fn new(dims: usize) -> Self {
        Self { dims }
    }
}

#[async_trait]
impl EmbeddingProvider for HashEmbeddings {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, LlmError> {
        let digest = Sha256::digest(text.as_bytes());
        let mut state = u64::from_le_bytes(digest[..8].try_into().unwrap_or([1; 8]));
        if state == 0 {
            state = 0x9E3779B97F4A7C15;
        }

        let mut vec = Vec::with_capacity(self.dims);
        for _ in 0..self.dims {
            // xorshift64
            state ^= state << 13;
            state ^= state >> 7;
            state ^= state << 17;
            vec.push((state >> 11) as f32 / (1u64 << 53) as f32);
        }
        Ok(vec)
    }

    fn model_name(&self) -> &str {
        "hash"
    }

    fn dims(&self) -> usize {
        self.dims
    }
}

// ============ Ollama Provider ============

/// Embedding provider using the Ollama `POST /api/embeddings` endpoint.
pub struct OllamaEmbeddings {
    base_url: String,
    model: String,
    dims: usize,
    timeout_secs: u64,
    max_retries: u32,
    client: reqwest::Client,
}

impl OllamaEmbeddings {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            base_url: "http://localhost:11434".to_string(),
            model: config.model.clone(),
            dims: config.dims,
            timeout_secs: config.timeout_secs,
            max_retries: config.max_retries,
            client,
        })
    }

    /// Override the service base URL (default `http://localhost:11434`).
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }
}

#[async_trait]
impl EmbeddingProvider for OllamaEmbeddings {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, LlmError> {
        let url = format!("{}/api/embeddings", self.base_url);
        let body = serde_json::json!({
            "model": self.model,
            "prompt": text,
        });

        let mut last_err = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                // Exponential backoff: 1s, 2s, 4s, 8s, ...
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                tokio::time::sleep(delay).await;
            }

            let resp = self.client.post(&url).json(&body).send().await;

            match resp {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        let json: serde_json::Value = response
                            .json()
                            .await
                            .map_err(|e| LlmError::Service(e.to_string()))?;
                        return parse_embedding_response(&json);
                    }

                    // Rate limited or server error — retry
                    if status.as_u16() == 429 || status.is_server_error() {
                        let detail = response.text().await.unwrap_or_default();
                        last_err = Some(LlmError::Service(format!(
                            "ollama embeddings error {}: {}",
                            status, detail
                        )));
                        continue;
                    }

                    // Client error (not 429) — don't retry
                    let detail = response.text().await.unwrap_or_default();
                    return Err(LlmError::Service(format!(
                        "ollama embeddings error {}: {}",
                        status, detail
                    )));
                }
                Err(e) => {
                    last_err = Some(if e.is_timeout() {
                        LlmError::Timeout(self.timeout_secs)
                    } else {
                        LlmError::Service(e.to_string())
                    });
                    continue;
                }
            }
        }

        Err(last_err
            .unwrap_or_else(|| LlmError::Service("embedding failed after retries".into())))
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    fn dims(&self) -> usize {
        self.dims
    }
}

/// Parse the Ollama embeddings response JSON (`{ "embedding": [...] }`).
fn parse_embedding_response(json: &serde_json::Value) -> Result<Vec<f32>, LlmError> {
    let embedding = json
        .get("embedding")
        .and_then(|e| e.as_array())
        .ok_or_else(|| LlmError::Service("invalid embeddings response: missing embedding".into()))?;

    Ok(embedding
        .iter()
        .map(|v| v.as_f64().unwrap_or(0.0) as f32)
        .collect())
}

// ============ Similarity ============

/// Compute cosine similarity between two embedding vectors.
///
/// Returns a value in `[-1.0, 1.0]`, clamped to absorb floating-point
/// drift. Returns `0.0` for empty vectors or vectors of different lengths.
///
/// # Formula
///
/// ```text
///            a · b
/// cos(θ) = ─────────
///          ‖a‖ × ‖b‖
/// ```
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    // Overflowed norms would turn the division into NaN; treat them like
    // degenerate vectors.
    let denom = norm_a.sqrt() * norm_b.sqrt();
    if !denom.is_finite() || denom < f32::EPSILON {
        return 0.0;
    }

    (dot / denom).clamp(-1.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cosine_identical() {
        let v = vec![1.0, 2.0, 3.0];
        let sim = cosine_similarity(&v, &v);
        assert!((sim - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_orthogonal() {
        let a = vec![1.0, 0.0, 0.0];
        let b = vec![0.0, 1.0, 0.0];
        let sim = cosine_similarity(&a, &b);
        assert!(sim.abs() < 1e-6);
    }

    #[test]
    fn test_cosine_opposite() {
        let a = vec![1.0, 0.0];
        let b = vec![-1.0, 0.0];
        let sim = cosine_similarity(&a, &b);
        assert!((sim + 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_empty() {
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
    }

    #[test]
    fn test_cosine_different_lengths() {
        let a = vec![1.0, 2.0];
        let b = vec![1.0];
        assert_eq!(cosine_similarity(&a, &b), 0.0);
    }

    #[test]
    fn test_cosine_never_exceeds_unit() {
        // Large parallel vectors can drift past 1.0 in f32; the clamp
        // guarantees the contract.
        let a = vec![1e18, 1e18, 1e18];
        let b = vec![1e18, 1e18, 1e18];
        let sim = cosine_similarity(&a, &b);
        assert!((-1.0..=1.0).contains(&sim));
    }

    #[test]
    fn test_cosine_overflowing_norms_is_zero() {
        // Squared components past f32::MAX are indistinguishable from
        // degenerate vectors.
        let a = vec![1e30, 1e30];
        let b = vec![1e30, 1e30];
        assert_eq!(cosine_similarity(&a, &b), 0.0);
    }

    #[tokio::test]
    async fn test_hash_embeddings_deterministic() {
        let provider = HashEmbeddings::new(64);
        let a = provider.embed("itinerario de QA").await.unwrap();
        let b = provider.embed("itinerario de QA").await.unwrap();
        let c = provider.embed("otra cosa").await.unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.len(), 64);
    }

    #[tokio::test]
    async fn test_hash_embeddings_values_in_unit_interval() {
        let provider = HashEmbeddings::new(384);
        let v = provider.embed("cobertura de pruebas").await.unwrap();
        assert!(v.iter().all(|x| (0.0..1.0).contains(x)));
    }
}
