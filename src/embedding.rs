//! Embedding provider abstraction and implementations.
//!
//! Defines the [`EmbeddingProvider`] trait and concrete implementations:
//! - **[`DisabledProvider`]** — returns errors; used when embeddings are not configured.
//! - **[`OpenAiProvider`]** — calls an OpenAI-compatible embeddings API with retry and backoff.
//!
//! The provider is constructed once at startup via [`create_provider`] and
//! passed into the store and retriever call sites, which keeps it mockable in
//! tests and avoids hidden global state.
//!
//! Also provides the vector utilities for the store:
//! - [`cosine_similarity`] — compute similarity between two embedding vectors
//! - [`encode_embedding`] — serialize a `Vec<f32>` as a decimal-list string for storage
//! - [`decode_embedding`] — parse a stored decimal-list string back into a `Vec<f32>`
//!
//! # Retry Strategy
//!
//! The OpenAI provider uses exponential backoff for transient errors:
//! - HTTP 429 (rate limited) and 5xx (server error) → retry
//! - HTTP 4xx (client error, not 429) → fail immediately
//! - Network errors → retry
//! - Backoff: 1s, 2s, 4s, 8s, 16s, 32s (capped at 2^5)

use async_trait::async_trait;
use std::time::Duration;

use crate::config::EmbeddingConfig;
use crate::error::{Error, Result};

/// Trait for embedding providers.
///
/// `embed` maps text to a fixed-length vector; the length is constant for the
/// lifetime of a provider and reported by `dims`. Failures must surface as
/// errors — a provider never substitutes a zero vector.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Returns the model identifier (e.g. `"text-embedding-3-small"`).
    fn model_name(&self) -> &str;
    /// Returns the embedding vector dimensionality (e.g. `1536`).
    fn dims(&self) -> usize;
    /// Embed a single text.
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;
}

// ============ Disabled Provider ============

/// A no-op embedding provider that always returns errors.
///
/// Used when `embedding.provider = "disabled"` in the configuration.
pub struct DisabledProvider;

#[async_trait]
impl EmbeddingProvider for DisabledProvider {
    fn model_name(&self) -> &str {
        "disabled"
    }
    fn dims(&self) -> usize {
        0
    }
    async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
        Err(Error::Provider(
            "Embedding provider is disabled. Set [embedding] provider in config.".to_string(),
        ))
    }
}

// ============ OpenAI Provider ============

/// Embedding provider for OpenAI-compatible APIs.
///
/// Calls `POST {base_url}/embeddings` with the configured model. Requires the
/// `OPENAI_API_KEY` environment variable to be set. The configured `dims` is
/// enforced on every response; a vector of any other length is an error.
pub struct OpenAiProvider {
    model: String,
    dims: usize,
    base_url: String,
    max_retries: u32,
    client: reqwest::Client,
}

impl OpenAiProvider {
    /// Create a new provider from configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if `model` or `dims` is not set in config,
    /// or if `OPENAI_API_KEY` is not in the environment.
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let model = config.model.clone().ok_or_else(|| {
            Error::InvalidConfiguration("embedding.model required for OpenAI provider".to_string())
        })?;
        let dims = config.dims.ok_or_else(|| {
            Error::InvalidConfiguration("embedding.dims required for OpenAI provider".to_string())
        })?;

        if std::env::var("OPENAI_API_KEY").is_err() {
            return Err(Error::Provider(
                "OPENAI_API_KEY environment variable not set".to_string(),
            ));
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(Error::provider)?;

        Ok(Self {
            model,
            dims,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            max_retries: config.max_retries,
            client,
        })
    }

    async fn request_embedding(&self, text: &str) -> Result<Vec<f32>> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| Error::Provider("OPENAI_API_KEY not set".to_string()))?;

        let body = serde_json::json!({
            "model": self.model,
            "input": text,
        });

        let mut last_err = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                // Exponential backoff: 1s, 2s, 4s, 8s, ...
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                tokio::time::sleep(delay).await;
            }

            let resp = self
                .client
                .post(format!("{}/embeddings", self.base_url))
                .header("Authorization", format!("Bearer {}", api_key))
                .header("Content-Type", "application/json")
                .json(&body)
                .send()
                .await;

            match resp {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        let json: serde_json::Value =
                            response.json().await.map_err(Error::provider)?;
                        return parse_embedding_response(&json);
                    }

                    // Rate limited or server error — retry
                    if status.as_u16() == 429 || status.is_server_error() {
                        let body_text = response.text().await.unwrap_or_default();
                        last_err = Some(Error::Provider(format!(
                            "embeddings API error {}: {}",
                            status, body_text
                        )));
                        continue;
                    }

                    // Client error (not 429) — don't retry
                    let body_text = response.text().await.unwrap_or_default();
                    return Err(Error::Provider(format!(
                        "embeddings API error {}: {}",
                        status, body_text
                    )));
                }
                Err(e) => {
                    last_err = Some(Error::provider(e));
                    continue;
                }
            }
        }

        Err(last_err
            .unwrap_or_else(|| Error::Provider("embedding failed after retries".to_string())))
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAiProvider {
    fn model_name(&self) -> &str {
        &self.model
    }
    fn dims(&self) -> usize {
        self.dims
    }
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let vec = self.request_embedding(text).await?;
        if vec.len() != self.dims {
            return Err(Error::Provider(format!(
                "model '{}' returned a {}-dim vector, expected {}",
                self.model,
                vec.len(),
                self.dims
            )));
        }
        Ok(vec)
    }
}

/// Parse an OpenAI-style embeddings API response, returning the first vector.
fn parse_embedding_response(json: &serde_json::Value) -> Result<Vec<f32>> {
    let embedding = json
        .get("data")
        .and_then(|d| d.as_array())
        .and_then(|d| d.first())
        .and_then(|item| item.get("embedding"))
        .and_then(|e| e.as_array())
        .ok_or_else(|| Error::Provider("invalid embeddings response: missing data".to_string()))?;

    Ok(embedding
        .iter()
        .map(|v| v.as_f64().unwrap_or(0.0) as f32)
        .collect())
}

/// Create the appropriate [`EmbeddingProvider`] based on configuration.
///
/// # Errors
///
/// Returns an error for unknown provider names or if the OpenAI provider
/// cannot be initialized (missing config or API key).
pub fn create_provider(config: &EmbeddingConfig) -> Result<Box<dyn EmbeddingProvider>> {
    match config.provider.as_str() {
        "disabled" => Ok(Box::new(DisabledProvider)),
        "openai" => Ok(Box::new(OpenAiProvider::new(config)?)),
        other => Err(Error::InvalidConfiguration(format!(
            "Unknown embedding provider: {}",
            other
        ))),
    }
}

// ============ Serialization boundary ============

/// Serialize an embedding as a decimal-list string (JSON array).
///
/// This is the storage format of the `chunks.embedding` column. Keeping the
/// encode/decode pair here means the in-memory representation stays a plain
/// `Vec<f32>` regardless of backend.
pub fn encode_embedding(vec: &[f32]) -> String {
    serde_json::to_string(vec).unwrap_or_else(|_| "[]".to_string())
}

/// Parse a stored embedding string back into a vector.
///
/// Accepts the JSON-array form written by [`encode_embedding`] and, for rows
/// written by older tooling, a bare comma-separated list of decimals.
pub fn decode_embedding(s: &str) -> Result<Vec<f32>> {
    if let Ok(vec) = serde_json::from_str::<Vec<f32>>(s) {
        return Ok(vec);
    }

    s.split(',')
        .map(|part| {
            part.trim()
                .parse::<f32>()
                .map_err(|e| Error::Provider(format!("malformed stored embedding: {}", e)))
        })
        .collect()
}

/// Compute cosine similarity between two embedding vectors.
///
/// Returns a value in `[-1.0, 1.0]`:
/// - `1.0` = identical direction
/// - `0.0` = orthogonal (unrelated)
/// - `-1.0` = opposite direction
///
/// Returns `0.0` for empty vectors, vectors of different lengths, or when
/// either vector has zero magnitude — never a divide fault.
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

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }

    dot / denom
}
