//! Embedding provider abstraction and the HTTP-backed implementation.
//!
//! The embedding model itself is an external collaborator: an opaque
//! function from text to a fixed-length vector. The core only depends on
//! the [`Embedder`] trait; production wires in [`HttpEmbedder`], which
//! calls an OpenAI-compatible `/embeddings` endpoint.
//!
//! # Retry Strategy
//!
//! Transient failures are retried with exponential backoff:
//! - HTTP 429 (rate limited) and 5xx (server error): retry
//! - other HTTP 4xx: fail immediately
//! - network errors: retry
//! - backoff: 1s, 2s, 4s, 8s, 16s, 32s (capped at 2^5)
//!
//! Retrying is a concern of this wrapper, not of the retrieval core; the
//! core surfaces [`Error::Embedding`] unchanged.

use std::time::Duration;

use async_trait::async_trait;

use crate::config::EmbeddingConfig;
use crate::error::{Error, Result};

/// An opaque text-to-vector function with fixed output dimensionality.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Model identifier (e.g. `"text-embedding-3-small"`).
    fn model_name(&self) -> &str;

    /// Output vector dimensionality (e.g. `384`).
    fn dims(&self) -> usize;

    /// Embed a batch of texts, one vector per input, in input order.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}

/// Embed a single query text.
pub async fn embed_query(embedder: &dyn Embedder, text: &str) -> Result<Vec<f32>> {
    let vectors = embedder.embed(&[text.to_string()]).await?;
    vectors
        .into_iter()
        .next()
        .ok_or_else(|| Error::Embedding("empty embedding response".to_string()))
}

/// Embedding provider backed by an OpenAI-compatible HTTP endpoint.
///
/// The API key is read from the environment per call, not at
/// construction, so commands that never embed (stats, meta-questions)
/// work without credentials.
pub struct HttpEmbedder {
    endpoint: String,
    model: String,
    dims: usize,
    api_key_env: String,
    max_retries: u32,
    client: reqwest::Client,
}

impl HttpEmbedder {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| Error::Embedding(e.to_string()))?;
        Ok(Self {
            endpoint: config.endpoint.clone(),
            model: config.model.clone(),
            dims: config.dims,
            api_key_env: config.api_key_env.clone(),
            max_retries: config.max_retries,
            client,
        })
    }
}

#[async_trait]
impl Embedder for HttpEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let api_key = std::env::var(&self.api_key_env)
            .map_err(|_| Error::Embedding(format!("{} not set", self.api_key_env)))?;
        let body = serde_json::json!({
            "model": self.model,
            "input": texts,
        });

        let mut last_err = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                tokio::time::sleep(delay).await;
            }

            let resp = self
                .client
                .post(&self.endpoint)
                .header("Authorization", format!("Bearer {api_key}"))
                .json(&body)
                .send()
                .await;

            match resp {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        let json: serde_json::Value = response
                            .json()
                            .await
                            .map_err(|e| Error::Embedding(e.to_string()))?;
                        return parse_embeddings(&json, self.dims);
                    }
                    let retryable = status.as_u16() == 429 || status.is_server_error();
                    let text = response.text().await.unwrap_or_default();
                    let err = Error::Embedding(format!("HTTP {status}: {text}"));
                    if !retryable {
                        return Err(err);
                    }
                    last_err = Some(err);
                }
                Err(e) => {
                    last_err = Some(Error::Embedding(format!("request failed: {e}")));
                }
            }
        }

        Err(last_err
            .unwrap_or_else(|| Error::Embedding("retries exhausted".to_string())))
    }
}

/// Parse an OpenAI-style embeddings response body.
fn parse_embeddings(json: &serde_json::Value, dims: usize) -> Result<Vec<Vec<f32>>> {
    let data = json["data"]
        .as_array()
        .ok_or_else(|| Error::Embedding("missing data array in response".to_string()))?;

    let mut vectors = Vec::with_capacity(data.len());
    for item in data {
        let raw = item["embedding"]
            .as_array()
            .ok_or_else(|| Error::Embedding("missing embedding in response item".to_string()))?;
        let vector: Vec<f32> = raw
            .iter()
            .map(|v| v.as_f64().unwrap_or(0.0) as f32)
            .collect();
        if vector.len() != dims {
            return Err(Error::Embedding(format!(
                "expected {dims}-dim vector, got {}",
                vector.len()
            )));
        }
        vectors.push(vector);
    }
    Ok(vectors)
}
