//! Embedding capability abstraction.
//!
//! Defines the [`Embedder`] trait consumed by the retriever and the
//! ingestion pipeline, plus the HTTP-backed [`RemoteEmbedder`] that talks
//! to an OpenAI-compatible `/embeddings` endpoint (OpenRouter by default).
//!
//! Also provides vector utilities shared with the index store:
//! - [`cosine_distance`] — 1 − cosine similarity; lower is more similar
//! - [`vec_to_blob`] / [`blob_to_vec`] — little-endian f32 encoding for
//!   SQLite BLOB storage
//!
//! # Retry strategy
//!
//! Transient failures use exponential backoff: 1s, 2s, 4s, 8s, 16s, 32s
//! (capped at 2^5). HTTP 429 and 5xx retry; other 4xx fail immediately;
//! network errors retry.

use anyhow::{bail, Result};
use async_trait::async_trait;
use std::time::Duration;

use crate::config::EmbeddingConfig;

/// Computes fixed-length float vectors for batches of text.
///
/// Output order matches input order; an empty input yields an empty
/// output without a network call. Failures are errors the caller must
/// handle — the capability itself never degrades silently.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Embedding vector dimensionality.
    fn dims(&self) -> usize;
}

/// Embedder backed by an OpenAI-compatible embeddings API.
pub struct RemoteEmbedder {
    client: reqwest::Client,
    api_base: String,
    api_key: String,
    model: String,
    dims: usize,
    max_retries: u32,
}

impl RemoteEmbedder {
    /// Build from configuration. Missing credentials are a configuration
    /// error, fatal at startup rather than during steady-state operation.
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let api_key = std::env::var(&config.api_key_env)
            .map_err(|_| anyhow::anyhow!("{} environment variable not set", config.api_key_env))?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            api_key,
            model: config.model.clone(),
            dims: config.dims,
            max_retries: config.max_retries,
        })
    }
}

#[async_trait]
impl Embedder for RemoteEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

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
                .post(format!("{}/embeddings", self.api_base))
                .header("Authorization", format!("Bearer {}", self.api_key))
                .header("Content-Type", "application/json")
                .json(&body)
                .send()
                .await;

            match resp {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        let json: serde_json::Value = response.json().await?;
                        return parse_embeddings_response(&json, texts.len(), self.dims);
                    }

                    // Rate limited or server error — retry
                    if status.as_u16() == 429 || status.is_server_error() {
                        let body_text = response.text().await.unwrap_or_default();
                        last_err =
                            Some(anyhow::anyhow!("embeddings API error {}: {}", status, body_text));
                        continue;
                    }

                    // Client error (not 429) — don't retry
                    let body_text = response.text().await.unwrap_or_default();
                    bail!("embeddings API error {}: {}", status, body_text);
                }
                Err(e) => {
                    last_err = Some(e.into());
                    continue;
                }
            }
        }

        Err(last_err.unwrap_or_else(|| anyhow::anyhow!("embedding failed after retries")))
    }

    fn dims(&self) -> usize {
        self.dims
    }
}

/// Parse an OpenAI-style embeddings response: `data[].embedding` arrays
/// in input order. A malformed component or a vector of the wrong
/// dimensionality is a hard error, caught here rather than at query time.
fn parse_embeddings_response(
    json: &serde_json::Value,
    expected: usize,
    dims: usize,
) -> Result<Vec<Vec<f32>>> {
    let data = json
        .get("data")
        .and_then(|d| d.as_array())
        .ok_or_else(|| anyhow::anyhow!("invalid embeddings response: missing data array"))?;

    if data.len() != expected {
        bail!(
            "invalid embeddings response: expected {} vectors, got {}",
            expected,
            data.len()
        );
    }

    let mut embeddings = Vec::with_capacity(data.len());
    for item in data {
        let embedding = item
            .get("embedding")
            .and_then(|e| e.as_array())
            .ok_or_else(|| anyhow::anyhow!("invalid embeddings response: missing embedding"))?;

        let mut vec = Vec::with_capacity(embedding.len());
        for component in embedding {
            let n = component.as_f64().ok_or_else(|| {
                anyhow::anyhow!("invalid embeddings response: non-numeric component")
            })?;
            vec.push(n as f32);
        }
        if vec.len() != dims {
            bail!(
                "invalid embeddings response: expected {}-dimensional vector, got {}",
                dims,
                vec.len()
            );
        }
        embeddings.push(vec);
    }

    Ok(embeddings)
}

/// Encode a float vector as little-endian f32 bytes for BLOB storage.
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vec.len() * 4);
    for &v in vec {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// Decode a BLOB back into a float vector.
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
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

/// Cosine distance between two vectors of equal length: `1 − cos(θ)`,
/// in `[0.0, 2.0]`, lower = more similar.
///
/// Mismatched dimensionality is a caller precondition violation.
pub fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    assert_eq!(
        a.len(),
        b.len(),
        "embedding dimensionality mismatch: {} vs {}",
        a.len(),
        b.len()
    );
    1.0 - cosine_similarity(a, b)
}
