//! Embedding client abstraction and HTTP implementation.
//!
//! The [`Embedder`] trait is the seam between the pipeline and the remote
//! embedding model; [`HttpEmbedder`] calls an OpenAI-compatible
//! `POST /embeddings` endpoint. Both the ingestion path (batch) and the
//! query path (single text) go through the same trait.

use async_trait::async_trait;
use std::time::Duration;
use tracing::debug;

use crate::config::EmbeddingConfig;
use crate::error::{RagError, Result};

/// Converts text to fixed-dimension vectors.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embed a batch of texts, returning one vector per input in order.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// The fixed vector dimensionality this embedder produces.
    fn dims(&self) -> usize;
}

/// Embed a single query text.
pub async fn embed_one(embedder: &dyn Embedder, text: &str) -> Result<Vec<f32>> {
    let mut vectors = embedder.embed(std::slice::from_ref(&text.to_string())).await?;
    vectors
        .pop()
        .ok_or_else(|| RagError::Parse("empty embedding response".to_string()))
}

/// Embedding client for an OpenAI-compatible `/embeddings` endpoint.
pub struct HttpEmbedder {
    client: reqwest::Client,
    base_url: String,
    model: String,
    dims: usize,
}

impl HttpEmbedder {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| RagError::upstream("embedding", e))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            dims: config.dims,
        })
    }
}

#[async_trait]
impl Embedder for HttpEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let body = serde_json::json!({
            "input": texts,
            "model": self.model,
        });

        let response = self
            .client
            .post(format!("{}/embeddings", self.base_url))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| RagError::upstream("embedding", e))?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            return Err(RagError::Upstream {
                service: "embedding",
                message: format!("HTTP {status}: {body_text}"),
            });
        }

        let json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| RagError::Parse(format!("embedding response: {e}")))?;

        let vectors = parse_embedding_response(&json)?;

        if vectors.len() != texts.len() {
            return Err(RagError::Parse(format!(
                "expected {} embeddings, got {}",
                texts.len(),
                vectors.len()
            )));
        }
        for v in &vectors {
            if v.len() != self.dims {
                return Err(RagError::DimensionMismatch {
                    expected: self.dims,
                    actual: v.len(),
                });
            }
        }

        debug!(count = texts.len(), "embedded texts");
        Ok(vectors)
    }

    fn dims(&self) -> usize {
        self.dims
    }
}

/// Extract the `data[].embedding` arrays from an OpenAI-style response,
/// preserving input order.
fn parse_embedding_response(json: &serde_json::Value) -> Result<Vec<Vec<f32>>> {
    let data = json
        .get("data")
        .and_then(|d| d.as_array())
        .ok_or_else(|| RagError::Parse("embedding response missing data array".to_string()))?;

    let mut vectors = Vec::with_capacity(data.len());
    for item in data {
        let embedding = item
            .get("embedding")
            .and_then(|e| e.as_array())
            .ok_or_else(|| RagError::Parse("embedding entry missing vector".to_string()))?;
        let vec: Vec<f32> = embedding
            .iter()
            .map(|v| v.as_f64().unwrap_or(0.0) as f32)
            .collect();
        vectors.push(vec);
    }

    Ok(vectors)
}
