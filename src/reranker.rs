//! Relevance reranking with request-format negotiation.
//!
//! Rerank services in the wild disagree on both the request shape (field
//! names like `top_n` vs `top_k`, whether `model` is accepted) and the
//! response shape (`results`, `rankings`, `data`, or a bare list). Instead of
//! pinning one dialect, [`RerankerClient`] walks an ordered table of request
//! shapes, retrying transient failures within each shape, and parses whatever
//! known response shape comes back. When every shape fails it degrades to a
//! synthetic position-based ranking so the query pipeline never loses the
//! candidates it already retrieved.

use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::RerankConfig;
use crate::error::{RagError, Result};
use crate::models::RetrievedChunk;

/// One reranked document: its index into the submitted list plus a
/// service-assigned relevance score.
#[derive(Debug, Clone, PartialEq)]
pub struct RerankResult {
    pub index: usize,
    pub score: f64,
}

/// Request dialects, tried in order. Most explicit first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RequestShape {
    /// `model`, `query`, `documents`, `top_n`
    ModelTopN,
    /// `model`, `query`, `documents`, `top_k`
    ModelTopK,
    /// `query`, `documents`, `top_n`
    BareTopN,
    /// `query`, `documents` only
    Minimal,
}

const REQUEST_SHAPES: [RequestShape; 4] = [
    RequestShape::ModelTopN,
    RequestShape::ModelTopK,
    RequestShape::BareTopN,
    RequestShape::Minimal,
];

impl RequestShape {
    fn build(self, model: &str, query: &str, documents: &[String], limit: usize) -> serde_json::Value {
        match self {
            RequestShape::ModelTopN => serde_json::json!({
                "model": model,
                "query": query,
                "documents": documents,
                "top_n": limit,
            }),
            RequestShape::ModelTopK => serde_json::json!({
                "model": model,
                "query": query,
                "documents": documents,
                "top_k": limit,
            }),
            RequestShape::BareTopN => serde_json::json!({
                "query": query,
                "documents": documents,
                "top_n": limit,
            }),
            RequestShape::Minimal => serde_json::json!({
                "query": query,
                "documents": documents,
            }),
        }
    }
}

/// Transport seam: submit one rerank payload, get back the HTTP status and
/// the response body as JSON. Lets tests script exact status/body sequences.
#[async_trait]
pub trait RerankTransport: Send + Sync {
    async fn post(&self, payload: &serde_json::Value) -> Result<(u16, serde_json::Value)>;
}

/// Real HTTP transport posting to `{api_base}/rerank`.
pub struct HttpRerankTransport {
    client: reqwest::Client,
    url: String,
}

impl HttpRerankTransport {
    pub fn new(config: &RerankConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| RagError::upstream("rerank", e))?;
        Ok(Self {
            client,
            url: format!("{}/rerank", config.api_base.trim_end_matches('/')),
        })
    }
}

#[async_trait]
impl RerankTransport for HttpRerankTransport {
    async fn post(&self, payload: &serde_json::Value) -> Result<(u16, serde_json::Value)> {
        let response = self
            .client
            .post(&self.url)
            .header("Content-Type", "application/json")
            .json(payload)
            .send()
            .await
            .map_err(|e| RagError::upstream("rerank", e))?;

        let status = response.status().as_u16();
        let body = response
            .json::<serde_json::Value>()
            .await
            .unwrap_or(serde_json::Value::Null);
        Ok((status, body))
    }
}

/// Response dialects a rerank service may answer with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ResponseShape {
    /// `{"results": [...]}`
    Results,
    /// `{"rankings": [...]}`
    Rankings,
    /// `{"data": [...]}`
    Data,
    /// a bare JSON list
    Bare,
}

impl ResponseShape {
    fn detect(json: &serde_json::Value) -> Option<Self> {
        if json.get("results").is_some() {
            Some(Self::Results)
        } else if json.get("rankings").is_some() {
            Some(Self::Rankings)
        } else if json.get("data").is_some() {
            Some(Self::Data)
        } else if json.is_array() {
            Some(Self::Bare)
        } else {
            None
        }
    }

    fn entries<'a>(self, json: &'a serde_json::Value) -> Option<&'a Vec<serde_json::Value>> {
        match self {
            Self::Results => json.get("results")?.as_array(),
            Self::Rankings => json.get("rankings")?.as_array(),
            Self::Data => json.get("data")?.as_array(),
            Self::Bare => json.as_array(),
        }
    }
}

/// Parse any known response shape into ranked results.
///
/// Each entry carries an optional `index` (defaults to its position) and a
/// score under `relevance_score` or `score`. Output is sorted by score
/// descending and truncated to `limit`.
fn parse_rerank_response(json: &serde_json::Value, limit: usize) -> Option<Vec<RerankResult>> {
    let shape = ResponseShape::detect(json)?;
    let entries = shape.entries(json)?;

    let mut results = Vec::with_capacity(entries.len());
    for (position, entry) in entries.iter().enumerate() {
        let score = entry
            .get("relevance_score")
            .or_else(|| entry.get("score"))
            .and_then(|s| s.as_f64())?;
        let index = entry
            .get("index")
            .and_then(|i| i.as_u64())
            .map(|i| i as usize)
            .unwrap_or(position);
        results.push(RerankResult { index, score });
    }

    if results.is_empty() {
        return None;
    }
    results.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    results.truncate(limit);
    Some(results)
}

/// Position-based ranking used when every request shape has failed:
/// the first `limit` documents keep their original order with scores
/// `1 / (position + 1)`.
fn synthetic_ranking(document_count: usize, limit: usize) -> Vec<RerankResult> {
    (0..document_count.min(limit))
        .map(|i| RerankResult {
            index: i,
            score: 1.0 / (i as f64 + 1.0),
        })
        .collect()
}

/// Format-negotiating rerank client.
pub struct RerankerClient {
    transport: Box<dyn RerankTransport>,
    config: RerankConfig,
}

impl RerankerClient {
    pub fn new(transport: Box<dyn RerankTransport>, config: RerankConfig) -> Self {
        Self { transport, config }
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    /// Rank `documents` against `query`, requesting at most `limit` results.
    ///
    /// The caller's limit is forwarded to the service (capped by the
    /// configured `top_k` and the document count) so it never scores more
    /// candidates than the query needs. Never fails: every dialect and retry
    /// budget exhausted means a synthetic position-based ranking, not an
    /// error.
    pub async fn rerank(&self, query: &str, documents: &[String], limit: usize) -> Vec<RerankResult> {
        if documents.is_empty() {
            return Vec::new();
        }
        let limit = limit.max(1).min(self.config.top_k).min(documents.len());

        for shape in REQUEST_SHAPES {
            let payload = shape.build(&self.config.model, query, documents, limit);

            for attempt in 1..=self.config.max_retries.max(1) {
                match self.transport.post(&payload).await {
                    Ok((status, body)) if (200..300).contains(&status) => {
                        match parse_rerank_response(&body, limit) {
                            Some(results) => {
                                debug!(?shape, count = results.len(), "rerank succeeded");
                                return results;
                            }
                            None => {
                                // Unrecognized or empty body; this dialect is
                                // a dead end, move on.
                                warn!(?shape, "unparseable rerank response");
                                break;
                            }
                        }
                    }
                    Ok((status, _)) if (500..600).contains(&status) => {
                        warn!(?shape, status, attempt, "rerank server error");
                        if attempt < self.config.max_retries {
                            tokio::time::sleep(Duration::from_millis(self.config.retry_delay_ms))
                                .await;
                        }
                    }
                    Ok((status, _)) => {
                        // 4xx means the service rejected this dialect.
                        debug!(?shape, status, "rerank request shape rejected");
                        break;
                    }
                    Err(e) => {
                        warn!(?shape, attempt, error = %e, "rerank transport failure");
                        if attempt < self.config.max_retries {
                            tokio::time::sleep(Duration::from_millis(self.config.retry_delay_ms))
                                .await;
                        }
                    }
                }
            }
        }

        warn!("all rerank request shapes exhausted, using positional fallback");
        synthetic_ranking(documents.len(), limit)
    }

    /// Rerank retrieval candidates and fuse scores.
    ///
    /// Skipped entirely (candidates returned unchanged) when the client is
    /// disabled or there are no more candidates than `top_k`, since there is
    /// nothing to reorder. Otherwise the fused score is `weight_rerank *
    /// rerank + weight_original * similarity`; each surviving chunk records
    /// both inputs. Candidates the reranker did not return are dropped.
    /// Output is sorted by fused score descending and truncated to `top_k`.
    pub async fn rerank_chunks(
        &self,
        query: &str,
        chunks: Vec<RetrievedChunk>,
        top_k: usize,
    ) -> Vec<RetrievedChunk> {
        if !self.config.enabled || chunks.len() <= top_k {
            let mut chunks = chunks;
            chunks.truncate(top_k);
            return chunks;
        }

        let documents: Vec<String> = chunks.iter().map(|c| c.content.clone()).collect();
        let ranked = self.rerank(query, &documents, top_k).await;

        let mut fused: Vec<RetrievedChunk> = ranked
            .into_iter()
            .filter_map(|r| {
                let chunk = chunks.get(r.index)?;
                let mut chunk = chunk.clone();
                let original = chunk.score;
                chunk.rerank_score = Some(r.score);
                chunk.original_score = Some(original);
                chunk.score = self.config.weight_rerank * r.score
                    + self.config.weight_original * original;
                Some(chunk)
            })
            .collect();

        fused.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        fused.truncate(top_k);
        fused
    }
}
