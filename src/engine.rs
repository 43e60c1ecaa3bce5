//! Query and ingestion orchestration.
//!
//! [`RagEngine`] wires the chunker, embedder, vector store, reranker, and
//! generator into the two top-level flows: `ingest` (validate, chunk, embed,
//! store) and `query` (embed, retrieve, rerank, assemble context, generate,
//! score confidence). Ingestion failures are fatal and reported to the
//! caller; query failures degrade to an answered-but-empty response so a
//! flaky upstream never turns into a caller-visible error.

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::chunker::Chunker;
use crate::config::Config;
use crate::embedding::{embed_one, Embedder};
use crate::error::{RagError, Result};
use crate::generator::{answer_prompt, Generator};
use crate::models::{
    BatchQueryResponse, ChunkMetadata, Document, IngestReceipt, QueryResponse, RetrievedChunk,
    StoreStats,
};
use crate::reranker::RerankerClient;
use crate::store::VectorStore;

/// Answer returned when retrieval finds nothing above the threshold.
const NO_RESULTS_ANSWER: &str = "No relevant information was found in the knowledge base. \
     Try rephrasing the question or adding more documents.";

/// Answer returned by the extractive fallback when the context has no
/// usable lines.
const CANNOT_ANSWER: &str =
    "The available information is not sufficient to answer this question.";

const EXTRACTIVE_PREFIX: &str = "Based on the available information: ";

/// Top-level pipeline over injected components.
///
/// All collaborators arrive through the constructor; nothing global. The
/// generator and reranker are optional, and the pipeline degrades to
/// retrieval-only behavior without them.
pub struct RagEngine {
    config: Config,
    chunker: Chunker,
    store: VectorStore,
    embedder: Arc<dyn Embedder>,
    generator: Option<Arc<dyn Generator>>,
    reranker: Option<RerankerClient>,
}

impl RagEngine {
    pub fn new(
        config: Config,
        store: VectorStore,
        embedder: Arc<dyn Embedder>,
        generator: Option<Arc<dyn Generator>>,
        reranker: Option<RerankerClient>,
    ) -> Self {
        let chunker = Chunker::new(&config.chunking);
        Self {
            config,
            chunker,
            store,
            embedder,
            generator,
            reranker,
        }
    }

    /// Ingest one document's extracted text under its original filename.
    ///
    /// Validates, chunks, embeds, and stores. Any failure is fatal: nothing
    /// is persisted unless the whole flow succeeds.
    ///
    /// # Errors
    ///
    /// [`RagError::Validation`] for a bad filename, disallowed extension, or
    /// oversized content; [`RagError::EmptyContent`] for blank text;
    /// [`RagError::Upstream`] / [`RagError::StoreUnavailable`] when the
    /// embedding service or backend fails.
    pub async fn ingest(&self, text: &str, filename: &str) -> Result<IngestReceipt> {
        let start = Instant::now();

        let filename = filename.trim();
        if filename.is_empty() {
            return Err(RagError::Validation("filename must not be empty".to_string()));
        }
        let extension = file_extension(filename);
        if !self
            .config
            .ingest
            .allowed_extensions
            .iter()
            .any(|e| e.eq_ignore_ascii_case(&extension))
        {
            return Err(RagError::Validation(format!(
                "unsupported file type: {extension:?} (allowed: {})",
                self.config.ingest.allowed_extensions.join(", ")
            )));
        }
        if text.len() > self.config.ingest.max_content_bytes {
            return Err(RagError::Validation(format!(
                "content too large: {} bytes (limit {})",
                text.len(),
                self.config.ingest.max_content_bytes
            )));
        }

        let document = Document {
            id: Uuid::new_v4().to_string(),
            title: filename.to_string(),
            file_type: extension,
            body: text.to_string(),
            created_at: Utc::now(),
        };
        let chunks = self.chunker.split(&document.id, &document.body)?;

        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let vectors = self.embedder.embed(&texts).await?;

        let metadatas: Vec<ChunkMetadata> = chunks
            .iter()
            .map(|c| document.chunk_metadata(c))
            .collect();

        let stored = self.store.add(&chunks, &vectors, &metadatas).await?;

        let processing_time = start.elapsed().as_secs_f64();
        info!(document_id = %document.id, filename, chunks = stored, "ingested document");

        Ok(IngestReceipt {
            document_id: document.id,
            filename: document.title,
            chunk_count: stored,
            processing_time,
        })
    }

    /// Answer one question over the stored knowledge base.
    ///
    /// Never fails: internal errors come back as a degraded response with an
    /// explanatory answer, no chunks, and confidence 0.0.
    pub async fn query(
        &self,
        question: &str,
        top_k: Option<usize>,
        use_rerank: bool,
    ) -> QueryResponse {
        let start = Instant::now();
        let top_k = top_k.unwrap_or(self.config.retrieval.top_k).max(1);

        let (answer, chunks, confidence) = match self.query_inner(question, top_k, use_rerank).await
        {
            Ok(result) => result,
            Err(e) => {
                warn!(error = %e, "query degraded to error response");
                (
                    format!("An error occurred while processing the query: {e}"),
                    Vec::new(),
                    0.0,
                )
            }
        };

        QueryResponse {
            question: question.to_string(),
            answer,
            retrieved_chunks: chunks,
            response_time: start.elapsed().as_secs_f64(),
            confidence,
        }
    }

    async fn query_inner(
        &self,
        question: &str,
        top_k: usize,
        use_rerank: bool,
    ) -> Result<(String, Vec<RetrievedChunk>, f64)> {
        let question = question.trim();
        if question.is_empty() {
            return Err(RagError::Validation("question must not be empty".to_string()));
        }

        let query_vector = embed_one(self.embedder.as_ref(), question).await?;

        let reranking = use_rerank
            && self
                .reranker
                .as_ref()
                .map(RerankerClient::is_enabled)
                .unwrap_or(false);
        let initial_k = if reranking {
            ((top_k as f64) * self.config.retrieval.rerank_initial_multiplier).ceil() as usize
        } else {
            top_k
        };

        let mut chunks = self
            .store
            .query(
                &query_vector,
                initial_k,
                self.config.retrieval.similarity_threshold,
                None,
            )
            .await?;

        if chunks.is_empty() {
            return Ok((NO_RESULTS_ANSWER.to_string(), Vec::new(), 0.0));
        }

        if reranking {
            // Safe: `reranking` implies the client exists.
            if let Some(reranker) = &self.reranker {
                chunks = reranker.rerank_chunks(question, chunks, top_k).await;
            }
        } else {
            chunks.truncate(top_k);
        }

        let context = build_context(&chunks);
        let answer = match &self.generator {
            Some(generator) => {
                let prompt = answer_prompt(question, &context);
                match generator.generate(&prompt).await {
                    Ok(answer) => answer,
                    Err(e) => {
                        warn!(error = %e, "generation failed, using extractive fallback");
                        extractive_answer(&chunks)
                    }
                }
            }
            None => extractive_answer(&chunks),
        };

        let confidence = confidence_score(&chunks, top_k, &answer);
        Ok((answer, chunks, confidence))
    }

    /// Run independent queries sequentially, in input order. One query's
    /// degraded response never affects the others.
    pub async fn query_batch(
        &self,
        questions: &[String],
        top_k: Option<usize>,
        use_rerank: bool,
    ) -> BatchQueryResponse {
        let start = Instant::now();
        let mut results = Vec::with_capacity(questions.len());
        for question in questions {
            results.push(self.query(question, top_k, use_rerank).await);
        }
        BatchQueryResponse {
            results,
            total_time: start.elapsed().as_secs_f64(),
        }
    }

    /// Remove every chunk of one document. `false` means the id was unknown.
    pub async fn delete_document(&self, document_id: &str) -> Result<bool> {
        self.store.delete_document(document_id).await
    }

    /// Destructive full reset of the knowledge base.
    pub async fn clear_all(&self) -> Result<()> {
        self.store.clear().await
    }

    /// Aggregate store counts. A backend failure degrades to empty stats
    /// rather than an error.
    pub async fn stats(&self) -> StoreStats {
        match self.store.stats().await {
            Ok(stats) => stats,
            Err(e) => {
                warn!(error = %e, "stats scan failed, reporting empty stats");
                StoreStats::default()
            }
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }
}

/// The dot-prefixed lowercase extension of a filename, or `""` if none.
fn file_extension(filename: &str) -> String {
    match filename.rfind('.') {
        Some(i) if i > 0 => filename[i..].to_ascii_lowercase(),
        _ => String::new(),
    }
}

/// Assemble the numbered context block handed to the generator.
///
/// Each entry lists its scores so the model can weigh sources; reranked
/// chunks additionally show both fusion inputs.
fn build_context(chunks: &[RetrievedChunk]) -> String {
    chunks
        .iter()
        .enumerate()
        .map(|(i, c)| match (c.rerank_score, c.original_score) {
            (Some(rerank), Some(original)) => format!(
                "Context {} (similarity: {:.4}, rerank: {:.4}, original: {:.4}):\n{}",
                i + 1,
                c.score,
                rerank,
                original,
                c.content
            ),
            _ => format!("Context {} (similarity: {:.4}):\n{}", i + 1, c.score, c.content),
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Extractive fallback when no generator is available (or it failed):
/// quote up to three substantial lines from the top chunks.
fn extractive_answer(chunks: &[RetrievedChunk]) -> String {
    let lines: Vec<&str> = chunks
        .iter()
        .flat_map(|c| c.content.lines())
        .map(str::trim)
        .filter(|l| l.chars().count() > 10)
        .take(3)
        .collect();

    if lines.is_empty() {
        CANNOT_ANSWER.to_string()
    } else {
        format!("{EXTRACTIVE_PREFIX}{}", lines.join(" "))
    }
}

/// Heuristic confidence in `[0.0, 0.95]`.
///
/// Average retrieval score, discounted when fewer than `top_k` chunks
/// survived, adjusted for implausibly short or very long answers, with a
/// small bonus when a real rerank score contributed. An empty retrieval is
/// always exactly 0.0.
fn confidence_score(chunks: &[RetrievedChunk], top_k: usize, answer: &str) -> f64 {
    if chunks.is_empty() {
        return 0.0;
    }

    let avg: f64 = chunks.iter().map(|c| c.score).sum::<f64>() / chunks.len() as f64;
    let count_factor = (chunks.len() as f64 / top_k as f64).min(1.0);

    let answer_chars = answer.chars().count();
    let length_factor = if answer_chars < 10 {
        0.3
    } else if answer_chars > 500 {
        0.8
    } else {
        1.0
    };

    let rerank_bonus = if chunks.iter().any(|c| c.rerank_score.is_some()) {
        1.1
    } else {
        1.0
    };

    (avg * count_factor * length_factor * rerank_bonus).min(0.95)
}
