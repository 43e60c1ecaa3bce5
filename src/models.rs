//! Core data models used throughout the answer pipeline.
//!
//! These types represent the documents, chunks, and per-request results that
//! flow through ingestion and query. Persisted state (chunks + vectors) is
//! owned by the vector store; everything else here is request-scoped.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;

/// A unit of user-uploaded content, immutable once stored except for deletion.
#[derive(Debug, Clone)]
pub struct Document {
    /// Opaque identifier generated at ingestion, never reused.
    pub id: String,
    /// Display name (the uploaded filename).
    pub title: String,
    /// File-type tag, e.g. `".md"`.
    pub file_type: String,
    /// Raw extracted text.
    pub body: String,
    pub created_at: DateTime<Utc>,
}

impl Document {
    /// The metadata persisted alongside one of this document's chunks.
    pub fn chunk_metadata(&self, chunk: &Chunk) -> ChunkMetadata {
        ChunkMetadata {
            document_id: self.id.clone(),
            source: self.title.clone(),
            file_type: self.file_type.clone(),
            chunk_index: chunk.chunk_index,
            chunk_count: chunk.chunk_count,
            chunk_size: chunk.text.len(),
            created_at: self.created_at,
        }
    }
}

/// A contiguous slice of a document's text — the unit of retrieval.
///
/// Indices are contiguous from 0 per document and never renumbered; edits
/// require deleting and re-ingesting the whole document.
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    pub document_id: String,
    /// Zero-based position within the document.
    pub chunk_index: usize,
    pub text: String,
    /// SHA-256 of the text, for idempotent re-ingestion detection.
    pub hash: String,
    /// Total chunks the document had when this chunk was created.
    pub chunk_count: usize,
}

impl Chunk {
    /// Deterministic store identifier derived from `(document_id, index)`,
    /// so re-adding the same chunk overwrites instead of duplicating.
    pub fn store_id(&self) -> String {
        format!("{}_{}", self.document_id, self.chunk_index)
    }
}

/// Metadata persisted alongside each chunk's vector.
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkMetadata {
    pub document_id: String,
    /// Originating filename.
    pub source: String,
    pub file_type: String,
    pub chunk_index: usize,
    pub chunk_count: usize,
    pub chunk_size: usize,
    pub created_at: DateTime<Utc>,
}

/// A retrieval candidate: chunk content plus a similarity score in `[0, 1]`.
///
/// Request-scoped; never persisted. When reranking ran, `rerank_score` and
/// `original_score` record both inputs to the fused `score`.
#[derive(Debug, Clone, Serialize)]
pub struct RetrievedChunk {
    pub content: String,
    pub source: String,
    /// Final ranking score: similarity from the store, or the fused
    /// rerank/original combination.
    pub score: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rerank_score: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_score: Option<f64>,
    pub document_id: String,
    pub chunk_index: usize,
}

/// Result of one query through the full pipeline.
#[derive(Debug, Clone, Serialize)]
pub struct QueryResponse {
    pub question: String,
    pub answer: String,
    pub retrieved_chunks: Vec<RetrievedChunk>,
    /// Total elapsed seconds.
    pub response_time: f64,
    /// Derived reliability estimate in `[0.0, 0.95]`.
    pub confidence: f64,
}

/// Result of a batch of independent queries, in input order.
#[derive(Debug, Clone, Serialize)]
pub struct BatchQueryResponse {
    pub results: Vec<QueryResponse>,
    pub total_time: f64,
}

/// Receipt returned by a successful ingestion.
#[derive(Debug, Clone, Serialize)]
pub struct IngestReceipt {
    pub document_id: String,
    pub filename: String,
    pub chunk_count: usize,
    pub processing_time: f64,
}

/// Aggregate counts from scanning all stored chunk metadata.
#[derive(Debug, Clone, Default, Serialize)]
pub struct StoreStats {
    pub total_chunks: usize,
    pub total_documents: usize,
    /// Chunk count per source filename. BTreeMap for stable output.
    pub sources: BTreeMap<String, usize>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_store_id_is_deterministic() {
        let chunk = Chunk {
            document_id: "doc-7".to_string(),
            chunk_index: 3,
            text: "text".to_string(),
            hash: "h".to_string(),
            chunk_count: 4,
        };
        assert_eq!(chunk.store_id(), "doc-7_3");
    }

    #[test]
    fn test_document_seeds_chunk_metadata() {
        let document = Document {
            id: "doc-7".to_string(),
            title: "notes.md".to_string(),
            file_type: ".md".to_string(),
            body: "first\n\nsecond".to_string(),
            created_at: Utc::now(),
        };
        let chunk = Chunk {
            document_id: document.id.clone(),
            chunk_index: 1,
            text: "second".to_string(),
            hash: "h".to_string(),
            chunk_count: 2,
        };

        let metadata = document.chunk_metadata(&chunk);
        assert_eq!(metadata.document_id, "doc-7");
        assert_eq!(metadata.source, "notes.md");
        assert_eq!(metadata.file_type, ".md");
        assert_eq!(metadata.chunk_index, 1);
        assert_eq!(metadata.chunk_count, 2);
        assert_eq!(metadata.chunk_size, 6);
        assert_eq!(metadata.created_at, document.created_at);
    }
}
