//! Vector storage abstraction and retrieval adapter.
//!
//! The [`VectorBackend`] trait is the minimal nearest-neighbor contract the
//! pipeline needs (add/query/get/delete/count/reset over opaque vectors),
//! enabling pluggable backends and test doubles. [`VectorStore`] wraps a
//! backend and owns the retrieval semantics: deterministic chunk ids,
//! distance-to-similarity conversion, threshold filtering, whole-document
//! deletion, and metadata-scan statistics.

pub mod memory;

use async_trait::async_trait;
use tracing::debug;

use crate::error::{RagError, Result};
use crate::models::{Chunk, ChunkMetadata, RetrievedChunk, StoreStats};

/// A raw nearest-neighbor hit as the backend reports it.
#[derive(Debug, Clone)]
pub struct BackendHit {
    pub text: String,
    pub metadata: ChunkMetadata,
    /// Backend distance; smaller is closer. Must be >= 0.
    pub distance: f64,
}

/// A stored entry as returned by a metadata scan.
#[derive(Debug, Clone)]
pub struct StoredEntry {
    pub id: String,
    pub metadata: ChunkMetadata,
}

/// Minimal contract for a vector-similarity backend.
///
/// The backend owns persistence and its own concurrency control; callers
/// never lock around it. All operations are async so both remote services
/// and in-memory doubles fit behind the same seam.
#[async_trait]
pub trait VectorBackend: Send + Sync {
    /// Upsert entries by id; re-adding an id overwrites its previous value.
    async fn add(
        &self,
        ids: &[String],
        vectors: &[Vec<f32>],
        texts: &[String],
        metadatas: &[ChunkMetadata],
    ) -> Result<()>;

    /// Return the `n` nearest entries, closest first. Ties keep backend order.
    async fn query(
        &self,
        vector: &[f32],
        n: usize,
        document_id: Option<&str>,
    ) -> Result<Vec<BackendHit>>;

    /// Scan stored entries, optionally restricted to one document.
    async fn get(&self, document_id: Option<&str>) -> Result<Vec<StoredEntry>>;

    async fn delete(&self, ids: &[String]) -> Result<()>;

    async fn count(&self) -> Result<usize>;

    /// Destructive full reset.
    async fn reset(&self) -> Result<()>;
}

/// Convert a backend distance to a similarity score.
///
/// Monotonically decreasing in distance and bounded in `(0, 1]`:
/// distance 0 maps to 1, and larger distances approach 0.
pub fn distance_to_similarity(distance: f64) -> f64 {
    1.0 / (1.0 + distance)
}

/// Retrieval adapter over a [`VectorBackend`].
///
/// Exclusively owns persisted chunks and their vectors; all retrieval
/// scoring and document-scoped bookkeeping goes through here.
pub struct VectorStore {
    backend: Box<dyn VectorBackend>,
    /// Expected embedding dimensionality; enforced on every add and query.
    dims: usize,
}

impl VectorStore {
    pub fn new(backend: Box<dyn VectorBackend>, dims: usize) -> Self {
        Self { backend, dims }
    }

    /// Store chunks with their vectors and per-chunk metadata. Ids derive
    /// from `(document_id, chunk_index)` so re-adding overwrites.
    ///
    /// The whole call either fully succeeds or fails; no partial commit is
    /// visible to callers.
    ///
    /// # Errors
    ///
    /// [`RagError::DimensionMismatch`] if any vector's length differs from
    /// the configured dimensionality, [`RagError::Validation`] if chunk and
    /// vector counts disagree, [`RagError::StoreUnavailable`] if the backend
    /// refuses the batch.
    pub async fn add(
        &self,
        chunks: &[Chunk],
        vectors: &[Vec<f32>],
        metadatas: &[ChunkMetadata],
    ) -> Result<usize> {
        if chunks.len() != vectors.len() || chunks.len() != metadatas.len() {
            return Err(RagError::Validation(format!(
                "{} chunks, {} vectors, {} metadata entries",
                chunks.len(),
                vectors.len(),
                metadatas.len()
            )));
        }
        if chunks.is_empty() {
            return Ok(0);
        }
        for v in vectors {
            if v.len() != self.dims {
                return Err(RagError::DimensionMismatch {
                    expected: self.dims,
                    actual: v.len(),
                });
            }
        }

        let ids: Vec<String> = chunks.iter().map(Chunk::store_id).collect();
        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();

        self.backend.add(&ids, vectors, &texts, metadatas).await?;
        debug!(count = chunks.len(), "added chunks to vector store");
        Ok(chunks.len())
    }

    /// Nearest-neighbor retrieval with similarity scoring.
    ///
    /// Distances convert via `similarity = 1 / (1 + distance)`; candidates
    /// below `min_score` are dropped. Results come back in descending
    /// similarity, ties keeping the backend's original order.
    pub async fn query(
        &self,
        vector: &[f32],
        top_k: usize,
        min_score: f64,
        document_id: Option<&str>,
    ) -> Result<Vec<RetrievedChunk>> {
        if vector.len() != self.dims {
            return Err(RagError::DimensionMismatch {
                expected: self.dims,
                actual: vector.len(),
            });
        }

        let hits = self.backend.query(vector, top_k, document_id).await?;

        // The backend returns hits closest-first, and similarity is
        // monotonically decreasing in distance, so descending-similarity
        // order (with stable ties) is already in place.
        let results: Vec<RetrievedChunk> = hits
            .into_iter()
            .filter_map(|hit| {
                let score = distance_to_similarity(hit.distance);
                if score < min_score {
                    return None;
                }
                Some(RetrievedChunk {
                    content: hit.text,
                    source: hit.metadata.source.clone(),
                    score,
                    rerank_score: None,
                    original_score: None,
                    document_id: hit.metadata.document_id.clone(),
                    chunk_index: hit.metadata.chunk_index,
                })
            })
            .collect();

        debug!(count = results.len(), "retrieved candidates");
        Ok(results)
    }

    /// Remove all chunks belonging to one document.
    ///
    /// Returns `false` (not an error) if the document had no chunks.
    pub async fn delete_document(&self, document_id: &str) -> Result<bool> {
        let entries = self.backend.get(Some(document_id)).await?;
        if entries.is_empty() {
            return Ok(false);
        }
        let ids: Vec<String> = entries.into_iter().map(|e| e.id).collect();
        let deleted = ids.len();
        self.backend.delete(&ids).await?;
        debug!(document_id, deleted, "deleted document chunks");
        Ok(true)
    }

    /// Destructive full reset of the knowledge base.
    pub async fn clear(&self) -> Result<()> {
        self.backend.reset().await
    }

    /// Aggregate counts from a full metadata scan.
    ///
    /// O(total chunks); not on the query hot path. An empty store yields
    /// zeroed stats rather than an error.
    pub async fn stats(&self) -> Result<StoreStats> {
        let total_chunks = self.backend.count().await?;
        if total_chunks == 0 {
            return Ok(StoreStats::default());
        }

        let entries = self.backend.get(None).await?;
        let mut stats = StoreStats {
            total_chunks,
            ..Default::default()
        };
        let mut document_ids = std::collections::HashSet::new();
        for entry in entries {
            *stats.sources.entry(entry.metadata.source).or_insert(0) += 1;
            document_ids.insert(entry.metadata.document_id);
        }
        stats.total_documents = document_ids.len();
        Ok(stats)
    }

    pub fn dims(&self) -> usize {
        self.dims
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_similarity_monotone_and_bounded() {
        let distances = [0.0, 0.1, 0.5, 1.0, 2.0, 10.0, 1e6];
        let mut prev = f64::INFINITY;
        for d in distances {
            let s = distance_to_similarity(d);
            assert!(s > 0.0 && s <= 1.0, "similarity {s} out of (0, 1]");
            assert!(s < prev || (d == 0.0 && s == 1.0));
            prev = s;
        }
        assert_eq!(distance_to_similarity(0.0), 1.0);
    }

    #[test]
    fn test_similarity_identity_at_zero_distance() {
        assert!((distance_to_similarity(0.0) - 1.0).abs() < 1e-12);
        assert!((distance_to_similarity(1.0) - 0.5).abs() < 1e-12);
    }
}
