//! In-memory [`VectorBackend`] for tests and small single-process
//! deployments.
//!
//! Entries live in an insertion-ordered `Vec` behind `std::sync::RwLock`.
//! Queries are brute-force squared-Euclidean distance over all stored
//! vectors (the same metric the production backend reports), sorted
//! closest-first with stable ties.

use std::sync::RwLock;

use async_trait::async_trait;

use crate::error::{RagError, Result};
use crate::models::ChunkMetadata;

use super::{BackendHit, StoredEntry, VectorBackend};

struct Entry {
    id: String,
    vector: Vec<f32>,
    text: String,
    metadata: ChunkMetadata,
}

/// Brute-force in-memory vector backend.
#[derive(Default)]
pub struct InMemoryBackend {
    entries: RwLock<Vec<Entry>>,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

fn squared_l2(a: &[f32], b: &[f32]) -> f64 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| {
            let d = (x - y) as f64;
            d * d
        })
        .sum()
}

#[async_trait]
impl VectorBackend for InMemoryBackend {
    async fn add(
        &self,
        ids: &[String],
        vectors: &[Vec<f32>],
        texts: &[String],
        metadatas: &[ChunkMetadata],
    ) -> Result<()> {
        if ids.len() != vectors.len() || ids.len() != texts.len() || ids.len() != metadatas.len() {
            return Err(RagError::Validation(
                "add arrays must have equal lengths".to_string(),
            ));
        }
        let mut entries = self.entries.write().unwrap();
        for (((id, vector), text), metadata) in ids
            .iter()
            .zip(vectors.iter())
            .zip(texts.iter())
            .zip(metadatas.iter())
        {
            let entry = Entry {
                id: id.clone(),
                vector: vector.clone(),
                text: text.clone(),
                metadata: metadata.clone(),
            };
            // Upsert: overwrite in place to keep insertion order stable.
            match entries.iter_mut().find(|e| &e.id == id) {
                Some(existing) => *existing = entry,
                None => entries.push(entry),
            }
        }
        Ok(())
    }

    async fn query(
        &self,
        vector: &[f32],
        n: usize,
        document_id: Option<&str>,
    ) -> Result<Vec<BackendHit>> {
        let entries = self.entries.read().unwrap();
        let mut hits: Vec<BackendHit> = entries
            .iter()
            .filter(|e| document_id.map_or(true, |d| e.metadata.document_id == d))
            .map(|e| BackendHit {
                text: e.text.clone(),
                metadata: e.metadata.clone(),
                distance: squared_l2(vector, &e.vector),
            })
            .collect();
        // Stable sort keeps insertion order for equal distances.
        hits.sort_by(|a, b| {
            a.distance
                .partial_cmp(&b.distance)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        hits.truncate(n);
        Ok(hits)
    }

    async fn get(&self, document_id: Option<&str>) -> Result<Vec<StoredEntry>> {
        let entries = self.entries.read().unwrap();
        Ok(entries
            .iter()
            .filter(|e| document_id.map_or(true, |d| e.metadata.document_id == d))
            .map(|e| StoredEntry {
                id: e.id.clone(),
                metadata: e.metadata.clone(),
            })
            .collect())
    }

    async fn delete(&self, ids: &[String]) -> Result<()> {
        let mut entries = self.entries.write().unwrap();
        entries.retain(|e| !ids.contains(&e.id));
        Ok(())
    }

    async fn count(&self) -> Result<usize> {
        Ok(self.entries.read().unwrap().len())
    }

    async fn reset(&self) -> Result<()> {
        self.entries.write().unwrap().clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Chunk;
    use crate::store::VectorStore;
    use chrono::Utc;
    use sha2::{Digest, Sha256};

    fn chunk(doc: &str, index: usize, text: &str, total: usize) -> Chunk {
        let hash = format!("{:x}", Sha256::digest(text.as_bytes()));
        Chunk {
            document_id: doc.to_string(),
            chunk_index: index,
            text: text.to_string(),
            hash,
            chunk_count: total,
        }
    }

    fn metadata(doc: &str, source: &str, index: usize, total: usize, size: usize) -> ChunkMetadata {
        ChunkMetadata {
            document_id: doc.to_string(),
            source: source.to_string(),
            file_type: ".txt".to_string(),
            chunk_index: index,
            chunk_count: total,
            chunk_size: size,
            created_at: Utc::now(),
        }
    }

    fn store() -> VectorStore {
        VectorStore::new(Box::new(InMemoryBackend::new()), 3)
    }

    async fn seed(store: &VectorStore, doc: &str, source: &str, vectors: &[Vec<f32>]) {
        let chunks: Vec<Chunk> = vectors
            .iter()
            .enumerate()
            .map(|(i, _)| chunk(doc, i, &format!("{doc} chunk {i}"), vectors.len()))
            .collect();
        let metadatas: Vec<ChunkMetadata> = chunks
            .iter()
            .map(|c| metadata(doc, source, c.chunk_index, c.chunk_count, c.text.len()))
            .collect();
        store.add(&chunks, vectors, &metadatas).await.unwrap();
    }

    #[tokio::test]
    async fn test_add_then_query_orders_by_similarity() {
        let store = store();
        seed(
            &store,
            "X",
            "x.txt",
            &[
                vec![1.0, 0.0, 0.0],
                vec![0.0, 1.0, 0.0],
                vec![0.9, 0.1, 0.0],
            ],
        )
        .await;

        let results = store.query(&[1.0, 0.0, 0.0], 3, 0.0, None).await.unwrap();
        assert_eq!(results.len(), 3);
        assert_eq!(results[0].chunk_index, 0);
        assert_eq!(results[1].chunk_index, 2);
        assert!((results[0].score - 1.0).abs() < 1e-9);
        for pair in results.windows(2) {
            assert!(pair[0].score >= pair[1].score);
        }
    }

    #[tokio::test]
    async fn test_min_score_filters_candidates() {
        let store = store();
        seed(
            &store,
            "X",
            "x.txt",
            &[vec![1.0, 0.0, 0.0], vec![0.0, 5.0, 0.0]],
        )
        .await;

        // Far vector: distance 26, similarity 1/27 ≈ 0.037.
        let results = store.query(&[1.0, 0.0, 0.0], 5, 0.5, None).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].chunk_index, 0);
    }

    #[tokio::test]
    async fn test_readd_overwrites_instead_of_duplicating() {
        let store = store();
        seed(&store, "X", "x.txt", &[vec![1.0, 0.0, 0.0]]).await;
        seed(&store, "X", "x.txt", &[vec![0.0, 1.0, 0.0]]).await;

        let stats = store.stats().await.unwrap();
        assert_eq!(stats.total_chunks, 1);
    }

    #[tokio::test]
    async fn test_dimension_mismatch_is_fatal() {
        let store = store();
        let c = vec![chunk("X", 0, "text", 1)];
        let m = vec![metadata("X", "x.txt", 0, 1, 4)];
        let err = store.add(&c, &[vec![1.0, 0.0]], &m).await.unwrap_err();
        assert!(matches!(err, RagError::DimensionMismatch { expected: 3, actual: 2 }));

        let err = store.query(&[1.0], 5, 0.0, None).await.unwrap_err();
        assert!(matches!(err, RagError::DimensionMismatch { .. }));
    }

    #[tokio::test]
    async fn test_delete_document_removes_exactly_matching() {
        let store = store();
        seed(
            &store,
            "X",
            "x.txt",
            &[
                vec![1.0, 0.0, 0.0],
                vec![0.0, 1.0, 0.0],
                vec![0.0, 0.0, 1.0],
                vec![1.0, 1.0, 0.0],
                vec![0.0, 1.0, 1.0],
            ],
        )
        .await;
        seed(
            &store,
            "Y",
            "y.txt",
            &[vec![1.0, 0.5, 0.0], vec![0.5, 1.0, 0.0]],
        )
        .await;

        assert!(store.delete_document("X").await.unwrap());

        let stats = store.stats().await.unwrap();
        assert_eq!(stats.total_chunks, 2);
        assert_eq!(stats.total_documents, 1);
        assert_eq!(stats.sources.get("y.txt"), Some(&2));
        assert!(stats.sources.get("x.txt").is_none());

        // Second delete of the same id reports absence, not an error.
        assert!(!store.delete_document("X").await.unwrap());
    }

    #[tokio::test]
    async fn test_clear_resets_everything() {
        let store = store();
        seed(&store, "X", "x.txt", &[vec![1.0, 0.0, 0.0]]).await;
        store.clear().await.unwrap();
        let stats = store.stats().await.unwrap();
        assert_eq!(stats.total_chunks, 0);
        assert_eq!(stats.total_documents, 0);
        assert!(stats.sources.is_empty());
    }

    #[tokio::test]
    async fn test_query_with_document_filter() {
        let store = store();
        seed(&store, "X", "x.txt", &[vec![1.0, 0.0, 0.0]]).await;
        seed(&store, "Y", "y.txt", &[vec![1.0, 0.0, 0.0]]).await;

        let results = store
            .query(&[1.0, 0.0, 0.0], 5, 0.0, Some("Y"))
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].document_id, "Y");
    }
}
