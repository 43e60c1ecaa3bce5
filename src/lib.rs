//! Retrieval-augmented answer pipeline over user-ingested documents.
//!
//! Documents are chunked with overlap, embedded, and stored in a pluggable
//! vector backend; questions are answered by retrieving the most similar
//! chunks, optionally reranking them through a format-negotiating client,
//! and generating (or extracting) a grounded answer with a confidence score.
//!
//! Modules:
//!
//! - [`config`] — TOML configuration with per-section defaults
//! - [`error`] — error taxonomy shared by every stage
//! - [`models`] — documents, chunks, and request-scoped result types
//! - [`chunker`] — overlap-aware recursive text splitter
//! - [`store`] — vector backend trait, in-memory backend, retrieval adapter
//! - [`embedding`] — embedding client seam and HTTP implementation
//! - [`reranker`] — rerank client with request-format negotiation
//! - [`generator`] — chat-completions answer generation
//! - [`engine`] — the ingestion and query orchestrator
//!
//! ```no_run
//! use std::sync::Arc;
//! use ragbase::config::Config;
//! use ragbase::embedding::HttpEmbedder;
//! use ragbase::engine::RagEngine;
//! use ragbase::store::{memory::InMemoryBackend, VectorStore};
//!
//! # async fn run() -> anyhow::Result<()> {
//! let config = Config::default();
//! let store = VectorStore::new(Box::new(InMemoryBackend::new()), config.embedding.dims);
//! let embedder = Arc::new(HttpEmbedder::new(&config.embedding)?);
//! let engine = RagEngine::new(config, store, embedder, None, None);
//!
//! engine.ingest("Rust is a systems language.", "notes.txt").await?;
//! let response = engine.query("What is Rust?", None, false).await;
//! println!("{} (confidence {:.2})", response.answer, response.confidence);
//! # Ok(())
//! # }
//! ```

pub mod chunker;
pub mod config;
pub mod embedding;
pub mod engine;
pub mod error;
pub mod generator;
pub mod models;
pub mod reranker;
pub mod store;

pub use config::{load_config, Config};
pub use engine::RagEngine;
pub use error::{RagError, Result};
pub use models::{
    BatchQueryResponse, Chunk, ChunkMetadata, Document, IngestReceipt, QueryResponse,
    RetrievedChunk, StoreStats,
};
