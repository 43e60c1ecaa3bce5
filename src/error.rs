//! Error taxonomy for the answer pipeline.
//!
//! Failures fall into four buckets with different blast radii:
//!
//! - **Validation** — bad caller input; the request is rejected before any
//!   state is created.
//! - **Upstream** — a remote service (embedding, generation, rerank, vector
//!   backend) is unreachable or misbehaving. Fatal during ingestion's store
//!   step, degraded-but-answered everywhere else.
//! - **Parse** — a remote response did not match any known shape. Never
//!   surfaced raw to callers; treated as a negotiation failure.
//! - **Internal** — anything unanticipated; converted to a degraded
//!   response at the query pipeline boundary.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, RagError>;

#[derive(Debug, Error)]
pub enum RagError {
    /// Input text is empty (or below the configured minimum) after trimming.
    #[error("document content is empty")]
    EmptyContent,

    /// Caller input rejected before any state was created.
    #[error("invalid input: {0}")]
    Validation(String),

    /// The vector backend is unreachable or refused the operation.
    #[error("vector store unavailable: {0}")]
    StoreUnavailable(String),

    /// A remote model service failed (transport error, timeout, or bad status).
    #[error("{service} service error: {message}")]
    Upstream {
        service: &'static str,
        message: String,
    },

    /// A remote response did not match any known shape.
    #[error("unparseable response: {0}")]
    Parse(String),

    /// Stored and query embedding dimensions disagree.
    #[error("embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// Anything unanticipated.
    #[error("internal error: {0}")]
    Internal(String),
}

impl RagError {
    /// Shorthand for an upstream failure of a named service.
    pub fn upstream(service: &'static str, err: impl std::fmt::Display) -> Self {
        Self::Upstream {
            service,
            message: err.to_string(),
        }
    }
}
