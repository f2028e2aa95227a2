//! Error types for the similarity engine.

use thiserror::Error;

use crate::backend::BackendError;

/// Result type alias for engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;

/// Errors that can occur in the engine.
///
/// Per-record ingestion problems are not reported through this type; they
/// land in the [`IngestReport`](crate::ingest::IngestReport) instead.
#[derive(Error, Debug)]
pub enum EngineError {
    /// The caller supplied an invalid request (bad `k`, empty query vector,
    /// malformed filter).
    #[error("validation error: {0}")]
    Validation(String),

    /// Vector lengths disagree.
    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// Vector is empty or contains NaN/infinite components.
    #[error("invalid vector: {0}")]
    InvalidVector(String),

    /// Embedding generation failed.
    #[error("embedding provider error: {0}")]
    Provider(#[from] vecstore_embeddings::EmbeddingError),

    /// The backend adapter failed.
    #[error("backend error: {0}")]
    Backend(#[from] BackendError),

    /// The collection dimension has not been established yet.
    #[error("collection not initialized: dimension unknown")]
    NotInitialized,

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),
}
