//! # Similarity Engine
//!
//! A backend-agnostic core for embedding-backed vector stores:
//!
//! - **Similarity**: scoring and distance under eight metrics
//! - **Ingestion**: embedding, validation and batched inserts with
//!   per-document failure reports
//! - **Caching**: a bounded least-recently-used record cache
//! - **Querying**: planning, filtering, ranking and pagination
//!
//! Storage lives behind [`BackendAdapter`]; embedding generation lives
//! behind [`EmbeddingProvider`](vecstore_embeddings::EmbeddingProvider).
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                      VectorCollection                           │
//! ├─────────────────────────────────────────────────────────────────┤
//! │                                                                 │
//! │  ingest ──► BatchIngestionPipeline ──┐                          │
//! │                   │                  │                          │
//! │                   ▼                  ▼                          │
//! │           EmbeddingProvider    BoundedCache                     │
//! │                   ▲                  ▲                          │
//! │                   │                  │                          │
//! │  query  ──► QueryPlanner::plan       │                          │
//! │                   │                  │                          │
//! │                   ▼                  │                          │
//! │            BackendAdapter ──► candidates ──► QueryPlanner::rank │
//! │                                                                 │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use vecstore_embeddings::{OpenAIConfig, OpenAIProvider};
//! use vecstore_engine::{CollectionConfig, InMemoryBackend, QuerySpec, VectorCollection, VectorRecord};
//!
//! let provider = Arc::new(OpenAIProvider::new(OpenAIConfig::from_env())?);
//! let collection = VectorCollection::new(
//!     CollectionConfig::from_env("VECSTORE")?,
//!     provider,
//!     InMemoryBackend::default(),
//! )?;
//!
//! collection.ingest(vec![VectorRecord::new("Rust is fast")]).await?;
//! let results = collection.query(&QuerySpec::from_text("systems languages", 5)).await?;
//! ```

pub mod backend;
pub mod cache;
pub mod collection;
pub mod config;
pub mod dimension;
pub mod error;
pub mod filter;
pub mod ingest;
pub mod query;
pub mod record;
pub mod similarity;

pub use backend::{BackendAdapter, BackendError, Candidate, InMemoryBackend, InsertOutcome};
pub use cache::{BoundedCache, CacheStats, EvictionPolicy};
pub use collection::VectorCollection;
pub use config::CollectionConfig;
pub use error::{EngineError, Result};
pub use filter::{Filter, TagFilter, TimeRange};
pub use ingest::{BatchIngestionPipeline, FailureReason, IngestFailure, IngestReport};
pub use query::{NormalizedQuery, QueryInput, QueryPlanner, QuerySpec};
pub use record::{Metadata, VectorRecord};
pub use similarity::Metric;

/// A dense vector, as produced by an embedding provider.
pub type Vector = vecstore_embeddings::Embedding;
