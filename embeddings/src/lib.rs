//! # Embeddings
//!
//! Embedding providers for the vecstore similarity engine.
//!
//! The engine never generates embeddings itself. It asks an
//! [`EmbeddingProvider`] to turn text into vectors and treats the provider as
//! an external, possibly network-bound collaborator.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                    Embeddings                                   │
//! ├─────────────────────────────────────────────────────────────────┤
//! │  texts ──► EmbeddingProvider ──► Vec<Embedding>                 │
//! │                  │                                              │
//! │                  ▼                                              │
//! │            OpenAIProvider (HTTP) / caller implementations       │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

pub mod error;
pub mod openai;
pub mod provider;

pub use error::{EmbeddingError, Result};
pub use openai::{OpenAIConfig, OpenAIProvider};
pub use provider::EmbeddingProvider;

/// A dense vector embedding.
pub type Embedding = Vec<f64>;
