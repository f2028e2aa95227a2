//! The embedding provider abstraction.

use async_trait::async_trait;

use crate::Embedding;
use crate::error::{EmbeddingError, Result};

/// Turns text into dense vectors.
///
/// Implementations are expected to be deterministic enough that two calls
/// with identical text in the same session yield vectors of the same
/// dimension. Values need not be bit-identical.
///
/// Calls are assumed to be network-bound. Retries and backoff belong to the
/// implementation; callers never retry on their own.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Get the name of this provider.
    fn name(&self) -> &str;

    /// The dimension this provider is known to produce, if it can be told
    /// without a network call.
    fn dimension_hint(&self) -> Option<usize> {
        None
    }

    /// Embed a list of documents. The output has one vector per input text,
    /// in input order.
    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Embedding>>;

    /// Embed a single query string.
    async fn embed_query(&self, text: &str) -> Result<Embedding> {
        let mut vectors = self.embed_documents(&[text.to_string()]).await?;
        if vectors.len() != 1 {
            return Err(EmbeddingError::InvalidResponse(format!(
                "expected 1 embedding, got {}",
                vectors.len()
            )));
        }
        Ok(vectors.remove(0))
    }
}
