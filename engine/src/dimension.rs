//! Per-collection vector dimension.
//!
//! The dimension is either configured up front or learned once, from the
//! first valid vector ingested or from a single provider probe. Once set it
//! never changes.

use tokio::sync::OnceCell;
use tracing::info;
use vecstore_embeddings::EmbeddingProvider;

use crate::error::{EngineError, Result};

const PROBE_TEXT: &str = "dimension probe";

/// Write-once dimension shared by concurrent ingest and query calls.
#[derive(Debug, Default)]
pub struct Dimension {
    cell: OnceCell<usize>,
}

impl Dimension {
    /// A dimension that is already established.
    pub fn fixed(dimension: usize) -> Self {
        Self {
            cell: OnceCell::new_with(Some(dimension)),
        }
    }

    /// A dimension to be learned later.
    pub fn unknown() -> Self {
        Self::default()
    }

    pub fn get(&self) -> Option<usize> {
        self.cell.get().copied()
    }

    /// Establish the dimension from an observed vector length unless it is
    /// already set. Returns the effective dimension, which differs from
    /// `observed` when another caller won the race.
    pub async fn establish(&self, observed: usize) -> usize {
        if let Some(dimension) = self.get() {
            return dimension;
        }
        *self
            .cell
            .get_or_init(|| async move {
                info!("Collection dimension established from data: {observed}");
                observed
            })
            .await
    }

    /// Establish the dimension by asking the provider, at most once.
    ///
    /// Lock-free when already set. Concurrent callers wait on a single probe
    /// instead of each calling the provider.
    pub async fn get_or_probe(&self, provider: &dyn EmbeddingProvider) -> Result<usize> {
        if let Some(dimension) = self.get() {
            return Ok(dimension);
        }
        let dimension = *self
            .cell
            .get_or_try_init(|| async {
                if let Some(hint) = provider.dimension_hint() {
                    info!("Collection dimension from {} hint: {hint}", provider.name());
                    return Ok(hint);
                }
                let probe = provider.embed_query(PROBE_TEXT).await?;
                if probe.is_empty() {
                    return Err(EngineError::InvalidVector(format!(
                        "{} returned an empty probe embedding",
                        provider.name()
                    )));
                }
                info!(
                    "Collection dimension probed from {}: {}",
                    provider.name(),
                    probe.len()
                );
                Ok(probe.len())
            })
            .await?;
        Ok(dimension)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use vecstore_embeddings::{Embedding, EmbeddingError};

    use super::*;

    struct CountingProvider {
        calls: AtomicUsize,
        dimension: usize,
    }

    #[async_trait]
    impl EmbeddingProvider for CountingProvider {
        fn name(&self) -> &str {
            "counting"
        }

        async fn embed_documents(
            &self,
            texts: &[String],
        ) -> vecstore_embeddings::Result<Vec<Embedding>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::task::yield_now().await;
            Ok(texts.iter().map(|_| vec![0.5; self.dimension]).collect())
        }
    }

    struct BrokenProvider;

    #[async_trait]
    impl EmbeddingProvider for BrokenProvider {
        fn name(&self) -> &str {
            "broken"
        }

        async fn embed_documents(
            &self,
            _texts: &[String],
        ) -> vecstore_embeddings::Result<Vec<Embedding>> {
            Err(EmbeddingError::ApiRequest("down".to_string()))
        }
    }

    #[tokio::test]
    async fn test_establish_first_wins() {
        let dimension = Dimension::unknown();
        assert_eq!(dimension.get(), None);
        assert_eq!(dimension.establish(3).await, 3);
        assert_eq!(dimension.establish(5).await, 3);
        assert_eq!(Dimension::fixed(8).establish(3).await, 8);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_probes_call_provider_once() {
        let provider = Arc::new(CountingProvider {
            calls: AtomicUsize::new(0),
            dimension: 6,
        });
        let dimension = Arc::new(Dimension::unknown());

        let mut handles = Vec::new();
        for _ in 0..16 {
            let provider = Arc::clone(&provider);
            let dimension = Arc::clone(&dimension);
            handles.push(tokio::spawn(async move {
                dimension.get_or_probe(provider.as_ref()).await
            }));
        }
        for handle in handles {
            assert_eq!(handle.await.unwrap().unwrap(), 6);
        }

        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failed_probe_leaves_dimension_unset() {
        let dimension = Dimension::unknown();
        let err = dimension.get_or_probe(&BrokenProvider).await.unwrap_err();
        assert!(matches!(err, EngineError::Provider(_)));
        assert_eq!(dimension.get(), None);
    }
}
