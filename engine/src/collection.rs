//! The collection façade tying the engine components together.

use std::sync::Arc;

use tracing::{debug, info};
use vecstore_embeddings::EmbeddingProvider;

use crate::backend::BackendAdapter;
use crate::cache::{BoundedCache, CacheStats};
use crate::config::CollectionConfig;
use crate::dimension::Dimension;
use crate::error::{EngineError, Result};
use crate::ingest::{BatchIngestionPipeline, IngestReport};
use crate::query::{QueryPlanner, QuerySpec};
use crate::record::VectorRecord;

/// One logical collection of records stored in a backend.
///
/// Share between tasks with `Arc<VectorCollection<_>>`; every operation
/// takes `&self`.
pub struct VectorCollection<B: BackendAdapter> {
    config: CollectionConfig,
    provider: Arc<dyn EmbeddingProvider>,
    backend: B,
    cache: BoundedCache,
    dimension: Dimension,
    planner: QueryPlanner,
}

impl<B: BackendAdapter> VectorCollection<B> {
    /// Create a collection. Fails if `config` is invalid.
    pub fn new(
        config: CollectionConfig,
        provider: Arc<dyn EmbeddingProvider>,
        backend: B,
    ) -> Result<Self> {
        config.validate()?;

        let dimension = match config.dimension {
            Some(d) => Dimension::fixed(d),
            None => Dimension::unknown(),
        };
        let cache = BoundedCache::with_policy(config.cache_capacity, config.eviction_policy);
        let planner = QueryPlanner::new(&config);

        info!(
            "Opened collection {} on {} backend with {} provider",
            config.name,
            backend.name(),
            provider.name()
        );

        Ok(Self {
            config,
            provider,
            backend,
            cache,
            dimension,
            planner,
        })
    }

    pub fn config(&self) -> &CollectionConfig {
        &self.config
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// The collection dimension, if established.
    pub fn dimension(&self) -> Option<usize> {
        self.dimension.get()
    }

    /// Establish the dimension by probing the provider if it is not known
    /// yet. Concurrent callers share one probe.
    pub async fn initialize(&self) -> Result<usize> {
        self.dimension.get_or_probe(self.provider.as_ref()).await
    }

    /// Embed, validate and store `documents`. See [`BatchIngestionPipeline`].
    pub async fn ingest(&self, documents: Vec<VectorRecord>) -> Result<IngestReport> {
        BatchIngestionPipeline::new(self.config.batch_size, &self.dimension, &self.cache)
            .ingest(documents, self.provider.as_ref(), &self.backend)
            .await
    }

    /// Run a similarity query.
    ///
    /// An empty result means nothing matched; a backend failure is an `Err`.
    pub async fn query(&self, spec: &QuerySpec) -> Result<Vec<VectorRecord>> {
        let dimension = self.dimension.get().ok_or(EngineError::NotInitialized)?;
        let query = self
            .planner
            .plan(spec, self.provider.as_ref(), Some(dimension))
            .await?;

        let mut candidates = self.backend.search(&query).await?;
        debug!(
            "{} returned {} candidates for k={}",
            self.backend.name(),
            candidates.len(),
            query.k
        );

        for candidate in candidates.iter_mut().filter(|c| !c.record.has_vector()) {
            if let Some(cached) = self.cache.get(&candidate.record.id) {
                candidate.record.vector = cached.vector;
            }
        }

        Ok(self
            .planner
            .rank(candidates, &query, self.backend.native_metric()))
    }

    /// Fetch a record by id, from the cache or else the backend.
    pub async fn get(&self, id: &str) -> Result<Option<VectorRecord>> {
        if let Some(record) = self.cache.get(id) {
            return Ok(Some(record));
        }

        let found = self
            .backend
            .get(&[id.to_string()])
            .await?
            .into_iter()
            .find(|r| r.id == id);
        if let Some(record) = &found {
            self.cache.put(record.id.clone(), record.clone());
        }
        Ok(found)
    }

    /// Delete records by id, returning how many the backend removed.
    pub async fn delete(&self, ids: &[String]) -> Result<u64> {
        if ids.is_empty() {
            return Ok(0);
        }
        let removed = self.backend.delete(ids).await?;
        for id in ids {
            self.cache.remove(id);
        }
        debug!("Deleted {removed} of {} requested records", ids.len());
        Ok(removed)
    }

    /// Number of records stored in the backend.
    pub async fn count(&self) -> Result<u64> {
        Ok(self.backend.count().await?)
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// Drop every cached record. Stored data is unaffected.
    pub fn clear_cache(&self) {
        self.cache.clear();
    }
}
