//! Integration tests for the collection façade.
//!
//! These exercise ingestion, querying, read-through caching and deletion
//! end to end against the in-memory backend and a wrapper that behaves like
//! a remote store which never returns vectors.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use anyhow::Result;
use async_trait::async_trait;
use chrono::{Duration, Utc};
use pretty_assertions::assert_eq;
use vecstore_embeddings::{Embedding, EmbeddingProvider};
use vecstore_engine::backend::BackendResult;
use vecstore_engine::{
    BackendAdapter, BackendError, Candidate, CollectionConfig, EngineError, Filter,
    InMemoryBackend, InsertOutcome, Metric, NormalizedQuery, QuerySpec, TagFilter, TimeRange,
    VectorCollection, VectorRecord,
};

const TOPICS: [&str; 3] = ["rust", "python", "cooking"];

/// Embeds text as a bag of known topics.
#[derive(Default)]
struct TopicProvider {
    calls: AtomicUsize,
}

#[async_trait]
impl EmbeddingProvider for TopicProvider {
    fn name(&self) -> &str {
        "topics"
    }

    async fn embed_documents(&self, texts: &[String]) -> vecstore_embeddings::Result<Vec<Embedding>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(texts
            .iter()
            .map(|text| {
                let text = text.to_lowercase();
                TOPICS
                    .iter()
                    .map(|topic| if text.contains(topic) { 1.0 } else { 0.0 })
                    .collect()
            })
            .collect())
    }
}

/// A store that scores nothing itself and returns records without vectors.
#[derive(Default)]
struct VectorlessBackend {
    inner: InMemoryBackend,
    gets: AtomicUsize,
    down: AtomicBool,
}

#[async_trait]
impl BackendAdapter for VectorlessBackend {
    fn name(&self) -> &str {
        "vectorless"
    }

    async fn insert(&self, batch: &[VectorRecord]) -> BackendResult<Vec<InsertOutcome>> {
        self.inner.insert(batch).await
    }

    async fn search(&self, query: &NormalizedQuery) -> BackendResult<Vec<Candidate>> {
        if self.down.load(Ordering::SeqCst) {
            return Err(BackendError::Unavailable("connection reset".to_string()));
        }
        let candidates = self.inner.search(query).await?;
        Ok(candidates
            .into_iter()
            .map(|c| {
                let mut record = c.record;
                record.vector.clear();
                Candidate::new(record)
            })
            .collect())
    }

    async fn get(&self, ids: &[String]) -> BackendResult<Vec<VectorRecord>> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        self.inner.get(ids).await
    }

    async fn delete(&self, ids: &[String]) -> BackendResult<u64> {
        self.inner.delete(ids).await
    }

    async fn count(&self) -> BackendResult<u64> {
        self.inner.count().await
    }
}

fn ids(records: &[VectorRecord]) -> Vec<&str> {
    records.iter().map(|r| r.id.as_str()).collect()
}

fn memory_collection(config: CollectionConfig) -> Result<VectorCollection<InMemoryBackend>> {
    Ok(VectorCollection::new(
        config,
        Arc::new(TopicProvider::default()),
        InMemoryBackend::default(),
    )?)
}

fn corpus() -> Vec<VectorRecord> {
    let now = Utc::now();
    vec![
        VectorRecord::new("Rust ownership explained")
            .with_id("rust-intro")
            .with_metadata("lang", "en")
            .with_metadata("stars", 5)
            .with_tag("programming")
            .with_timestamp(now - Duration::days(2)),
        VectorRecord::new("Python and Rust interop")
            .with_id("pyo3")
            .with_metadata("lang", "en")
            .with_metadata("stars", 3)
            .with_tag("programming")
            .with_tag("interop")
            .with_timestamp(now - Duration::days(30)),
        VectorRecord::new("Cooking pasta")
            .with_id("pasta")
            .with_metadata("lang", "it")
            .with_tag("food")
            .with_timestamp(now),
    ]
}

#[tokio::test]
async fn test_cosine_top_k() -> Result<()> {
    let collection = memory_collection(CollectionConfig::default().with_dimension(2))?;
    collection
        .ingest(vec![
            VectorRecord::from_vector("a", vec![1.0, 0.0]),
            VectorRecord::from_vector("b", vec![0.0, 1.0]),
            VectorRecord::from_vector("c", vec![0.7, 0.7]),
        ])
        .await?;

    let results = collection
        .query(&QuerySpec::from_vector(vec![1.0, 0.0], 2))
        .await?;

    assert_eq!(ids(&results), vec!["a", "c"]);
    assert!((results[0].score.unwrap_or_default() - 1.0).abs() < 1e-12);
    assert!((results[1].score.unwrap_or_default() - 0.7071).abs() < 1e-4);
    Ok(())
}

#[tokio::test]
async fn test_text_ingest_and_filtered_queries() -> Result<()> {
    let collection = memory_collection(CollectionConfig::new("articles"))?;
    let report = collection.ingest(corpus()).await?;
    assert_eq!(report.succeeded, 3);
    assert_eq!(collection.dimension(), Some(3));

    let results = collection
        .query(&QuerySpec::from_text("rust", 10).with_metadata("lang", "en"))
        .await?;
    assert_eq!(ids(&results), vec!["rust-intro", "pyo3"]);

    let results = collection
        .query(&QuerySpec::from_text("rust", 10).with_tags(TagFilter::all(["programming", "interop"])))
        .await?;
    assert_eq!(ids(&results), vec!["pyo3"]);

    let results = collection
        .query(
            &QuerySpec::from_text("rust", 10)
                .with_time_range(TimeRange::since(Utc::now() - Duration::days(7)))
                .with_filter(Filter::gte("stars", 4.0)),
        )
        .await?;
    assert_eq!(ids(&results), vec!["rust-intro"]);
    Ok(())
}

#[tokio::test]
async fn test_no_match_is_empty_ok() -> Result<()> {
    let collection = memory_collection(CollectionConfig::default())?;
    collection.ingest(corpus()).await?;

    let results = collection
        .query(&QuerySpec::from_text("rust", 5).with_metadata("lang", "fr"))
        .await?;
    assert!(results.is_empty());

    let results = collection
        .query(&QuerySpec::from_text("rust", 5).with_similarity_threshold(1.01))
        .await?;
    assert!(results.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_query_validation_and_initialization() -> Result<()> {
    let collection = memory_collection(CollectionConfig::default())?;

    let err = collection
        .query(&QuerySpec::from_text("rust", 3))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::NotInitialized));

    assert_eq!(collection.initialize().await?, 3);

    let err = collection
        .query(&QuerySpec::from_vector(Vec::new(), 3))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Validation(_)));

    let err = collection
        .query(&QuerySpec::from_vector(vec![1.0, 0.0, 0.0], 0))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Validation(_)));

    let err = collection
        .query(&QuerySpec::from_vector(vec![1.0, 0.0], 3))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        EngineError::DimensionMismatch {
            expected: 3,
            actual: 2
        }
    ));
    Ok(())
}

#[tokio::test]
async fn test_metric_override_and_pagination() -> Result<()> {
    let collection = VectorCollection::new(
        CollectionConfig::default().with_metric(Metric::Euclidean),
        Arc::new(TopicProvider::default()),
        InMemoryBackend::new(Metric::Euclidean),
    )?;
    collection
        .ingest(
            (0..6)
                .map(|i| VectorRecord::from_vector(format!("p{i}"), vec![i as f64, 0.0]))
                .collect(),
        )
        .await?;

    let results = collection
        .query(&QuerySpec::from_vector(vec![0.0, 0.0], 4).with_page(1, 2))
        .await?;
    assert_eq!(ids(&results), vec!["p1", "p2"]);
    assert!(results.iter().all(|r| r.vector.is_empty()));

    let results = collection
        .query(
            &QuerySpec::from_vector(vec![0.0, 0.0], 10)
                .with_distance_threshold(2.5)
                .with_vectors(),
        )
        .await?;
    assert_eq!(ids(&results), vec!["p0", "p1", "p2"]);
    assert_eq!(results[2].vector, vec![2.0, 0.0]);
    Ok(())
}

#[tokio::test]
async fn test_query_metric_override_on_cosine_backend() -> Result<()> {
    let collection = memory_collection(CollectionConfig::default())?;
    collection
        .ingest(vec![
            VectorRecord::from_vector("far_same_direction", vec![10.0, 0.0]),
            VectorRecord::from_vector("near", vec![1.0, 0.5]),
        ])
        .await?;

    let results = collection
        .query(&QuerySpec::from_vector(vec![1.0, 0.0], 1).with_metric(Metric::Euclidean))
        .await?;
    assert_eq!(ids(&results), vec!["near"]);
    assert!((results[0].score.unwrap_or_default() - 1.0 / 1.5).abs() < 1e-12);

    let results = collection
        .query(&QuerySpec::from_vector(vec![1.0, 0.0], 1))
        .await?;
    assert_eq!(ids(&results), vec!["far_same_direction"]);
    Ok(())
}

#[tokio::test]
async fn test_vectorless_candidates_are_filled_from_cache() -> Result<()> {
    let collection = VectorCollection::new(
        CollectionConfig::default(),
        Arc::new(TopicProvider::default()),
        VectorlessBackend::default(),
    )?;
    collection.ingest(corpus()).await?;

    let results = collection.query(&QuerySpec::from_text("cooking", 3)).await?;
    assert_eq!(results[0].id, "pasta");
    assert_eq!(results[0].score, Some(1.0));

    // Without cached vectors the candidates cannot be scored.
    collection.clear_cache();
    let results = collection.query(&QuerySpec::from_text("cooking", 3)).await?;
    assert!(results.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_get_reads_through_and_populates_cache() -> Result<()> {
    let collection = VectorCollection::new(
        CollectionConfig::default(),
        Arc::new(TopicProvider::default()),
        VectorlessBackend::default(),
    )?;
    collection.ingest(corpus()).await?;

    let cached = collection.get("pasta").await?;
    assert_eq!(cached.map(|r| r.vector), Some(vec![0.0, 0.0, 1.0]));
    assert_eq!(collection.backend().gets.load(Ordering::SeqCst), 0);

    collection.clear_cache();
    assert!(collection.get("pasta").await?.is_some());
    assert!(collection.get("pasta").await?.is_some());
    assert_eq!(collection.backend().gets.load(Ordering::SeqCst), 1);

    assert!(collection.get("missing").await?.is_none());
    Ok(())
}

#[tokio::test]
async fn test_delete_invalidates_cache() -> Result<()> {
    let collection = memory_collection(CollectionConfig::default())?;
    collection.ingest(corpus()).await?;
    assert!(collection.get("pyo3").await?.is_some());

    let removed = collection
        .delete(&["pyo3".to_string(), "unknown".to_string()])
        .await?;
    assert_eq!(removed, 1);
    assert!(collection.get("pyo3").await?.is_none());
    assert_eq!(collection.count().await?, 2);
    Ok(())
}

#[tokio::test]
async fn test_backend_failure_is_an_error() -> Result<()> {
    let collection = VectorCollection::new(
        CollectionConfig::default().with_dimension(3),
        Arc::new(TopicProvider::default()),
        VectorlessBackend::default(),
    )?;
    collection.backend().down.store(true, Ordering::SeqCst);

    let err = collection
        .query(&QuerySpec::from_text("rust", 3))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        EngineError::Backend(BackendError::Unavailable(_))
    ));
    Ok(())
}

#[tokio::test]
async fn test_cache_capacity_bounds_memory() -> Result<()> {
    let collection = memory_collection(CollectionConfig::default().with_cache_capacity(2))?;
    collection
        .ingest(vec![
            VectorRecord::from_vector("x", vec![1.0]),
            VectorRecord::from_vector("y", vec![2.0]),
            VectorRecord::from_vector("z", vec![3.0]),
        ])
        .await?;

    let stats = collection.cache_stats();
    assert_eq!(stats.entries, 2);
    assert_eq!(stats.evictions, 1);
    assert_eq!(collection.count().await?, 3);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_ingest_and_query() -> Result<()> {
    let collection = Arc::new(memory_collection(
        CollectionConfig::default().with_batch_size(7),
    )?);

    let mut handles = Vec::new();
    for task in 0..8 {
        let collection = Arc::clone(&collection);
        handles.push(tokio::spawn(async move {
            let documents = (0..50)
                .map(|i| VectorRecord::new(format!("rust note {task}-{i}")))
                .collect();
            collection.ingest(documents).await
        }));
    }
    for handle in handles {
        let report = handle.await??;
        assert_eq!(report.succeeded, 50);
        assert_eq!(report.batches, 8);
    }

    assert_eq!(collection.count().await?, 400);
    assert_eq!(collection.dimension(), Some(3));

    let results = collection.query(&QuerySpec::from_text("rust", 10)).await?;
    assert_eq!(results.len(), 10);
    Ok(())
}
