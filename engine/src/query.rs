//! Query planning and result ranking.
//!
//! A query goes through two steps around the backend call:
//!
//! 1. [`QueryPlanner::plan`] validates a [`QuerySpec`], resolves its vector
//!    and compiles its constraints into a [`NormalizedQuery`].
//! 2. [`QueryPlanner::rank`] re-scores, thresholds, sorts and paginates the
//!    raw candidates the backend returned.

use std::cmp::Reverse;

use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use vecstore_embeddings::EmbeddingProvider;

use crate::Vector;
use crate::backend::Candidate;
use crate::config::CollectionConfig;
use crate::error::{EngineError, Result};
use crate::filter::{Filter, TagFilter, TimeRange};
use crate::record::{Metadata, VectorRecord};
use crate::similarity::{self, Metric};

/// What to search with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryInput {
    /// A ready-made query vector.
    Vector(Vector),
    /// Text to embed with the collection's provider.
    Text(String),
}

/// A caller's search request. Built per call and never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuerySpec {
    pub query: QueryInput,

    /// Number of nearest results to keep. Must be positive.
    pub k: usize,

    /// Drop results scoring below this. Falls back to the collection default.
    pub similarity_threshold: Option<f64>,

    /// Drop results farther than this (only checked when the candidate's
    /// vector is known).
    pub distance_threshold: Option<f64>,

    /// Falls back to the collection default.
    pub metric: Option<Metric>,

    /// Exact-match constraints on metadata keys.
    pub metadata_filter: Metadata,

    pub tag_filter: Option<TagFilter>,

    pub time_range: Option<TimeRange>,

    /// Arbitrary extra predicate, combined with the above by conjunction.
    pub filter: Option<Filter>,

    /// Results to skip after truncation to `k`.
    pub offset: usize,

    /// Page size after `offset`; `None` returns the rest.
    pub limit: Option<usize>,

    /// Keep vectors on returned records.
    pub include_vectors: bool,
}

impl QuerySpec {
    fn new(query: QueryInput, k: usize) -> Self {
        Self {
            query,
            k,
            similarity_threshold: None,
            distance_threshold: None,
            metric: None,
            metadata_filter: Metadata::new(),
            tag_filter: None,
            time_range: None,
            filter: None,
            offset: 0,
            limit: None,
            include_vectors: false,
        }
    }

    /// Search with a pre-computed vector.
    pub fn from_vector(vector: Vector, k: usize) -> Self {
        Self::new(QueryInput::Vector(vector), k)
    }

    /// Search with text embedded at plan time.
    pub fn from_text(text: impl Into<String>, k: usize) -> Self {
        Self::new(QueryInput::Text(text.into()), k)
    }

    pub fn with_metric(mut self, metric: Metric) -> Self {
        self.metric = Some(metric);
        self
    }

    pub fn with_similarity_threshold(mut self, threshold: f64) -> Self {
        self.similarity_threshold = Some(threshold);
        self
    }

    pub fn with_distance_threshold(mut self, threshold: f64) -> Self {
        self.distance_threshold = Some(threshold);
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.metadata_filter.insert(key.into(), value.into());
        self
    }

    pub fn with_tags(mut self, tags: TagFilter) -> Self {
        self.tag_filter = Some(tags);
        self
    }

    pub fn with_time_range(mut self, range: TimeRange) -> Self {
        self.time_range = Some(range);
        self
    }

    pub fn with_filter(mut self, filter: Filter) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn with_page(mut self, offset: usize, limit: usize) -> Self {
        self.offset = offset;
        self.limit = Some(limit);
        self
    }

    pub fn with_vectors(mut self) -> Self {
        self.include_vectors = true;
        self
    }
}

/// A validated query with its vector resolved and defaults applied. This is
/// what backend adapters translate into their native query language.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedQuery {
    pub vector: Vector,
    pub k: usize,
    pub metric: Metric,
    pub filter: Option<Filter>,
    pub similarity_threshold: Option<f64>,
    pub distance_threshold: Option<f64>,
    pub offset: usize,
    pub limit: Option<usize>,
    pub include_vectors: bool,
}

/// Builds normalized queries and ranks backend candidates.
#[derive(Debug, Clone)]
pub struct QueryPlanner {
    default_metric: Metric,
    default_similarity_threshold: Option<f64>,
    trust_backend_scores: bool,
}

impl QueryPlanner {
    pub fn new(config: &CollectionConfig) -> Self {
        Self {
            default_metric: config.default_metric,
            default_similarity_threshold: config.similarity_threshold,
            trust_backend_scores: config.trust_backend_scores,
        }
    }

    /// Validate `spec` and resolve it into a [`NormalizedQuery`].
    ///
    /// `dimension` is the collection dimension; when known, the query vector
    /// must match it.
    pub async fn plan(
        &self,
        spec: &QuerySpec,
        provider: &dyn EmbeddingProvider,
        dimension: Option<usize>,
    ) -> Result<NormalizedQuery> {
        if spec.k == 0 {
            return Err(EngineError::Validation(
                "k must be greater than zero".to_string(),
            ));
        }
        if spec.limit == Some(0) {
            return Err(EngineError::Validation(
                "limit must be greater than zero".to_string(),
            ));
        }
        for (name, value) in [
            ("similarity threshold", spec.similarity_threshold),
            ("distance threshold", spec.distance_threshold),
        ] {
            if value.is_some_and(|v| !v.is_finite()) {
                return Err(EngineError::Validation(format!("{name} must be finite")));
            }
        }

        let vector = match &spec.query {
            QueryInput::Vector(vector) => vector.clone(),
            QueryInput::Text(text) => {
                if text.trim().is_empty() {
                    return Err(EngineError::Validation("query text is empty".to_string()));
                }
                debug!("Embedding query text with {}", provider.name());
                provider.embed_query(text).await?
            }
        };
        if vector.is_empty() {
            return Err(EngineError::Validation("query vector is empty".to_string()));
        }
        similarity::validate_vector(&vector)?;
        if let Some(expected) = dimension.filter(|d| *d != vector.len()) {
            return Err(EngineError::DimensionMismatch {
                expected,
                actual: vector.len(),
            });
        }

        let filter = Filter::compile(
            &spec.metadata_filter,
            spec.tag_filter.as_ref(),
            spec.time_range.as_ref(),
            spec.filter.as_ref(),
        );
        if let Some(filter) = &filter {
            filter.validate()?;
        }

        Ok(NormalizedQuery {
            vector,
            k: spec.k,
            metric: spec.metric.unwrap_or(self.default_metric),
            filter,
            similarity_threshold: spec
                .similarity_threshold
                .or(self.default_similarity_threshold),
            distance_threshold: spec.distance_threshold,
            offset: spec.offset,
            limit: spec.limit,
            include_vectors: spec.include_vectors,
        })
    }

    /// Score, threshold, sort and paginate backend candidates.
    ///
    /// `native_metric` is the metric behind the backend's own scores. Those
    /// scores are used directly only when trusted and computed under the
    /// query metric; otherwise candidates with a known vector are re-scored
    /// locally. Candidates that can be scored neither way are dropped.
    ///
    /// Ties keep the backend's candidate order.
    pub fn rank(
        &self,
        candidates: Vec<Candidate>,
        query: &NormalizedQuery,
        native_metric: Option<Metric>,
    ) -> Vec<VectorRecord> {
        let total = candidates.len();
        let native_matches = native_metric == Some(query.metric);
        let mut scored: Vec<(OrderedFloat<f64>, VectorRecord)> = Vec::with_capacity(total);

        for Candidate {
            mut record,
            native_score,
        } in candidates
        {
            let native = native_score.filter(|s| native_matches && s.is_finite());
            let score = match native {
                Some(score) if self.trust_backend_scores => score,
                _ if record.has_vector() => {
                    match similarity::score(&query.vector, &record.vector, query.metric) {
                        Ok(score) => score,
                        Err(e) => {
                            warn!("Dropping candidate {}: {e}", record.id);
                            continue;
                        }
                    }
                }
                Some(score) => score,
                None => {
                    debug!("Dropping candidate {} with no vector or usable score", record.id);
                    continue;
                }
            };

            if query.similarity_threshold.is_some_and(|min| score < min) {
                continue;
            }
            if let (Some(max), true) = (query.distance_threshold, record.has_vector()) {
                match similarity::distance(&query.vector, &record.vector, query.metric) {
                    Ok(d) if d <= max => {}
                    Ok(_) => continue,
                    Err(e) => {
                        warn!("Dropping candidate {}: {e}", record.id);
                        continue;
                    }
                }
            }

            record.score = Some(score);
            if !query.include_vectors {
                record.vector.clear();
            }
            scored.push((OrderedFloat(score), record));
        }

        // Stable: equal scores keep candidate order.
        scored.sort_by_key(|(score, _)| Reverse(*score));
        scored.truncate(query.k);

        let results: Vec<VectorRecord> = scored
            .into_iter()
            .skip(query.offset)
            .take(query.limit.unwrap_or(usize::MAX))
            .map(|(_, record)| record)
            .collect();

        debug!(
            "Ranked {total} candidates into {} results under {}",
            results.len(),
            query.metric
        );
        results
    }
}
