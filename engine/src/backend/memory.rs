//! In-process reference backend.

use std::cmp::Reverse;
use std::collections::BTreeMap;

use async_trait::async_trait;
use ordered_float::OrderedFloat;
use parking_lot::RwLock;
use tracing::{debug, warn};

use super::{BackendAdapter, BackendResult, Candidate, InsertOutcome};
use crate::query::NormalizedQuery;
use crate::record::VectorRecord;
use crate::similarity::{self, Metric};

/// A backend that keeps records in a map and scores them natively.
///
/// Search ranks under the query's metric, so a metric override never loses
/// true neighbours; `native_score` is only filled in when the query metric is
/// the backend's own.
///
/// Filters are evaluated with [`Filter::matches`](crate::filter::Filter::matches),
/// which makes this the reference every other adapter's translation is
/// compared against.
pub struct InMemoryBackend {
    records: RwLock<BTreeMap<String, VectorRecord>>,
    metric: Metric,
}

impl InMemoryBackend {
    /// Create a backend that scores with `metric`.
    pub fn new(metric: Metric) -> Self {
        Self {
            records: RwLock::new(BTreeMap::new()),
            metric,
        }
    }

    /// Check if an ID is stored.
    pub fn contains(&self, id: &str) -> bool {
        self.records.read().contains_key(id)
    }

    /// Get the number of stored records.
    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    /// Check if the backend is empty.
    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }
}

impl Default for InMemoryBackend {
    fn default() -> Self {
        Self::new(Metric::Cosine)
    }
}

#[async_trait]
impl BackendAdapter for InMemoryBackend {
    fn name(&self) -> &str {
        "memory"
    }

    fn native_metric(&self) -> Option<Metric> {
        Some(self.metric)
    }

    async fn insert(&self, batch: &[VectorRecord]) -> BackendResult<Vec<InsertOutcome>> {
        let mut records = self.records.write();
        let outcomes = batch
            .iter()
            .map(|record| {
                if record.id.is_empty() {
                    return InsertOutcome::Failed("record has no id".to_string());
                }
                let mut stored = record.clone();
                stored.score = None;
                records.insert(stored.id.clone(), stored);
                InsertOutcome::Inserted
            })
            .collect();
        debug!("Stored batch of {} records", batch.len());
        Ok(outcomes)
    }

    async fn search(&self, query: &NormalizedQuery) -> BackendResult<Vec<Candidate>> {
        let records = self.records.read();
        let mut scored: Vec<(OrderedFloat<f64>, &VectorRecord)> = Vec::new();

        // Top-k is selected under the query metric. Scores are reported as
        // native only when that is also the backend metric.
        for record in records.values() {
            if query.filter.as_ref().is_some_and(|f| !f.matches(record)) {
                continue;
            }
            match similarity::score(&query.vector, &record.vector, query.metric) {
                Ok(score) => scored.push((OrderedFloat(score), record)),
                Err(e) => warn!("Skipping record {} during search: {e}", record.id),
            }
        }

        scored.sort_by_key(|(score, _)| Reverse(*score));

        let native = query.metric == self.metric;
        Ok(scored
            .into_iter()
            .take(query.k)
            .map(|(score, record)| {
                let candidate = Candidate::new(record.clone());
                if native {
                    candidate.with_native_score(score.0)
                } else {
                    candidate
                }
            })
            .collect())
    }

    async fn get(&self, ids: &[String]) -> BackendResult<Vec<VectorRecord>> {
        let records = self.records.read();
        Ok(ids.iter().filter_map(|id| records.get(id).cloned()).collect())
    }

    async fn delete(&self, ids: &[String]) -> BackendResult<u64> {
        let mut records = self.records.write();
        let removed = ids.iter().filter(|id| records.remove(*id).is_some()).count();
        Ok(removed as u64)
    }

    async fn count(&self) -> BackendResult<u64> {
        Ok(self.records.read().len() as u64)
    }
}
