//! Batched document ingestion.
//!
//! Ingestion never fails a whole call because of one bad document. Every
//! per-document problem (missing text, provider error, wrong dimension,
//! rejected insert) lands in the [`IngestReport`]; only call-level
//! preconditions such as an unreachable backend surface as `Err`.

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};
use vecstore_embeddings::EmbeddingProvider;

use crate::Vector;
use crate::backend::{BackendAdapter, InsertOutcome};
use crate::cache::BoundedCache;
use crate::dimension::Dimension;
use crate::error::{EngineError, Result};
use crate::record::VectorRecord;
use crate::similarity;

/// Why a single document was not ingested.
#[derive(Error, Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FailureReason {
    #[error("document has no content and no vector")]
    EmptyContent,

    #[error("embedding failed: {message}")]
    Provider { message: String },

    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("invalid vector: {message}")]
    InvalidVector { message: String },

    #[error("backend rejected document: {message}")]
    Backend { message: String },
}

impl FailureReason {
    fn provider(message: impl Into<String>) -> Self {
        Self::Provider {
            message: message.into(),
        }
    }

    fn backend(message: impl Into<String>) -> Self {
        Self::Backend {
            message: message.into(),
        }
    }
}

impl From<EngineError> for FailureReason {
    fn from(error: EngineError) -> Self {
        match error {
            EngineError::DimensionMismatch { expected, actual } => {
                Self::DimensionMismatch { expected, actual }
            }
            EngineError::InvalidVector(message) => Self::InvalidVector { message },
            EngineError::Provider(e) => Self::provider(e.to_string()),
            EngineError::Backend(e) => Self::backend(e.to_string()),
            other => Self::InvalidVector {
                message: other.to_string(),
            },
        }
    }
}

/// A document that was not ingested.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IngestFailure {
    pub id: String,
    pub reason: FailureReason,
}

/// Outcome of one ingest call.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct IngestReport {
    /// Documents stored by the backend.
    pub succeeded: usize,

    pub failures: Vec<IngestFailure>,

    /// Insert batches sent to the backend.
    pub batches: usize,
}

impl IngestReport {
    /// Number of documents that failed.
    pub fn failed(&self) -> usize {
        self.failures.len()
    }

    /// Whether the call touched no documents at all.
    pub fn is_empty(&self) -> bool {
        self.succeeded == 0 && self.failures.is_empty()
    }

    fn fail(&mut self, id: impl Into<String>, reason: FailureReason) {
        let id = id.into();
        warn!("Document {id} not ingested: {reason}");
        self.failures.push(IngestFailure { id, reason });
    }
}

/// Embeds, validates, partitions and stores documents.
///
/// Borrows the collection's dimension and cache so that documents stored
/// here are immediately visible to reads through the same collection.
pub struct BatchIngestionPipeline<'a> {
    batch_size: usize,
    dimension: &'a Dimension,
    cache: &'a BoundedCache,
}

impl<'a> BatchIngestionPipeline<'a> {
    pub fn new(batch_size: usize, dimension: &'a Dimension, cache: &'a BoundedCache) -> Self {
        Self {
            batch_size: batch_size.max(1),
            dimension,
            cache,
        }
    }

    /// Ingest `documents` into `backend`.
    ///
    /// Documents without an id get a UUID. Documents without a vector are
    /// embedded with `provider`. Survivors are inserted in `batch_size`
    /// chunks, in input order, and cached once the backend accepts them.
    pub async fn ingest<B>(
        &self,
        documents: Vec<VectorRecord>,
        provider: &dyn EmbeddingProvider,
        backend: &B,
    ) -> Result<IngestReport>
    where
        B: BackendAdapter + ?Sized,
    {
        let mut report = IngestReport::default();
        if documents.is_empty() {
            return Ok(report);
        }
        let total = documents.len();

        let mut pending = Vec::with_capacity(total);
        for mut document in documents {
            document.ensure_id();
            document.score = None;
            if !document.has_vector() && document.content.trim().is_empty() {
                report.fail(document.id, FailureReason::EmptyContent);
                continue;
            }
            pending.push(document);
        }

        let texts: Vec<String> = pending
            .iter()
            .filter(|d| !d.has_vector())
            .map(|d| d.content.clone())
            .collect();
        let mut embedded = self.embed_missing(texts, provider).await.into_iter();

        // Dimension learned from this call stays local until the backend is
        // known to be reachable.
        let mut expected = self.dimension.get();
        let mut ready = Vec::with_capacity(pending.len());
        for mut document in pending {
            if !document.has_vector() {
                match embedded.next() {
                    Some(Ok(vector)) => document.vector = vector,
                    Some(Err(reason)) => {
                        report.fail(document.id, reason);
                        continue;
                    }
                    None => {
                        report.fail(document.id, FailureReason::provider("no embedding returned"));
                        continue;
                    }
                }
            }
            if let Err(e) = check_vector(&document.vector, &mut expected) {
                report.fail(document.id, e.into());
                continue;
            }
            ready.push(document);
        }

        if ready.is_empty() {
            info!("Ingest finished: 0/{total} documents stored");
            return Ok(report);
        }

        backend.ping().await?;

        // Survivors share one length. A concurrent call may have committed a
        // different dimension since validation.
        let observed = ready[0].vector.len();
        let committed = self.dimension.establish(observed).await;
        if committed != observed {
            for document in ready {
                report.fail(
                    document.id,
                    FailureReason::DimensionMismatch {
                        expected: committed,
                        actual: observed,
                    },
                );
            }
            return Ok(report);
        }

        for (n, batch) in ready.chunks(self.batch_size).enumerate() {
            report.batches += 1;
            debug!(
                "Inserting batch {} ({} documents) into {}",
                n + 1,
                batch.len(),
                backend.name()
            );
            match backend.insert(batch).await {
                Ok(outcomes) if outcomes.len() == batch.len() => {
                    for (document, outcome) in batch.iter().zip(outcomes) {
                        match outcome {
                            InsertOutcome::Inserted => {
                                self.cache.put(document.id.clone(), document.clone());
                                report.succeeded += 1;
                            }
                            InsertOutcome::Failed(message) => {
                                report.fail(document.id.clone(), FailureReason::backend(message));
                            }
                        }
                    }
                }
                Ok(outcomes) => {
                    let message = format!(
                        "{} returned {} outcomes for a batch of {}",
                        backend.name(),
                        outcomes.len(),
                        batch.len()
                    );
                    warn!("Batch {} failed: {message}", n + 1);
                    for document in batch {
                        report.fail(document.id.clone(), FailureReason::backend(message.clone()));
                    }
                }
                Err(e) => {
                    warn!("Batch {} failed: {e}", n + 1);
                    let message = e.to_string();
                    for document in batch {
                        report.fail(document.id.clone(), FailureReason::backend(message.clone()));
                    }
                }
            }
        }

        info!(
            "Ingest finished: {}/{total} documents stored in {} batches, {} failed",
            report.succeeded,
            report.batches,
            report.failed()
        );
        Ok(report)
    }

    /// Embed `texts` in one call, falling back to one call per text so a
    /// single bad input only fails its own document.
    async fn embed_missing(
        &self,
        texts: Vec<String>,
        provider: &dyn EmbeddingProvider,
    ) -> Vec<std::result::Result<Vector, FailureReason>> {
        if texts.is_empty() {
            return Vec::new();
        }

        debug!("Embedding {} documents with {}", texts.len(), provider.name());
        match provider.embed_documents(&texts).await {
            Ok(rows) if rows.len() == texts.len() => return rows.into_iter().map(Ok).collect(),
            Ok(rows) => warn!(
                "{} returned {} embeddings for {} documents, embedding individually",
                provider.name(),
                rows.len(),
                texts.len()
            ),
            Err(e) if texts.len() == 1 => return vec![Err(FailureReason::provider(e.to_string()))],
            Err(e) => warn!(
                "Batch embedding with {} failed, embedding individually: {e}",
                provider.name()
            ),
        }

        let mut results = Vec::with_capacity(texts.len());
        for text in &texts {
            results.push(
                provider
                    .embed_query(text)
                    .await
                    .map_err(|e| FailureReason::provider(e.to_string())),
            );
        }
        results
    }
}

/// Validate a vector and check it against the expected dimension, adopting
/// its length if none is expected yet.
fn check_vector(vector: &[f64], expected: &mut Option<usize>) -> Result<()> {
    similarity::validate_vector(vector)?;
    let dimension = *expected.get_or_insert(vector.len());
    if dimension != vector.len() {
        return Err(EngineError::DimensionMismatch {
            expected: dimension,
            actual: vector.len(),
        });
    }
    Ok(())
}
