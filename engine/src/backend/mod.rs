//! The storage seam.
//!
//! One [`BackendAdapter`] implementation exists per storage technology. An
//! adapter performs I/O and nothing else: it neither caches nor retries, and
//! its configuration (connection string, credentials, timeouts, table name)
//! is passed to its constructor as an explicit value.

mod memory;

pub use memory::InMemoryBackend;

use async_trait::async_trait;
use thiserror::Error;

use crate::query::NormalizedQuery;
use crate::record::VectorRecord;
use crate::similarity::Metric;

/// Result type alias for adapter calls.
pub type BackendResult<T> = std::result::Result<T, BackendError>;

/// Errors raised by a backend adapter.
#[derive(Error, Debug)]
pub enum BackendError {
    /// The store could not be reached.
    #[error("backend unavailable: {0}")]
    Unavailable(String),

    /// The store refused the request.
    #[error("request rejected: {0}")]
    Rejected(String),

    /// The adapter does not implement this operation.
    #[error("operation not supported: {0}")]
    Unsupported(&'static str),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Per-record result of an insert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    Failed(String),
}

impl InsertOutcome {
    pub fn is_inserted(&self) -> bool {
        matches!(self, InsertOutcome::Inserted)
    }
}

/// A record returned by a backend search before final ranking.
#[derive(Debug, Clone)]
pub struct Candidate {
    /// The stored record. Its vector may be empty if the backend does not
    /// return vectors.
    pub record: VectorRecord,

    /// Similarity computed by the backend under its native metric, if any.
    ///
    /// Higher means closer, on the same scale as
    /// [`similarity::score`](crate::similarity::score). Adapters over
    /// distance-native stores must convert raw distances (for L2, `1/(1+d)`)
    /// before filling this in, or leave it `None`.
    pub native_score: Option<f64>,
}

impl Candidate {
    pub fn new(record: VectorRecord) -> Self {
        Self {
            record,
            native_score: None,
        }
    }

    pub fn with_native_score(mut self, score: f64) -> Self {
        self.native_score = Some(score);
        self
    }
}

/// Storage operations the engine consumes.
///
/// The engine never assumes `search` returns candidates in any order.
#[async_trait]
pub trait BackendAdapter: Send + Sync {
    /// Name of the storage technology, for logs.
    fn name(&self) -> &str;

    /// The metric behind `Candidate::native_score`, if the backend scores.
    fn native_metric(&self) -> Option<Metric> {
        None
    }

    /// Cheap reachability check, run once before an ingest starts writing.
    async fn ping(&self) -> BackendResult<()> {
        Ok(())
    }

    /// Upsert a batch. On `Ok`, returns exactly one outcome per record in
    /// batch order. `Err` means the whole batch failed.
    async fn insert(&self, batch: &[VectorRecord]) -> BackendResult<Vec<InsertOutcome>>;

    /// Return candidates for a planned query. The adapter should apply
    /// `query.filter` natively and return at most `query.k` candidates.
    async fn search(&self, query: &NormalizedQuery) -> BackendResult<Vec<Candidate>>;

    /// Fetch records by id. Missing ids are simply absent from the output.
    async fn get(&self, _ids: &[String]) -> BackendResult<Vec<VectorRecord>> {
        Err(BackendError::Unsupported("get"))
    }

    /// Delete records by id, returning how many existed.
    async fn delete(&self, ids: &[String]) -> BackendResult<u64>;

    /// Number of stored records.
    async fn count(&self) -> BackendResult<u64>;
}
