//! The canonical document/vector entity shared by every backend.

use std::collections::{BTreeSet, HashMap};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::Vector;

/// Opaque key/value metadata attached to a record.
pub type Metadata = HashMap<String, serde_json::Value>;

/// A document with its embedding and metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorRecord {
    /// Unique identifier within a collection. Empty means "generate one".
    #[serde(default)]
    pub id: String,

    /// Source text. May be empty only when `vector` is supplied.
    #[serde(default)]
    pub content: String,

    /// Embedding. Empty means "embed `content` on ingest".
    #[serde(default)]
    pub vector: Vector,

    #[serde(default)]
    pub metadata: Metadata,

    #[serde(default)]
    pub tags: BTreeSet<String>,

    /// Creation/update time.
    #[serde(default = "chrono::Utc::now")]
    pub timestamp: DateTime<Utc>,

    /// Similarity assigned during ranking; never set on the write path.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
}

impl VectorRecord {
    /// Create a record from text; the id is generated on ingest.
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            id: String::new(),
            content: content.into(),
            vector: Vec::new(),
            metadata: Metadata::new(),
            tags: BTreeSet::new(),
            timestamp: Utc::now(),
            score: None,
        }
    }

    /// Create a record with a pre-computed vector and no text.
    pub fn from_vector(id: impl Into<String>, vector: Vector) -> Self {
        Self::new(String::new()).with_id(id).with_vector(vector)
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_vector(mut self, vector: Vector) -> Self {
        self.vector = vector;
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.insert(tag.into());
        self
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Whether the record still needs an id assigned.
    pub fn has_id(&self) -> bool {
        !self.id.is_empty()
    }

    /// Whether the record carries an embedding.
    pub fn has_vector(&self) -> bool {
        !self.vector.is_empty()
    }

    /// Assign a fresh UUID if the record has no id yet.
    pub(crate) fn ensure_id(&mut self) {
        if !self.has_id() {
            self.id = uuid::Uuid::new_v4().to_string();
        }
    }
}
