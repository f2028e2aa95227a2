//! Normalized filter tree.
//!
//! Queries carry metadata, tag and time constraints in whatever shape is
//! convenient for callers. The planner compiles them into a single
//! [`Filter`] that a backend adapter translates into its own query language
//! (SQL `WHERE`, a JSON filter body, ...). [`Filter::matches`] is the
//! reference semantics every translation must agree with.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{EngineError, Result};
use crate::record::{Metadata, VectorRecord};

/// An inclusive time window. Open ends are unbounded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

impl TimeRange {
    pub fn new(start: Option<DateTime<Utc>>, end: Option<DateTime<Utc>>) -> Self {
        Self { start, end }
    }

    pub fn between(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self::new(Some(start), Some(end))
    }

    pub fn since(start: DateTime<Utc>) -> Self {
        Self::new(Some(start), None)
    }

    pub fn until(end: DateTime<Utc>) -> Self {
        Self::new(None, Some(end))
    }

    pub fn contains(&self, ts: DateTime<Utc>) -> bool {
        self.start.is_none_or(|start| ts >= start) && self.end.is_none_or(|end| ts <= end)
    }
}

/// Tag constraint of a query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TagFilter {
    /// The record carries at least one of the tags.
    Any(BTreeSet<String>),
    /// The record carries every tag.
    All(BTreeSet<String>),
}

impl TagFilter {
    pub fn any<I, S>(tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        TagFilter::Any(tags.into_iter().map(Into::into).collect())
    }

    pub fn all<I, S>(tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        TagFilter::All(tags.into_iter().map(Into::into).collect())
    }

    fn to_filter(&self) -> Filter {
        match self {
            TagFilter::Any(tags) => Filter::HasAnyTag { tags: tags.clone() },
            TagFilter::All(tags) => Filter::HasAllTags { tags: tags.clone() },
        }
    }
}

/// A boolean predicate over records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Filter {
    And { filters: Vec<Filter> },
    Or { filters: Vec<Filter> },
    Not { filter: Box<Filter> },
    Eq { key: String, value: Value },
    Ne { key: String, value: Value },
    Gt { key: String, value: f64 },
    Gte { key: String, value: f64 },
    Lt { key: String, value: f64 },
    Lte { key: String, value: f64 },
    In { key: String, values: Vec<Value> },
    Exists { key: String },
    HasAnyTag { tags: BTreeSet<String> },
    HasAllTags { tags: BTreeSet<String> },
    TimeRange { range: TimeRange },
}

impl Filter {
    pub fn eq(key: impl Into<String>, value: impl Into<Value>) -> Self {
        Filter::Eq {
            key: key.into(),
            value: value.into(),
        }
    }

    pub fn ne(key: impl Into<String>, value: impl Into<Value>) -> Self {
        Filter::Ne {
            key: key.into(),
            value: value.into(),
        }
    }

    pub fn gt(key: impl Into<String>, value: f64) -> Self {
        Filter::Gt {
            key: key.into(),
            value,
        }
    }

    pub fn gte(key: impl Into<String>, value: f64) -> Self {
        Filter::Gte {
            key: key.into(),
            value,
        }
    }

    pub fn lt(key: impl Into<String>, value: f64) -> Self {
        Filter::Lt {
            key: key.into(),
            value,
        }
    }

    pub fn lte(key: impl Into<String>, value: f64) -> Self {
        Filter::Lte {
            key: key.into(),
            value,
        }
    }

    pub fn is_in(key: impl Into<String>, values: Vec<Value>) -> Self {
        Filter::In {
            key: key.into(),
            values,
        }
    }

    pub fn exists(key: impl Into<String>) -> Self {
        Filter::Exists { key: key.into() }
    }

    pub fn and(filters: Vec<Filter>) -> Self {
        Filter::And { filters }
    }

    pub fn or(filters: Vec<Filter>) -> Self {
        Filter::Or { filters }
    }

    pub fn negate(filter: Filter) -> Self {
        Filter::Not {
            filter: Box::new(filter),
        }
    }

    /// Combine the per-concern constraints of a query into one tree.
    ///
    /// Returns `None` when there is nothing to filter on. Metadata equality
    /// clauses are emitted in key order so the output is deterministic.
    pub fn compile(
        metadata: &Metadata,
        tags: Option<&TagFilter>,
        time_range: Option<&TimeRange>,
        extra: Option<&Filter>,
    ) -> Option<Filter> {
        let mut keys: Vec<&String> = metadata.keys().collect();
        keys.sort();

        let mut clauses: Vec<Filter> = keys
            .into_iter()
            .map(|key| Filter::eq(key.clone(), metadata[key].clone()))
            .collect();
        if let Some(tags) = tags {
            clauses.push(tags.to_filter());
        }
        if let Some(range) = time_range {
            clauses.push(Filter::TimeRange { range: *range });
        }
        if let Some(extra) = extra {
            clauses.push(extra.clone());
        }

        match clauses.len() {
            0 => None,
            1 => clauses.pop(),
            _ => Some(Filter::And { filters: clauses }),
        }
    }

    /// Reject malformed trees: empty keys, empty boolean groups, empty value
    /// or tag sets, non-finite bounds and inverted time ranges.
    pub fn validate(&self) -> Result<()> {
        match self {
            Filter::And { filters } | Filter::Or { filters } => {
                if filters.is_empty() {
                    return Err(invalid("boolean group has no clauses"));
                }
                filters.iter().try_for_each(Filter::validate)
            }
            Filter::Not { filter } => filter.validate(),
            Filter::Eq { key, .. } | Filter::Ne { key, .. } | Filter::Exists { key } => {
                check_key(key)
            }
            Filter::Gt { key, value }
            | Filter::Gte { key, value }
            | Filter::Lt { key, value }
            | Filter::Lte { key, value } => {
                check_key(key)?;
                if !value.is_finite() {
                    return Err(invalid(&format!("non-finite bound for `{key}`")));
                }
                Ok(())
            }
            Filter::In { key, values } => {
                check_key(key)?;
                if values.is_empty() {
                    return Err(invalid(&format!("`in` for `{key}` has no values")));
                }
                Ok(())
            }
            Filter::HasAnyTag { tags } | Filter::HasAllTags { tags } => {
                if tags.is_empty() || tags.iter().any(String::is_empty) {
                    return Err(invalid("tag filter needs non-empty tags"));
                }
                Ok(())
            }
            Filter::TimeRange { range } => match (range.start, range.end) {
                (Some(start), Some(end)) if start > end => {
                    Err(invalid("time range starts after it ends"))
                }
                _ => Ok(()),
            },
        }
    }

    /// Evaluate the filter against a record.
    pub fn matches(&self, record: &VectorRecord) -> bool {
        match self {
            Filter::And { filters } => filters.iter().all(|f| f.matches(record)),
            Filter::Or { filters } => filters.iter().any(|f| f.matches(record)),
            Filter::Not { filter } => !filter.matches(record),
            Filter::Eq { key, value } => record
                .metadata
                .get(key)
                .is_some_and(|actual| values_equal(actual, value)),
            Filter::Ne { key, value } => !record
                .metadata
                .get(key)
                .is_some_and(|actual| values_equal(actual, value)),
            Filter::Gt { key, value } => numeric(record, key).is_some_and(|n| n > *value),
            Filter::Gte { key, value } => numeric(record, key).is_some_and(|n| n >= *value),
            Filter::Lt { key, value } => numeric(record, key).is_some_and(|n| n < *value),
            Filter::Lte { key, value } => numeric(record, key).is_some_and(|n| n <= *value),
            Filter::In { key, values } => record
                .metadata
                .get(key)
                .is_some_and(|actual| values.iter().any(|v| values_equal(actual, v))),
            Filter::Exists { key } => record.metadata.contains_key(key),
            Filter::HasAnyTag { tags } => tags.iter().any(|t| record.tags.contains(t)),
            Filter::HasAllTags { tags } => tags.iter().all(|t| record.tags.contains(t)),
            Filter::TimeRange { range } => range.contains(record.timestamp),
        }
    }
}

fn invalid(msg: &str) -> EngineError {
    EngineError::Validation(format!("malformed filter: {msg}"))
}

fn check_key(key: &str) -> Result<()> {
    if key.trim().is_empty() {
        return Err(invalid("empty metadata key"));
    }
    Ok(())
}

fn numeric(record: &VectorRecord, key: &str) -> Option<f64> {
    record.metadata.get(key).and_then(Value::as_f64)
}

/// JSON equality that treats `1` and `1.0` as the same number.
fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        _ => a == b,
    }
}
