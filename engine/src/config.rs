//! Per-collection configuration.
//!
//! A [`CollectionConfig`] is an explicit value handed to
//! [`VectorCollection::new`](crate::VectorCollection::new). Loading it from
//! the environment or a TOML document happens at the edge, through the
//! `from_*` constructors, never inside engine logic.

use std::fmt::Display;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::cache::EvictionPolicy;
use crate::error::{EngineError, Result};
use crate::similarity::Metric;

pub const DEFAULT_BATCH_SIZE: usize = 100;
pub const DEFAULT_CACHE_CAPACITY: usize = 1000;

/// Configuration for one collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CollectionConfig {
    /// Collection name, for logs.
    pub name: String,

    /// Vector dimension. `None` learns it from the first embedding.
    pub dimension: Option<usize>,

    /// Metric used when a query does not name one.
    pub default_metric: Metric,

    /// Ingestion chunk size.
    pub batch_size: usize,

    /// Maximum cached records; `0` disables the cache.
    pub cache_capacity: usize,

    /// Default similarity cutoff for queries.
    pub similarity_threshold: Option<f64>,

    pub eviction_policy: EvictionPolicy,

    /// Use backend-native scores as-is when they are computed under the
    /// query metric.
    pub trust_backend_scores: bool,
}

impl Default for CollectionConfig {
    fn default() -> Self {
        Self {
            name: "default".to_string(),
            dimension: None,
            default_metric: Metric::Cosine,
            batch_size: DEFAULT_BATCH_SIZE,
            cache_capacity: DEFAULT_CACHE_CAPACITY,
            similarity_threshold: None,
            eviction_policy: EvictionPolicy::Lru,
            trust_backend_scores: false,
        }
    }
}

impl CollectionConfig {
    /// Create a configuration with default values.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_dimension(mut self, dimension: usize) -> Self {
        self.dimension = Some(dimension);
        self
    }

    pub fn with_metric(mut self, metric: Metric) -> Self {
        self.default_metric = metric;
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_cache_capacity(mut self, capacity: usize) -> Self {
        self.cache_capacity = capacity;
        self
    }

    pub fn with_similarity_threshold(mut self, threshold: f64) -> Self {
        self.similarity_threshold = Some(threshold);
        self
    }

    pub fn with_eviction_policy(mut self, policy: EvictionPolicy) -> Self {
        self.eviction_policy = policy;
        self
    }

    pub fn trusting_backend_scores(mut self) -> Self {
        self.trust_backend_scores = true;
        self
    }

    /// Check invariants the engine relies on.
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(EngineError::Config(
                "batch_size must be greater than zero".to_string(),
            ));
        }
        if self.dimension == Some(0) {
            return Err(EngineError::Config(
                "dimension must be greater than zero".to_string(),
            ));
        }
        if self.similarity_threshold.is_some_and(|t| !t.is_finite()) {
            return Err(EngineError::Config(
                "similarity_threshold must be finite".to_string(),
            ));
        }
        Ok(())
    }

    /// Parse and validate a TOML document. Missing keys take defaults.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(content).map_err(|e| EngineError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Read `{PREFIX}_*` variables from the process environment.
    pub fn from_env(prefix: &str) -> Result<Self> {
        Self::from_lookup(prefix, |key| std::env::var(key).ok())
    }

    /// Build a configuration from `{PREFIX}_NAME`, `_DIMENSION`,
    /// `_DEFAULT_METRIC`, `_BATCH_SIZE`, `_CACHE_CAPACITY`,
    /// `_SIMILARITY_THRESHOLD`, `_EVICTION_POLICY` and
    /// `_TRUST_BACKEND_SCORES`, looked up through `lookup`. Unset variables
    /// keep their defaults.
    pub fn from_lookup<F>(prefix: &str, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |suffix: &str| {
            let key = format!("{prefix}_{suffix}");
            lookup(&key).map(|raw| (key, raw))
        };

        let mut config = Self::default();
        if let Some((_, name)) = var("NAME") {
            config.name = name;
        }
        if let Some((key, raw)) = var("DIMENSION") {
            config.dimension = Some(parse(&key, &raw)?);
        }
        if let Some((key, raw)) = var("DEFAULT_METRIC") {
            config.default_metric = parse(&key, &raw)?;
        }
        if let Some((key, raw)) = var("BATCH_SIZE") {
            config.batch_size = parse(&key, &raw)?;
        }
        if let Some((key, raw)) = var("CACHE_CAPACITY") {
            config.cache_capacity = parse(&key, &raw)?;
        }
        if let Some((key, raw)) = var("SIMILARITY_THRESHOLD") {
            config.similarity_threshold = Some(parse(&key, &raw)?);
        }
        if let Some((key, raw)) = var("EVICTION_POLICY") {
            config.eviction_policy = parse(&key, &raw)?;
        }
        if let Some((key, raw)) = var("TRUST_BACKEND_SCORES") {
            config.trust_backend_scores = parse(&key, &raw)?;
        }

        config.validate()?;
        Ok(config)
    }
}

impl FromStr for EvictionPolicy {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "lru" => Ok(EvictionPolicy::Lru),
            "clear_on_overflow" | "clear" => Ok(EvictionPolicy::ClearOnOverflow),
            _ => Err(EngineError::Config(format!("unknown eviction policy: {s}"))),
        }
    }
}

fn parse<T>(key: &str, raw: &str) -> Result<T>
where
    T: FromStr,
    T::Err: Display,
{
    raw.trim()
        .parse()
        .map_err(|e| EngineError::Config(format!("invalid {key}={raw}: {e}")))
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use pretty_assertions::assert_eq;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_are_valid() {
        let config = CollectionConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.batch_size, DEFAULT_BATCH_SIZE);
        assert_eq!(config.default_metric, Metric::Cosine);
        assert_eq!(config.eviction_policy, EvictionPolicy::Lru);
    }

    #[test]
    fn test_from_lookup() {
        let config = CollectionConfig::from_lookup(
            "DOCS",
            lookup_from(&[
                ("DOCS_NAME", "articles"),
                ("DOCS_DIMENSION", "384"),
                ("DOCS_DEFAULT_METRIC", "euclidean"),
                ("DOCS_BATCH_SIZE", "500"),
                ("DOCS_CACHE_CAPACITY", "64"),
                ("DOCS_SIMILARITY_THRESHOLD", "0.75"),
                ("DOCS_EVICTION_POLICY", "clear-on-overflow"),
                ("DOCS_TRUST_BACKEND_SCORES", "true"),
                ("OTHER_BATCH_SIZE", "1"),
            ]),
        )
        .unwrap();

        assert_eq!(
            config,
            CollectionConfig {
                name: "articles".to_string(),
                dimension: Some(384),
                default_metric: Metric::Euclidean,
                batch_size: 500,
                cache_capacity: 64,
                similarity_threshold: Some(0.75),
                eviction_policy: EvictionPolicy::ClearOnOverflow,
                trust_backend_scores: true,
            }
        );
    }

    #[test]
    fn test_from_lookup_rejects_bad_values() {
        let err = CollectionConfig::from_lookup("X", lookup_from(&[("X_BATCH_SIZE", "many")]))
            .unwrap_err();
        assert!(matches!(err, EngineError::Config(ref msg) if msg.contains("X_BATCH_SIZE")));

        let err = CollectionConfig::from_lookup("X", lookup_from(&[("X_BATCH_SIZE", "0")]))
            .unwrap_err();
        assert!(matches!(err, EngineError::Config(_)));

        let err =
            CollectionConfig::from_lookup("X", lookup_from(&[("X_DEFAULT_METRIC", "cosmic")]))
                .unwrap_err();
        assert!(matches!(err, EngineError::Config(_)));
    }

    #[test]
    fn test_from_toml_str() {
        let config = CollectionConfig::from_toml_str(
            r#"
            name = "notes"
            dimension = 3
            default_metric = "dot_product"
            eviction_policy = "clear_on_overflow"
            "#,
        )
        .unwrap();

        assert_eq!(config.name, "notes");
        assert_eq!(config.dimension, Some(3));
        assert_eq!(config.default_metric, Metric::DotProduct);
        assert_eq!(config.eviction_policy, EvictionPolicy::ClearOnOverflow);
        assert_eq!(config.cache_capacity, DEFAULT_CACHE_CAPACITY);

        assert!(CollectionConfig::from_toml_str("dimension = 0").is_err());
        assert!(CollectionConfig::from_toml_str("batch_size = \"big\"").is_err());
    }
}
