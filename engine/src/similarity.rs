//! Similarity and distance computation between vectors.
//!
//! Every metric is a pair of pure functions looked up through
//! [`Metric::kernel`]. Adding a metric means adding a variant and a kernel;
//! nothing else in the engine dispatches on the metric.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};

/// Components with an absolute value above this are members of the set
/// Jaccard compares.
pub const JACCARD_THRESHOLD: f64 = 0.0;

/// A named function for comparing two vectors.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    /// `dot(a,b) / (‖a‖·‖b‖)`, range `[-1, 1]`.
    #[default]
    Cosine,
    /// L2 distance; similarity `1/(1+d)`.
    Euclidean,
    /// L1 distance; similarity `1/(1+d)`.
    Manhattan,
    /// Raw inner product, may be negative.
    DotProduct,
    /// L∞ distance; similarity `1/(1+d)`.
    Chebyshev,
    /// Count of differing components; similarity `1 - d/n`.
    Hamming,
    /// Set overlap of thresholded components, range `[0, 1]`.
    Jaccard,
    /// Sample correlation coefficient, range `[-1, 1]`.
    Pearson,
}

type Kernel = fn(&[f64], &[f64]) -> f64;

/// The similarity/distance function pair behind a [`Metric`].
///
/// Kernels assume validated input: equal, non-zero length and finite
/// components.
#[derive(Clone, Copy)]
pub struct MetricKernel {
    pub similarity: Kernel,
    pub distance: Kernel,
}

static COSINE: MetricKernel = MetricKernel {
    similarity: cosine_kernel,
    distance: cosine_distance_kernel,
};
static EUCLIDEAN: MetricKernel = MetricKernel {
    similarity: euclidean_similarity_kernel,
    distance: euclidean_kernel,
};
static MANHATTAN: MetricKernel = MetricKernel {
    similarity: manhattan_similarity_kernel,
    distance: manhattan_kernel,
};
static DOT_PRODUCT: MetricKernel = MetricKernel {
    similarity: dot_kernel,
    distance: negative_dot_kernel,
};
static CHEBYSHEV: MetricKernel = MetricKernel {
    similarity: chebyshev_similarity_kernel,
    distance: chebyshev_kernel,
};
static HAMMING: MetricKernel = MetricKernel {
    similarity: hamming_similarity_kernel,
    distance: hamming_kernel,
};
static JACCARD: MetricKernel = MetricKernel {
    similarity: jaccard_kernel,
    distance: jaccard_distance_kernel,
};
static PEARSON: MetricKernel = MetricKernel {
    similarity: pearson_kernel,
    distance: pearson_distance_kernel,
};

impl Metric {
    /// Every supported metric.
    pub const ALL: [Metric; 8] = [
        Metric::Cosine,
        Metric::Euclidean,
        Metric::Manhattan,
        Metric::DotProduct,
        Metric::Chebyshev,
        Metric::Hamming,
        Metric::Jaccard,
        Metric::Pearson,
    ];

    pub fn kernel(self) -> &'static MetricKernel {
        match self {
            Metric::Cosine => &COSINE,
            Metric::Euclidean => &EUCLIDEAN,
            Metric::Manhattan => &MANHATTAN,
            Metric::DotProduct => &DOT_PRODUCT,
            Metric::Chebyshev => &CHEBYSHEV,
            Metric::Hamming => &HAMMING,
            Metric::Jaccard => &JACCARD,
            Metric::Pearson => &PEARSON,
        }
    }

    /// Whether the metric is natively a distance (smaller is closer) and its
    /// similarity is derived from it.
    pub fn is_distance_based(self) -> bool {
        matches!(
            self,
            Metric::Euclidean | Metric::Manhattan | Metric::Chebyshev | Metric::Hamming
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Metric::Cosine => "cosine",
            Metric::Euclidean => "euclidean",
            Metric::Manhattan => "manhattan",
            Metric::DotProduct => "dot_product",
            Metric::Chebyshev => "chebyshev",
            Metric::Hamming => "hamming",
            Metric::Jaccard => "jaccard",
            Metric::Pearson => "pearson",
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Metric {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self> {
        let normalized = s.trim().to_ascii_lowercase().replace('-', "_");
        let metric = match normalized.as_str() {
            "cosine" => Metric::Cosine,
            "euclidean" | "l2" => Metric::Euclidean,
            "manhattan" | "l1" => Metric::Manhattan,
            "dot_product" | "dot" | "inner_product" => Metric::DotProduct,
            "chebyshev" | "linf" => Metric::Chebyshev,
            "hamming" => Metric::Hamming,
            "jaccard" => Metric::Jaccard,
            "pearson" => Metric::Pearson,
            _ => return Err(EngineError::Config(format!("unknown metric: {s}"))),
        };
        Ok(metric)
    }
}

/// Reject empty vectors and vectors with NaN or infinite components.
pub fn validate_vector(v: &[f64]) -> Result<()> {
    if v.is_empty() {
        return Err(EngineError::InvalidVector("vector is empty".to_string()));
    }
    if let Some(pos) = v.iter().position(|x| !x.is_finite()) {
        return Err(EngineError::InvalidVector(format!(
            "non-finite component {} at index {pos}",
            v[pos]
        )));
    }
    Ok(())
}

fn validate_pair(a: &[f64], b: &[f64]) -> Result<()> {
    if a.len() != b.len() {
        return Err(EngineError::DimensionMismatch {
            expected: a.len(),
            actual: b.len(),
        });
    }
    validate_vector(a)?;
    validate_vector(b)
}

fn finite(value: f64, metric: Metric) -> Result<f64> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(EngineError::InvalidVector(format!(
            "{metric} produced a non-finite value"
        )))
    }
}

/// Similarity between `a` and `b` under `metric`. Higher is closer.
pub fn score(a: &[f64], b: &[f64], metric: Metric) -> Result<f64> {
    validate_pair(a, b)?;
    finite((metric.kernel().similarity)(a, b), metric)
}

/// Distance between `a` and `b` under `metric`. Lower is closer.
///
/// Non-negative for every metric except [`Metric::DotProduct`], whose
/// distance is the negated inner product.
pub fn distance(a: &[f64], b: &[f64], metric: Metric) -> Result<f64> {
    validate_pair(a, b)?;
    finite((metric.kernel().distance)(a, b), metric)
}

/// Compute the cosine similarity between two vectors.
///
/// Returns `0.0` when either vector has zero magnitude.
pub fn cosine_similarity(a: &[f64], b: &[f64]) -> Result<f64> {
    score(a, b, Metric::Cosine)
}

/// Compute the euclidean distance between two vectors.
pub fn euclidean_distance(a: &[f64], b: &[f64]) -> Result<f64> {
    distance(a, b, Metric::Euclidean)
}

/// Compute the dot product between two vectors.
pub fn dot_product(a: &[f64], b: &[f64]) -> Result<f64> {
    score(a, b, Metric::DotProduct)
}

/// Normalize a vector to unit length. Zero vectors are left unchanged.
pub fn normalize(vector: &mut [f64]) {
    let magnitude = vector.iter().map(|x| x * x).sum::<f64>().sqrt();
    if magnitude > 0.0 {
        for x in vector.iter_mut() {
            *x /= magnitude;
        }
    }
}

fn dot_kernel(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

fn negative_dot_kernel(a: &[f64], b: &[f64]) -> f64 {
    -dot_kernel(a, b)
}

fn cosine_kernel(a: &[f64], b: &[f64]) -> f64 {
    // Scaling each side by its largest component keeps the squares finite
    // and leaves the angle unchanged.
    let scale_a = max_abs(a);
    let scale_b = max_abs(b);
    if scale_a == 0.0 || scale_b == 0.0 {
        return 0.0;
    }

    let mut dot = 0.0;
    let mut norm_a = 0.0;
    let mut norm_b = 0.0;
    for (x, y) in a.iter().zip(b) {
        let x = x / scale_a;
        let y = y / scale_b;
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    (dot / (norm_a.sqrt() * norm_b.sqrt())).clamp(-1.0, 1.0)
}

fn max_abs(v: &[f64]) -> f64 {
    v.iter().fold(0.0, |max, x| max.max(x.abs()))
}

fn cosine_distance_kernel(a: &[f64], b: &[f64]) -> f64 {
    1.0 - cosine_kernel(a, b)
}

fn euclidean_kernel(a: &[f64], b: &[f64]) -> f64 {
    let scale = chebyshev_kernel(a, b);
    if scale == 0.0 {
        return 0.0;
    }
    let sum = a
        .iter()
        .zip(b)
        .map(|(x, y)| ((x - y) / scale).powi(2))
        .sum::<f64>();
    scale * sum.sqrt()
}

fn euclidean_similarity_kernel(a: &[f64], b: &[f64]) -> f64 {
    1.0 / (1.0 + euclidean_kernel(a, b))
}

fn manhattan_kernel(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| (x - y).abs()).sum()
}

fn manhattan_similarity_kernel(a: &[f64], b: &[f64]) -> f64 {
    1.0 / (1.0 + manhattan_kernel(a, b))
}

fn chebyshev_kernel(a: &[f64], b: &[f64]) -> f64 {
    a.iter()
        .zip(b)
        .map(|(x, y)| (x - y).abs())
        .fold(0.0, f64::max)
}

fn chebyshev_similarity_kernel(a: &[f64], b: &[f64]) -> f64 {
    1.0 / (1.0 + chebyshev_kernel(a, b))
}

fn hamming_kernel(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).filter(|(x, y)| x != y).count() as f64
}

fn hamming_similarity_kernel(a: &[f64], b: &[f64]) -> f64 {
    1.0 - hamming_kernel(a, b) / a.len() as f64
}

fn jaccard_kernel(a: &[f64], b: &[f64]) -> f64 {
    let mut intersection = 0usize;
    let mut union = 0usize;
    for (x, y) in a.iter().zip(b) {
        let in_a = x.abs() > JACCARD_THRESHOLD;
        let in_b = y.abs() > JACCARD_THRESHOLD;
        if in_a || in_b {
            union += 1;
            if in_a && in_b {
                intersection += 1;
            }
        }
    }
    if union == 0 {
        0.0
    } else {
        intersection as f64 / union as f64
    }
}

fn jaccard_distance_kernel(a: &[f64], b: &[f64]) -> f64 {
    1.0 - jaccard_kernel(a, b)
}

fn pearson_kernel(a: &[f64], b: &[f64]) -> f64 {
    // Correlation is undefined for constant vectors.
    if is_constant(a) || is_constant(b) {
        return if a == b { 1.0 } else { 0.0 };
    }

    // Correlation is invariant under positive scaling of either side.
    let scale_a = max_abs(a);
    let scale_b = max_abs(b);
    let n = a.len() as f64;
    let mean_a = a.iter().map(|x| x / scale_a).sum::<f64>() / n;
    let mean_b = b.iter().map(|y| y / scale_b).sum::<f64>() / n;

    let mut covariance = 0.0;
    let mut variance_a = 0.0;
    let mut variance_b = 0.0;
    for (x, y) in a.iter().zip(b) {
        let da = x / scale_a - mean_a;
        let db = y / scale_b - mean_b;
        covariance += da * db;
        variance_a += da * da;
        variance_b += db * db;
    }
    if variance_a == 0.0 || variance_b == 0.0 {
        return 0.0;
    }

    (covariance / (variance_a.sqrt() * variance_b.sqrt())).clamp(-1.0, 1.0)
}

fn is_constant(v: &[f64]) -> bool {
    v.windows(2).all(|w| w[0] == w[1])
}

fn pearson_distance_kernel(a: &[f64], b: &[f64]) -> f64 {
    1.0 - pearson_kernel(a, b)
}
