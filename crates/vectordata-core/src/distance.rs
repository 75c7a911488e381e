//! Distance metrics and score normalization.
//!
//! Every metric is expressed as a distance where lower is more similar, so
//! ranking code never branches on the metric. Scores are derived from
//! distances and always increase with similarity. They are not
//! probabilities.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Distance metric pinned to a collection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DistanceMetric {
    /// Cosine distance (`1 - cosine_similarity`).
    /// Best for text embeddings, insensitive to magnitude.
    #[default]
    Cosine,

    /// Euclidean distance (L2 norm of the difference).
    L2,

    /// Negated inner product, so that smaller means more similar.
    InnerProduct,
}

impl DistanceMetric {
    /// Returns the canonical lowercase name stored in schemas and registries.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Cosine => "cosine",
            Self::L2 => "l2",
            Self::InnerProduct => "inner_product",
        }
    }

    /// Computes the distance between `a` and `b`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DimensionMismatch`] if the vectors differ in length.
    pub fn distance(&self, a: &[f32], b: &[f32]) -> Result<f64> {
        if a.len() != b.len() {
            return Err(Error::DimensionMismatch {
                expected: a.len(),
                actual: b.len(),
            });
        }
        Ok(match self {
            Self::Cosine => cosine_distance(a, b),
            Self::L2 => l2_distance(a, b),
            Self::InnerProduct => -dot(a, b),
        })
    }

    /// Converts a distance into a score where higher is better.
    #[must_use]
    pub fn score(&self, distance: f64) -> f64 {
        match self {
            Self::Cosine => 1.0 - distance,
            Self::L2 => 1.0 / (1.0 + distance),
            Self::InnerProduct => -distance,
        }
    }
}

impl fmt::Display for DistanceMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DistanceMetric {
    type Err = Error;

    /// Parses a metric name read back from storage.
    ///
    /// No default is applied here: an empty or unknown name is a schema
    /// mismatch once a collection exists.
    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "cosine" => Ok(Self::Cosine),
            "l2" => Ok(Self::L2),
            "inner_product" => Ok(Self::InnerProduct),
            other => Err(Error::SchemaMismatch(format!(
                "unsupported distance metric '{other}'"
            ))),
        }
    }
}

fn dot(a: &[f32], b: &[f32]) -> f64 {
    a.iter()
        .zip(b)
        .map(|(x, y)| f64::from(*x) * f64::from(*y))
        .sum()
}

fn cosine_distance(a: &[f32], b: &[f32]) -> f64 {
    let mut dot = 0.0_f64;
    let mut norm_a = 0.0_f64;
    let mut norm_b = 0.0_f64;
    for (x, y) in a.iter().zip(b) {
        let (x, y) = (f64::from(*x), f64::from(*y));
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 1.0;
    }
    1.0 - dot / (norm_a.sqrt() * norm_b.sqrt())
}

fn l2_distance(a: &[f32], b: &[f32]) -> f64 {
    a.iter()
        .zip(b)
        .map(|(x, y)| {
            let d = f64::from(*x) - f64::from(*y);
            d * d
        })
        .sum::<f64>()
        .sqrt()
}
