//! Dissimilarity between two embeddings.

use serde::{Deserialize, Serialize};

/// Distance reported for vectors that cannot be compared (length mismatch).
pub const INCOMPARABLE: f32 = f32::INFINITY;

/// Identifier for the distance metric a matcher applies.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DistanceMetric {
    /// L2 distance, the metric face-descriptor models are calibrated for.
    #[default]
    Euclidean,
}

impl DistanceMetric {
    #[inline]
    pub fn distance(&self, a: &[f32], b: &[f32]) -> f32 {
        match self {
            DistanceMetric::Euclidean => euclidean_distance(a, b),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            DistanceMetric::Euclidean => "euclidean",
        }
    }
}

/// `sqrt(Σ (a[i] - b[i])²)`, or [`INCOMPARABLE`] when the lengths differ.
///
/// Squares are accumulated in `f64`; the result is symmetric and exactly zero
/// for identical inputs.
#[inline]
pub fn euclidean_distance(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return INCOMPARABLE;
    }
    let sum: f64 = a
        .iter()
        .zip(b.iter())
        .map(|(&x, &y)| {
            let d = f64::from(x) - f64::from(y);
            d * d
        })
        .sum();
    sum.sqrt() as f32
}

/// `true` for the incomparable sentinel and for NaN (a candidate with NaN
/// components can't be ranked either).
#[inline]
pub fn is_incomparable(distance: f32) -> bool {
    distance.is_infinite() || distance.is_nan()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_vectors_are_zero_apart() {
        let a = [0.12_f32, -0.5, 0.33, 0.9];
        assert_eq!(euclidean_distance(&a, &a), 0.0);
    }

    #[test]
    fn distance_is_symmetric() {
        let a = [0.1_f32, 0.2, -0.3, 0.4, 0.5];
        let b = [-0.2_f32, 0.7, 0.1, 0.0, 0.45];
        assert_eq!(euclidean_distance(&a, &b), euclidean_distance(&b, &a));
    }

    #[test]
    fn three_four_five() {
        assert!((euclidean_distance(&[0.0, 0.0], &[3.0, 4.0]) - 5.0).abs() < 1e-6);
    }

    #[test]
    fn mismatched_lengths_are_incomparable() {
        let d = euclidean_distance(&[0.0, 1.0], &[0.0, 1.0, 2.0]);
        assert_eq!(d, INCOMPARABLE);
        assert!(is_incomparable(d));
    }

    #[test]
    fn empty_vectors_are_zero_apart() {
        assert_eq!(euclidean_distance(&[], &[]), 0.0);
    }

    #[test]
    fn nan_is_incomparable() {
        let d = euclidean_distance(&[f32::NAN], &[0.0]);
        assert!(is_incomparable(d));
        assert!(!is_incomparable(0.4));
    }

    #[test]
    fn metric_dispatch() {
        let metric = DistanceMetric::default();
        assert_eq!(metric.name(), "euclidean");
        assert!((metric.distance(&[1.0], &[0.4]) - 0.6).abs() < 1e-6);
    }
}
