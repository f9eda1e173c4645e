//! Blend weights over a set of reference images

use serde::Serialize;

use crate::error::{MorphError, Result};

/// Accepted deviation of the weight sum from one
pub const SUM_TOLERANCE: f64 = 1e-6;

/// Slightly negative weights within this bound are snapped to zero
pub const NEGATIVE_TOLERANCE: f64 = 1e-9;

/// Nonnegative weights summing to one, one per blended reference
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct WeightVector(Vec<f64>);

impl WeightVector {
    pub fn new(weights: Vec<f64>) -> Result<Self> {
        if weights.is_empty() {
            return Err(MorphError::EmptyInput("weights"));
        }

        let mut weights = weights;
        for (i, w) in weights.iter_mut().enumerate() {
            if !w.is_finite() {
                return Err(MorphError::InvalidWeights(format!(
                    "weight {} is not finite",
                    i
                )));
            }
            if *w < -NEGATIVE_TOLERANCE {
                return Err(MorphError::InvalidWeights(format!(
                    "weight {} is negative ({})",
                    i, w
                )));
            }
            *w = w.max(0.0);
        }

        let sum: f64 = weights.iter().sum();
        if (sum - 1.0).abs() > SUM_TOLERANCE {
            return Err(MorphError::InvalidWeights(format!(
                "weights sum to {}, expected 1",
                sum
            )));
        }

        Ok(Self(weights))
    }

    /// Barycentric weights of a point on or inside a triangle.
    ///
    /// Round-off negatives are clamped and the result renormalized.
    pub fn from_barycentric(weights: [f64; 3]) -> Result<Self> {
        let clamped: Vec<f64> = weights
            .iter()
            .map(|&w| if w < 0.0 && w >= -NEGATIVE_TOLERANCE { 0.0 } else { w })
            .collect();
        let sum: f64 = clamped.iter().sum();
        if !(sum > 0.0) {
            return Err(MorphError::InvalidWeights(format!(
                "barycentric weights {:?} have no positive mass",
                weights
            )));
        }
        Self::new(clamped.into_iter().map(|w| w / sum).collect())
    }

    /// Equal weight on each of `n` references
    pub fn uniform(n: usize) -> Result<Self> {
        if n == 0 {
            return Err(MorphError::EmptyInput("weights"));
        }
        Ok(Self(vec![1.0 / n as f64; n]))
    }

    /// All weight on reference `index` out of `n`
    pub fn unit(n: usize, index: usize) -> Result<Self> {
        if index >= n {
            return Err(MorphError::InvalidWeights(format!(
                "index {} out of range for {} weights",
                index, n
            )));
        }
        let mut weights = vec![0.0; n];
        weights[index] = 1.0;
        Ok(Self(weights))
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = f64> + '_ {
        self.0.iter().copied()
    }
}
