// src/analysis/density.rs
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

pub const DEFAULT_TOLERANCE: f64 = 1e-5;

/// Discrete density: strictly increasing masses and the share of the pooled
/// sample that fell into each bucket.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct EmpiricalDensity {
    pub values: Vec<f64>,
    pub probabilities: Vec<f64>,
    pub sample_count: usize,
}

impl EmpiricalDensity {
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn points(&self) -> impl Iterator<Item = (f64, f64)> + '_ {
        self.values.iter().copied().zip(self.probabilities.iter().copied())
    }

    /// Probability-weighted mean and standard deviation of the bucket values.
    pub fn moments(&self) -> (f64, f64) {
        let weight: f64 = self.probabilities.iter().sum();
        let mean = self.points().map(|(x, p)| x * p).sum::<f64>() / weight;
        let variance = self.points().map(|(x, p)| p * (x - mean).powi(2)).sum::<f64>() / weight;
        (mean, variance.sqrt())
    }
}

/// Sort `masses` in place and bucket them in a single sweep.
///
/// A bucket is anchored at its first (smallest) mass and takes every
/// following mass closer than `tolerance` to that anchor. Because distance is
/// measured from the anchor, a slowly drifting run of masses can be split
/// across several buckets even when neighbours are within tolerance.
pub fn build(masses: &mut [f64], tolerance: f64) -> Result<EmpiricalDensity> {
    if !tolerance.is_finite() || tolerance <= 0.0 {
        return Err(Error::configuration(
            "accuracy",
            tolerance,
            "tolerance must be a positive number",
        ));
    }
    if let Some((index, &value)) = masses.iter().enumerate().find(|(_, m)| !m.is_finite()) {
        return Err(Error::InvalidSample { index, value });
    }

    masses.sort_unstable_by(f64::total_cmp);

    let total = masses.len();
    let mut values = Vec::new();
    let mut probabilities = Vec::new();

    let mut start = 0;
    while start < total {
        let anchor = masses[start];
        let mut end = start;
        while end < total && (masses[end] - anchor).abs() < tolerance {
            end += 1;
        }

        values.push(anchor);
        probabilities.push((end - start) as f64 / total as f64);
        start = end;
    }

    Ok(EmpiricalDensity {
        values,
        probabilities,
        sample_count: total,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    #[test]
    fn test_constant_sample_is_single_point() {
        let mut masses = vec![5.0; 1000];
        let density = build(&mut masses, DEFAULT_TOLERANCE).unwrap();
        assert_eq!(density.values, vec![5.0]);
        assert_eq!(density.probabilities, vec![1.0]);
        assert_eq!(density.sample_count, 1000);
    }

    #[test]
    fn test_values_increase_and_probabilities_sum_to_one() {
        let mut rng = StdRng::seed_from_u64(21);
        let mut masses: Vec<f64> = (0..5000).map(|_| rng.gen_range(0.0..3.0)).collect();
        let density = build(&mut masses, 0.01).unwrap();

        assert!(density.values.windows(2).all(|w| w[0] < w[1]));
        let total: f64 = density.probabilities.iter().sum();
        assert!((total - 1.0).abs() < 1e-9, "probabilities sum to {}", total);
        assert_eq!(density.sample_count, 5000);
    }

    #[test]
    fn test_groups_near_equal_values() {
        let mut masses = vec![2.0, 1.0, 1.0 + 1e-7, 2.0 + 5e-6, 3.0];
        let density = build(&mut masses, DEFAULT_TOLERANCE).unwrap();
        assert_eq!(density.values, vec![1.0, 2.0, 3.0]);
        assert_eq!(density.probabilities, vec![0.4, 0.4, 0.2]);
    }

    #[test]
    fn test_drift_splits_at_anchor_distance() {
        // Neighbours are 0.6 apart, but 1.2 is 1.2 away from the anchor 0.0
        let mut masses = vec![0.0, 0.6, 1.2];
        let density = build(&mut masses, 1.0).unwrap();
        assert_eq!(density.values, vec![0.0, 1.2]);
        assert_relative_eq!(density.probabilities[0], 2.0 / 3.0);
        assert_relative_eq!(density.probabilities[1], 1.0 / 3.0);
    }

    #[test]
    fn test_empty_sample() {
        let density = build(&mut [], DEFAULT_TOLERANCE).unwrap();
        assert!(density.is_empty());
        assert_eq!(density.sample_count, 0);
    }

    #[test]
    fn test_rejects_nan_and_bad_tolerance() {
        assert!(matches!(
            build(&mut [1.0, f64::NAN], DEFAULT_TOLERANCE),
            Err(Error::InvalidSample { index: 1, .. })
        ));
        assert!(build(&mut [1.0], 0.0).is_err());
    }

    #[test]
    fn test_moments() {
        let density = EmpiricalDensity {
            values: vec![1.0, 3.0],
            probabilities: vec![0.5, 0.5],
            sample_count: 2,
        };
        assert_eq!(density.moments(), (2.0, 1.0));
    }
}
