//! Calibration error over equal-width probability bins

use crate::error::{DriftGuardError, Result};
use ndarray::Array1;
use serde::{Deserialize, Serialize};

/// Scores and outcomes grouped into equal-width probability bins
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationBins {
    /// `n_bins + 1` edges from 0 to 1
    pub edges: Vec<f64>,
    pub mean_probability: Vec<f64>,
    pub positive_rate: Vec<f64>,
    pub counts: Vec<usize>,
}

impl CalibrationBins {
    /// Bin `probs` with their 0/1 `labels`, the last bin being right closed
    pub fn new(probs: &Array1<f64>, labels: &Array1<f64>, n_bins: usize) -> Result<Self> {
        if probs.len() != labels.len() {
            return Err(DriftGuardError::Shape {
                expected: format!("{} labels", probs.len()),
                actual: format!("{} labels", labels.len()),
            });
        }
        if probs.is_empty() {
            return Err(DriftGuardError::invalid("cannot bin an empty set of probabilities"));
        }

        let n_bins = n_bins.max(1);
        let width = 1.0 / n_bins as f64;
        let mut probability_sums = vec![0.0; n_bins];
        let mut positives = vec![0.0; n_bins];
        let mut counts = vec![0usize; n_bins];

        for (&p, &y) in probs.iter().zip(labels.iter()) {
            let bin = ((p.clamp(0.0, 1.0) / width) as usize).min(n_bins - 1);
            probability_sums[bin] += p;
            positives[bin] += y;
            counts[bin] += 1;
        }

        let average = |sums: Vec<f64>| -> Vec<f64> {
            sums.into_iter()
                .zip(&counts)
                .map(|(sum, &count)| if count == 0 { 0.0 } else { sum / count as f64 })
                .collect()
        };

        Ok(Self {
            edges: (0..=n_bins).map(|i| i as f64 * width).collect(),
            mean_probability: average(probability_sums),
            positive_rate: average(positives),
            counts,
        })
    }

    /// Count-weighted mean gap between positive rate and mean probability
    pub fn expected_calibration_error(&self) -> f64 {
        let total: usize = self.counts.iter().sum();
        if total == 0 {
            return 0.0;
        }
        self.counts
            .iter()
            .enumerate()
            .filter(|(_, &count)| count > 0)
            .map(|(bin, &count)| count as f64 * (self.positive_rate[bin] - self.mean_probability[bin]).abs())
            .sum::<f64>()
            / total as f64
    }
}

/// Expected calibration error (ECE) of `probs` against 0/1 `labels`
pub fn expected_calibration_error(probs: &Array1<f64>, labels: &Array1<f64>, n_bins: usize) -> Result<f64> {
    Ok(CalibrationBins::new(probs, labels, n_bins)?.expected_calibration_error())
}
