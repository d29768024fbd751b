//! Summary statistics over chunk-level values

use serde::{Deserialize, Serialize};

/// Statistics summary of a slice of values, NaN entries excluded
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StatsSummary {
    /// Number of non-NaN observations
    pub count: usize,
    /// Minimum value
    pub min: f64,
    /// Maximum value
    pub max: f64,
    /// Mean value
    pub mean: f64,
    /// Population standard deviation (ddof = 0)
    pub std_dev: f64,
}

impl StatsSummary {
    /// Create a summary from a slice of values
    pub fn from_values(values: &[f64]) -> Self {
        let finite: Vec<f64> = values.iter().copied().filter(|v| !v.is_nan()).collect();
        if finite.is_empty() {
            return Self {
                count: 0,
                min: f64::NAN,
                max: f64::NAN,
                mean: f64::NAN,
                std_dev: f64::NAN,
            };
        }

        let count = finite.len();
        let mean = finite.iter().sum::<f64>() / count as f64;
        let min = finite.iter().copied().fold(f64::INFINITY, f64::min);
        let max = finite.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let variance = finite.iter().map(|&x| (x - mean).powi(2)).sum::<f64>() / count as f64;

        Self {
            count,
            min,
            max,
            mean,
            std_dev: variance.sqrt(),
        }
    }
}

/// Mean of the non-NaN values, NaN when there are none
pub fn nan_mean(values: &[f64]) -> f64 {
    StatsSummary::from_values(values).mean
}

/// Population standard deviation of the non-NaN values
pub fn nan_std(values: &[f64]) -> f64 {
    StatsSummary::from_values(values).std_dev
}

/// Population standard deviation of a slice with no NaN filtering
pub(crate) fn population_std(values: &[f64]) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    (values.iter().map(|&x| (x - mean).powi(2)).sum::<f64>() / n).sqrt()
}
