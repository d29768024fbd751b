//! Sampling-error models
//!
//! Components are fitted once on reference data and evaluated for any chunk
//! size to build `value ± Z·sampling_error` confidence bands.

pub mod binary;

use crate::classification::{LabeledBatch, ProblemType};
use crate::metrics::{MetricComponent, MetricKind, MetricSettings};
use crate::thresholds::ValueLimits;
use crate::utils::stats::population_std;
use serde::{Deserialize, Serialize};

/// Width multiplier of confidence bands, about 95% coverage
pub const SAMPLING_ERROR_RANGE: f64 = 1.96;

/// How the observation-level std scales with chunk size
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorScaling {
    /// Error of a mean: `std / sqrt(n · fraction)`
    Mean,
    /// Error of a sum: `std · sqrt(n · fraction)`
    Sum,
}

/// Fitted std and relevant-row fraction of a metric
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SamplingErrorComponents {
    pub std: f64,
    pub fraction: f64,
    pub scaling: ErrorScaling,
}

impl SamplingErrorComponents {
    pub fn mean(std: f64, fraction: f64) -> Self {
        Self {
            std,
            fraction,
            scaling: ErrorScaling::Mean,
        }
    }

    pub fn sum(std: f64, fraction: f64) -> Self {
        Self {
            std,
            fraction,
            scaling: ErrorScaling::Sum,
        }
    }

    /// Expected standard error for a chunk of `chunk_size` rows
    pub fn sampling_error(&self, chunk_size: usize) -> f64 {
        let effective = chunk_size as f64 * self.fraction;
        if chunk_size == 0 || !(effective > 0.0) || self.std.is_nan() {
            return f64::NAN;
        }
        match self.scaling {
            ErrorScaling::Mean => self.std / effective.sqrt(),
            ErrorScaling::Sum => self.std * effective.sqrt(),
        }
    }
}

/// Sampling error of one metric component, one entry per one-vs-rest class
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SamplingErrorModel {
    components: Vec<SamplingErrorComponents>,
}

impl SamplingErrorModel {
    pub fn new(components: Vec<SamplingErrorComponents>) -> Self {
        Self { components }
    }

    pub fn components(&self) -> &[SamplingErrorComponents] {
        &self.components
    }

    /// Standard error for a chunk of `chunk_size` rows
    ///
    /// Multiple components combine as `sqrt(Σ se²) / k`. A class with no
    /// relevant reference rows scores a constant 0 and adds no error.
    pub fn sampling_error(&self, chunk_size: usize) -> f64 {
        match self.components.as_slice() {
            [] => f64::NAN,
            [single] => single.sampling_error(chunk_size),
            many => {
                let sum_sq: f64 = many
                    .iter()
                    .filter(|c| c.fraction > 0.0)
                    .map(|c| c.sampling_error(chunk_size).powi(2))
                    .sum();
                sum_sq.sqrt() / many.len() as f64
            }
        }
    }

    /// Fit the model of a metric component on labeled reference rows
    pub fn fit(
        metric: MetricKind,
        component: MetricComponent,
        settings: &MetricSettings,
        problem_type: ProblemType,
        reference: &LabeledBatch,
    ) -> Self {
        let classes: Vec<usize> = match problem_type {
            ProblemType::BinaryClassification => vec![1],
            ProblemType::MulticlassClassification if metric == MetricKind::Accuracy => {
                let correct: Vec<bool> = reference.y_true.iter().zip(&reference.y_pred).map(|(t, p)| t == p).collect();
                let all = vec![true; correct.len()];
                return Self::new(vec![binary::accuracy(&all, &correct)]);
            }
            ProblemType::MulticlassClassification => (0..reference.n_classes).collect(),
        };

        let components = classes
            .into_iter()
            .map(|class| {
                let t = reference.true_is(class);
                let p = reference.predicted_as(class);
                match (metric, component) {
                    (MetricKind::RocAuc, _) => binary::roc_auc(&t, &reference.y_proba[class]),
                    (MetricKind::F1, _) => binary::f1(&t, &p),
                    (MetricKind::Precision, _) => binary::precision(&t, &p),
                    (MetricKind::Recall, _) => binary::recall(&t, &p),
                    (MetricKind::Specificity, _) => binary::specificity(&t, &p),
                    (MetricKind::Accuracy, _) => binary::accuracy(&t, &p),
                    (MetricKind::ConfusionMatrix, MetricComponent::Cell(cell)) => {
                        binary::confusion_cell(&t, &p, cell, settings.confusion_matrix_normalization)
                    }
                    (MetricKind::ConfusionMatrix, MetricComponent::Whole) => {
                        SamplingErrorComponents::mean(f64::NAN, 1.0)
                    }
                    (MetricKind::BusinessValue, _) => match &settings.business_value_matrix {
                        Some(matrix) => {
                            binary::business_value(&t, &p, matrix, settings.business_value_normalization)
                        }
                        None => SamplingErrorComponents::mean(f64::NAN, 1.0),
                    },
                }
            })
            .collect();
        Self::new(components)
    }
}

/// Sampling error of drift statistics
///
/// Scales the spread of the statistic over reference chunks by the ratio of
/// the mean reference chunk size to the evaluated chunk size.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ChunkSpreadError {
    pub reference_std: f64,
    pub mean_reference_chunk_size: f64,
}

impl ChunkSpreadError {
    /// Fit from reference chunk values and sizes
    pub fn fit(values: &[f64], chunk_sizes: &[usize]) -> Self {
        let finite: Vec<f64> = values.iter().copied().filter(|v| !v.is_nan()).collect();
        let mean_size = if chunk_sizes.is_empty() {
            f64::NAN
        } else {
            chunk_sizes.iter().sum::<usize>() as f64 / chunk_sizes.len() as f64
        };
        Self {
            reference_std: population_std(&finite),
            mean_reference_chunk_size: mean_size,
        }
    }

    pub fn sampling_error(&self, chunk_size: usize) -> f64 {
        if chunk_size == 0 {
            return f64::NAN;
        }
        self.reference_std * (self.mean_reference_chunk_size / chunk_size as f64).sqrt()
    }
}

/// `(lower, upper)` confidence boundary of `value`, clipped to `limits`
pub fn confidence_bounds(value: f64, sampling_error: f64, limits: ValueLimits) -> (Option<f64>, Option<f64>) {
    if value.is_nan() || sampling_error.is_nan() {
        return (None, None);
    }
    let half_width = SAMPLING_ERROR_RANGE * sampling_error;
    (
        Some(limits.clip(value - half_width)),
        Some(limits.clip(value + half_width)),
    )
}
