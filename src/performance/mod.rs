//! Realized performance of classification models
//!
//! Computes metrics directly from labeled chunks. The fitted component state
//! defined here (thresholds, limits, sampling error) is shared with
//! confidence-based estimation.

mod calculator;
pub mod realized;

pub use calculator::{PerformanceCalculator, PerformanceConfig};
pub use realized::{realized_value, roc_auc};

use crate::classification::{LabeledBatch, ProblemType};
use crate::error::Result;
use crate::metrics::{component_names, MetricComponent, MetricKind, MetricSettings};
use crate::result::{MetricRecord, ResultEntry, ResultKey};
use crate::sampling_error::{confidence_bounds, SamplingErrorModel};
use crate::thresholds::{calculate_threshold_values, Threshold, ThresholdBounds, ThresholdConfig, ValueLimits};
use std::collections::BTreeMap;

/// One reported metric component with its fitted alerting state
#[derive(Debug, Clone)]
pub(crate) struct FittedComponent {
    pub metric: MetricKind,
    pub component: MetricComponent,
    pub key: ResultKey,
    pub display_name: String,
    pub limits: ValueLimits,
    pub bounds: ThresholdBounds,
    pub sampling_error: SamplingErrorModel,
}

impl FittedComponent {
    /// Fit thresholds from realized reference chunk values and the sampling
    /// error from the full labeled reference
    pub fn fit(
        metric: MetricKind,
        component: MetricComponent,
        settings: &MetricSettings,
        problem_type: ProblemType,
        threshold: &dyn Threshold,
        reference_values: &[f64],
        reference: &LabeledBatch,
    ) -> Self {
        let (column_name, display_name) = component_names(metric, component);
        let limits = settings.limits(metric);
        Self {
            metric,
            component,
            key: ResultKey::new(column_name, metric.key()),
            display_name,
            limits,
            bounds: calculate_threshold_values(threshold, reference_values, limits),
            sampling_error: SamplingErrorModel::fit(metric, component, settings, problem_type, reference),
        }
    }

    /// Result record of a chunk value
    pub fn record(&self, value: f64, realized: Option<f64>, chunk_size: usize) -> MetricRecord {
        let sampling_error = self.sampling_error.sampling_error(chunk_size);
        let (lower_cb, upper_cb) = confidence_bounds(value, sampling_error, self.limits);
        MetricRecord {
            value,
            p_value: None,
            realized,
            sampling_error,
            upper_confidence_boundary: upper_cb,
            lower_confidence_boundary: lower_cb,
            upper_threshold: self.bounds.upper,
            lower_threshold: self.bounds.lower,
            alert: self.bounds.is_alert(value),
        }
    }

    pub fn entry(&self) -> ResultEntry {
        ResultEntry {
            key: self.key.clone(),
            display_name: self.display_name.clone(),
        }
    }
}

/// Every `(metric, component)` pair reported for `metrics`, in order
pub(crate) fn metric_components(metrics: &[MetricKind]) -> Vec<(MetricKind, MetricComponent)> {
    metrics
        .iter()
        .flat_map(|m| m.components().into_iter().map(move |c| (*m, c)))
        .collect()
}

/// Threshold policies keyed by metric, the std policy being the default
pub(crate) fn metric_thresholds(
    overrides: &BTreeMap<String, ThresholdConfig>,
    metrics: &[MetricKind],
) -> Result<BTreeMap<MetricKind, ThresholdConfig>> {
    let mut policies: BTreeMap<MetricKind, ThresholdConfig> =
        metrics.iter().map(|m| (*m, ThresholdConfig::default())).collect();
    for (key, policy) in overrides {
        let metric: MetricKind = key.parse()?;
        policies.insert(metric, policy.clone());
    }
    Ok(policies)
}
