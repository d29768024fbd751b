//! Confidence-based estimates of classification metrics
//!
//! Every predicted probability is treated as the expected value of the
//! outcome, so confusion-matrix counts become sums of probabilities and
//! metrics follow from those expected counts.

use crate::classification::{ProblemType, ScoredBatch};
use crate::metrics::{ConfusionCounts, MetricComponent, MetricKind, MetricSettings};
use std::collections::BTreeSet;
use tracing::warn;

/// Expected ROC AUC from positive-class probabilities alone
///
/// Every distinct probability acts as a decision threshold. Rows at or above
/// the threshold are predicted positive and contribute `p` to TP and `1 - p`
/// to FP; rows below contribute to FN and TN. The area under the resulting
/// curve, closed at `(0, 0)`, is integrated with the trapezoidal rule.
pub fn estimate_roc_auc(y_proba: &[f64]) -> f64 {
    let mut sorted: Vec<f64> = y_proba.to_vec();
    sorted.sort_by(f64::total_cmp);
    let n = sorted.len();
    if n == 0 {
        return f64::NAN;
    }

    let total_pos: f64 = sorted.iter().sum();
    let total_neg: f64 = n as f64 - total_pos;
    if total_pos <= 0.0 || total_neg <= 0.0 {
        return f64::NAN;
    }

    // (fpr, tpr) for each distinct threshold, from lowest to highest
    let mut curve: Vec<(f64, f64)> = Vec::new();
    let mut below_pos = 0.0;
    let mut below_neg = 0.0;
    let mut i = 0;
    while i < n {
        let tp = total_pos - below_pos;
        let fp = total_neg - below_neg;
        curve.push((fp / total_neg, tp / total_pos));

        let threshold = sorted[i];
        while i < n && sorted[i] == threshold {
            below_pos += sorted[i];
            below_neg += 1.0 - sorted[i];
            i += 1;
        }
    }
    curve.push((0.0, 0.0));

    curve
        .windows(2)
        .map(|w| (w[0].0 - w[1].0) * (w[0].1 + w[1].1) / 2.0)
        .sum()
}

fn binary_estimate(
    metric: MetricKind,
    component: MetricComponent,
    settings: &MetricSettings,
    y_pred: &[bool],
    y_proba: &[f64],
) -> f64 {
    if metric == MetricKind::RocAuc {
        return estimate_roc_auc(y_proba);
    }
    let counts = ConfusionCounts::expected(y_pred, y_proba);
    match (metric, component) {
        (MetricKind::F1, _) => counts.f1(),
        (MetricKind::Precision, _) => counts.precision(),
        (MetricKind::Recall, _) => counts.recall(),
        (MetricKind::Specificity, _) => counts.specificity(),
        (MetricKind::Accuracy, _) => counts.accuracy(),
        (MetricKind::ConfusionMatrix, MetricComponent::Cell(cell)) => {
            counts.normalized(cell, settings.confusion_matrix_normalization)
        }
        (MetricKind::BusinessValue, _) => settings
            .business_value_matrix
            .as_ref()
            .map_or(f64::NAN, |m| counts.business_value(m, settings.business_value_normalization)),
        _ => f64::NAN,
    }
}

fn distinct_count(values: &[f64]) -> usize {
    values.iter().map(|v| v.to_bits()).collect::<BTreeSet<_>>().len()
}

/// Why a chunk cannot produce an estimate, if it cannot
fn degenerate_reason(metric: MetricKind, problem_type: ProblemType, data: &ScoredBatch) -> Option<&'static str> {
    if data.is_empty() {
        return Some("no scored rows");
    }
    match metric {
        MetricKind::BusinessValue | MetricKind::ConfusionMatrix => None,
        MetricKind::RocAuc => {
            let constant = match problem_type {
                ProblemType::BinaryClassification => distinct_count(&data.y_proba[1]) < 2,
                ProblemType::MulticlassClassification => data.y_proba.iter().any(|p| distinct_count(p) < 2),
            };
            constant.then_some("fewer than two distinct predicted probabilities")
        }
        _ => {
            let distinct_predictions = data.y_pred.iter().collect::<BTreeSet<_>>().len();
            (distinct_predictions < 2).then_some("fewer than two distinct predicted values")
        }
    }
}

/// Estimated value of a metric component for a chunk of scored rows
pub fn estimated_value(
    metric: MetricKind,
    component: MetricComponent,
    settings: &MetricSettings,
    problem_type: ProblemType,
    data: &ScoredBatch,
) -> f64 {
    if let Some(reason) = degenerate_reason(metric, problem_type, data) {
        warn!(metric = %metric, reason, "estimated metric is undefined for this chunk, returning NaN");
        return f64::NAN;
    }

    match problem_type {
        ProblemType::BinaryClassification => {
            binary_estimate(metric, component, settings, &data.predicted_as(1), &data.y_proba[1])
        }
        ProblemType::MulticlassClassification => {
            if metric == MetricKind::Accuracy {
                let expected_correct: f64 = data
                    .y_pred
                    .iter()
                    .enumerate()
                    .map(|(row, &class)| data.y_proba[class][row])
                    .sum();
                return expected_correct / data.len() as f64;
            }
            let per_class: Vec<f64> = (0..data.n_classes())
                .map(|class| binary_estimate(metric, component, settings, &data.predicted_as(class), &data.y_proba[class]))
                .collect();
            per_class.iter().sum::<f64>() / per_class.len() as f64
        }
    }
}
