//! Realized performance of labeled chunks

use crate::classification::{LabeledBatch, ProblemType};
use crate::metrics::{ConfusionCounts, MetricComponent, MetricKind, MetricSettings};
use tracing::warn;

/// ROC AUC of hard targets against scores, ties sharing their average rank
pub fn roc_auc(y_true: &[bool], scores: &[f64]) -> f64 {
    let n_pos = y_true.iter().filter(|t| **t).count();
    let n_neg = y_true.len() - n_pos;
    if n_pos == 0 || n_neg == 0 {
        return f64::NAN;
    }

    let mut order: Vec<usize> = (0..scores.len()).collect();
    order.sort_by(|&a, &b| scores[a].total_cmp(&scores[b]));

    let mut ranks = vec![0.0; scores.len()];
    let mut i = 0;
    while i < order.len() {
        let mut j = i;
        while j + 1 < order.len() && scores[order[j + 1]] == scores[order[i]] {
            j += 1;
        }
        let average_rank = (i + j) as f64 / 2.0 + 1.0;
        for &idx in &order[i..=j] {
            ranks[idx] = average_rank;
        }
        i = j + 1;
    }

    let positive_rank_sum: f64 = ranks
        .iter()
        .zip(y_true)
        .filter(|(_, t)| **t)
        .map(|(r, _)| *r)
        .sum();
    let n_pos = n_pos as f64;
    (positive_rank_sum - n_pos * (n_pos + 1.0) / 2.0) / (n_pos * n_neg as f64)
}

fn binary_value(
    metric: MetricKind,
    component: MetricComponent,
    settings: &MetricSettings,
    y_true: &[bool],
    y_pred: &[bool],
    scores: &[f64],
) -> f64 {
    let counts = ConfusionCounts::from_labels(y_true, y_pred);
    match (metric, component) {
        (MetricKind::RocAuc, _) => roc_auc(y_true, scores),
        (MetricKind::F1, _) => counts.f1(),
        (MetricKind::Precision, _) => counts.precision(),
        (MetricKind::Recall, _) => counts.recall(),
        (MetricKind::Specificity, _) => counts.specificity(),
        (MetricKind::Accuracy, _) => counts.accuracy(),
        (MetricKind::ConfusionMatrix, MetricComponent::Cell(cell)) => {
            counts.normalized(cell, settings.confusion_matrix_normalization)
        }
        (MetricKind::ConfusionMatrix, MetricComponent::Whole) => f64::NAN,
        (MetricKind::BusinessValue, _) => settings
            .business_value_matrix
            .as_ref()
            .map_or(f64::NAN, |m| counts.business_value(m, settings.business_value_normalization)),
    }
}

/// Why a labeled chunk cannot produce a metric, if it cannot
fn degenerate_reason(metric: MetricKind, data: &LabeledBatch) -> Option<&'static str> {
    if data.is_empty() {
        return Some("no labeled rows");
    }
    if metric == MetricKind::BusinessValue {
        return None;
    }
    if data.distinct_targets() < 2 {
        return Some("fewer than two distinct target values");
    }
    if metric != MetricKind::RocAuc && data.distinct_predictions() < 2 {
        return Some("fewer than two distinct predicted values");
    }
    None
}

/// A class that is never predicted or never present scores 0 in the macro
/// average of label metrics
fn macro_class_score(metric: MetricKind, value: f64) -> f64 {
    match metric {
        MetricKind::F1 | MetricKind::Precision | MetricKind::Recall if value.is_nan() => 0.0,
        _ => value,
    }
}

/// Realized value of a metric component on labeled rows
///
/// Degenerate data yields NaN with a warning instead of an error.
pub fn realized_value(
    metric: MetricKind,
    component: MetricComponent,
    settings: &MetricSettings,
    problem_type: ProblemType,
    data: &LabeledBatch,
) -> f64 {
    if let Some(reason) = degenerate_reason(metric, data) {
        warn!(metric = %metric, reason, "realized metric is undefined for this chunk, returning NaN");
        return f64::NAN;
    }

    match problem_type {
        ProblemType::BinaryClassification => binary_value(
            metric,
            component,
            settings,
            &data.true_is(1),
            &data.predicted_as(1),
            &data.y_proba[1],
        ),
        ProblemType::MulticlassClassification => {
            if metric == MetricKind::Accuracy {
                let correct = data.y_true.iter().zip(&data.y_pred).filter(|(t, p)| t == p).count();
                return correct as f64 / data.len() as f64;
            }
            let per_class: Vec<f64> = (0..data.n_classes)
                .map(|class| {
                    let value = binary_value(
                        metric,
                        component,
                        settings,
                        &data.true_is(class),
                        &data.predicted_as(class),
                        &data.y_proba[class],
                    );
                    macro_class_score(metric, value)
                })
                .collect();
            per_class.iter().sum::<f64>() / per_class.len() as f64
        }
    }
}
