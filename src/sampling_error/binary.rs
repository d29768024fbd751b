//! Sampling-error components of binary metrics
//!
//! Each function reduces labeled reference data to the standard deviation of
//! an observation-level contribution and the fraction of rows that carry it.

use super::SamplingErrorComponents;
use crate::metrics::{BusinessValueMatrix, BusinessValueNormalization, ConfusionCell, ConfusionMatrixNormalization};
use crate::utils::stats::population_std;

fn fraction(count: usize, total: usize) -> f64 {
    if total == 0 {
        f64::NAN
    } else {
        count as f64 / total as f64
    }
}

/// Correctness indicator over the rows selected by `mask`
fn masked_indicator(mask: &[bool], correct: &[bool]) -> SamplingErrorComponents {
    let selected: Vec<f64> = mask
        .iter()
        .zip(correct)
        .filter(|(m, _)| **m)
        .map(|(_, c)| f64::from(u8::from(*c)))
        .collect();
    SamplingErrorComponents::mean(population_std(&selected), fraction(selected.len(), mask.len()))
}

pub fn accuracy(y_true: &[bool], y_pred: &[bool]) -> SamplingErrorComponents {
    let correct: Vec<bool> = y_true.iter().zip(y_pred).map(|(t, p)| t == p).collect();
    masked_indicator(&vec![true; correct.len()], &correct)
}

pub fn precision(y_true: &[bool], y_pred: &[bool]) -> SamplingErrorComponents {
    masked_indicator(y_pred, y_true)
}

pub fn recall(y_true: &[bool], y_pred: &[bool]) -> SamplingErrorComponents {
    masked_indicator(y_true, y_pred)
}

pub fn specificity(y_true: &[bool], y_pred: &[bool]) -> SamplingErrorComponents {
    let negatives: Vec<bool> = y_true.iter().map(|t| !t).collect();
    let predicted_negative: Vec<bool> = y_pred.iter().map(|p| !p).collect();
    masked_indicator(&negatives, &predicted_negative)
}

/// F1 contributions of the TP, FP and FN rows
///
/// TP rows contribute 1 and FP/FN rows 0, scaled so that their mean equals
/// the F1 score.
pub fn f1(y_true: &[bool], y_pred: &[bool]) -> SamplingErrorComponents {
    let (mut tp, mut fp, mut fn_) = (0usize, 0usize, 0usize);
    for (&t, &p) in y_true.iter().zip(y_pred) {
        match (t, p) {
            (true, true) => tp += 1,
            (false, true) => fp += 1,
            (true, false) => fn_ += 1,
            (false, false) => {}
        }
    }
    let relevant = tp + fp + fn_;
    let denominator = tp as f64 + 0.5 * (fp + fn_) as f64;
    if relevant == 0 || denominator == 0.0 {
        return SamplingErrorComponents::mean(f64::NAN, fraction(relevant, y_true.len()));
    }
    let correcting_factor = relevant as f64 / denominator;
    let observations: Vec<f64> = std::iter::repeat(correcting_factor)
        .take(tp)
        .chain(std::iter::repeat(0.0).take(fp + fn_))
        .collect();
    SamplingErrorComponents::mean(population_std(&observations), fraction(relevant, y_true.len()))
}

/// Rank-based ROC-AUC contributions
///
/// For every minority-class row the share of majority-class rows ranked below
/// it. Roles are flipped when positives are the majority.
pub fn roc_auc(y_true: &[bool], y_proba: &[f64]) -> SamplingErrorComponents {
    let n = y_true.len();
    let n_pos = y_true.iter().filter(|t| **t).count();
    let flip = n_pos as f64 > 0.5 * n as f64;

    let mut rows: Vec<(f64, bool)> = y_true
        .iter()
        .zip(y_proba)
        .map(|(&t, &p)| if flip { (1.0 - p, !t) } else { (p, t) })
        .collect();
    rows.sort_by(|a, b| a.0.total_cmp(&b.0));

    let n_minority = rows.iter().filter(|r| r.1).count();
    let n_majority = n - n_minority;
    if n_minority == 0 || n_majority == 0 {
        return SamplingErrorComponents::mean(f64::NAN, fraction(n_minority, n));
    }

    let mut majority_below = 0usize;
    let mut contributions = Vec::with_capacity(n_minority);
    for (_, is_minority) in rows {
        if is_minority {
            contributions.push(majority_below as f64 / n_majority as f64);
        } else {
            majority_below += 1;
        }
    }
    SamplingErrorComponents::mean(population_std(&contributions), fraction(n_minority, n))
}

/// Cell indicator, scaled to match the normalization of the reported value
pub fn confusion_cell(
    y_true: &[bool],
    y_pred: &[bool],
    cell: ConfusionCell,
    normalization: ConfusionMatrixNormalization,
) -> SamplingErrorComponents {
    let in_cell: Vec<bool> = y_true.iter().zip(y_pred).map(|(&t, &p)| cell.contains(t, p)).collect();
    match normalization {
        ConfusionMatrixNormalization::None => {
            let indicator: Vec<f64> = in_cell.iter().map(|c| f64::from(u8::from(*c))).collect();
            SamplingErrorComponents::sum(population_std(&indicator), 1.0)
        }
        ConfusionMatrixNormalization::All => masked_indicator(&vec![true; in_cell.len()], &in_cell),
        ConfusionMatrixNormalization::True => {
            let same_target: Vec<bool> = y_true.iter().map(|&t| t == cell.actual_positive()).collect();
            masked_indicator(&same_target, &in_cell)
        }
        ConfusionMatrixNormalization::Pred => {
            let same_prediction: Vec<bool> = y_pred.iter().map(|&p| p == cell.predicted_positive()).collect();
            masked_indicator(&same_prediction, &in_cell)
        }
    }
}

/// Per-row payoff of the business value matrix
pub fn business_value(
    y_true: &[bool],
    y_pred: &[bool],
    matrix: &BusinessValueMatrix,
    normalization: BusinessValueNormalization,
) -> SamplingErrorComponents {
    let payoffs: Vec<f64> = y_true.iter().zip(y_pred).map(|(&t, &p)| matrix.value(t, p)).collect();
    let std = population_std(&payoffs);
    match normalization {
        BusinessValueNormalization::None => SamplingErrorComponents::sum(std, 1.0),
        BusinessValueNormalization::PerPrediction => SamplingErrorComponents::mean(std, 1.0),
    }
}
