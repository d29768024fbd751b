//! Performance metric definitions shared by realized calculation and estimation

use crate::classification::ProblemType;
use crate::error::{DriftGuardError, Result};
use crate::thresholds::ValueLimits;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Supported classification metrics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricKind {
    RocAuc,
    F1,
    Precision,
    Recall,
    Specificity,
    Accuracy,
    ConfusionMatrix,
    BusinessValue,
}

impl MetricKind {
    /// Key used in result columns
    pub fn key(&self) -> &'static str {
        match self {
            MetricKind::RocAuc => "roc_auc",
            MetricKind::F1 => "f1",
            MetricKind::Precision => "precision",
            MetricKind::Recall => "recall",
            MetricKind::Specificity => "specificity",
            MetricKind::Accuracy => "accuracy",
            MetricKind::ConfusionMatrix => "confusion_matrix",
            MetricKind::BusinessValue => "business_value",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            MetricKind::RocAuc => "ROC AUC",
            MetricKind::F1 => "F1",
            MetricKind::Precision => "Precision",
            MetricKind::Recall => "Recall",
            MetricKind::Specificity => "Specificity",
            MetricKind::Accuracy => "Accuracy",
            MetricKind::ConfusionMatrix => "Confusion Matrix",
            MetricKind::BusinessValue => "Business Value",
        }
    }

    /// Components reported for this metric
    pub fn components(&self) -> Vec<MetricComponent> {
        match self {
            MetricKind::ConfusionMatrix => ConfusionCell::ALL
                .iter()
                .map(|cell| MetricComponent::Cell(*cell))
                .collect(),
            _ => vec![MetricComponent::Whole],
        }
    }

    /// Whether the metric is only defined for binary problems
    pub fn binary_only(&self) -> bool {
        matches!(self, MetricKind::ConfusionMatrix | MetricKind::BusinessValue)
    }
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.key())
    }
}

impl FromStr for MetricKind {
    type Err = DriftGuardError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "roc_auc" => Ok(MetricKind::RocAuc),
            "f1" => Ok(MetricKind::F1),
            "precision" => Ok(MetricKind::Precision),
            "recall" => Ok(MetricKind::Recall),
            "specificity" => Ok(MetricKind::Specificity),
            "accuracy" => Ok(MetricKind::Accuracy),
            "confusion_matrix" => Ok(MetricKind::ConfusionMatrix),
            "business_value" => Ok(MetricKind::BusinessValue),
            other => Err(DriftGuardError::invalid(format!("unknown metric '{}'", other))),
        }
    }
}

/// Confusion-matrix cell of a binary problem
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfusionCell {
    TruePositive,
    FalsePositive,
    FalseNegative,
    TrueNegative,
}

impl ConfusionCell {
    pub const ALL: [ConfusionCell; 4] = [
        ConfusionCell::TruePositive,
        ConfusionCell::FalsePositive,
        ConfusionCell::FalseNegative,
        ConfusionCell::TrueNegative,
    ];

    pub fn key(&self) -> &'static str {
        match self {
            ConfusionCell::TruePositive => "true_positive",
            ConfusionCell::FalsePositive => "false_positive",
            ConfusionCell::FalseNegative => "false_negative",
            ConfusionCell::TrueNegative => "true_negative",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            ConfusionCell::TruePositive => "True Positive",
            ConfusionCell::FalsePositive => "False Positive",
            ConfusionCell::FalseNegative => "False Negative",
            ConfusionCell::TrueNegative => "True Negative",
        }
    }

    /// Whether rows in this cell have a positive target
    pub fn actual_positive(&self) -> bool {
        matches!(self, ConfusionCell::TruePositive | ConfusionCell::FalseNegative)
    }

    /// Whether rows in this cell have a positive prediction
    pub fn predicted_positive(&self) -> bool {
        matches!(self, ConfusionCell::TruePositive | ConfusionCell::FalsePositive)
    }

    /// Whether a row with target `t` and prediction `p` falls in this cell
    pub fn contains(&self, t: bool, p: bool) -> bool {
        t == self.actual_positive() && p == self.predicted_positive()
    }
}

/// A reported value of a metric: the metric itself or one matrix cell
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MetricComponent {
    Whole,
    Cell(ConfusionCell),
}

/// Normalization of confusion-matrix cells
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfusionMatrixNormalization {
    /// Raw counts
    #[default]
    None,
    /// Divided by the number of rows
    All,
    /// Divided by the number of rows with the same target
    True,
    /// Divided by the number of rows with the same prediction
    Pred,
}

/// Normalization of the business value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BusinessValueNormalization {
    /// Total value of the chunk
    #[default]
    None,
    /// Value per prediction
    PerPrediction,
}

/// Payoff per confusion-matrix cell, laid out `[[tn, fp], [fn, tp]]`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Vec<f64>>", into = "Vec<Vec<f64>>")]
pub struct BusinessValueMatrix([[f64; 2]; 2]);

impl BusinessValueMatrix {
    pub fn new(matrix: [[f64; 2]; 2]) -> Self {
        Self(matrix)
    }

    /// Payoff of a row with target `t` and prediction `p`
    pub fn value(&self, t: bool, p: bool) -> f64 {
        self.0[usize::from(t)][usize::from(p)]
    }

    /// Payoff of a confusion-matrix cell
    pub fn cell_value(&self, cell: ConfusionCell) -> f64 {
        self.value(cell.actual_positive(), cell.predicted_positive())
    }
}

impl TryFrom<Vec<Vec<f64>>> for BusinessValueMatrix {
    type Error = DriftGuardError;

    fn try_from(rows: Vec<Vec<f64>>) -> Result<Self> {
        if rows.len() != 2 || rows.iter().any(|r| r.len() != 2) {
            let shape: Vec<usize> = rows.iter().map(Vec::len).collect();
            return Err(DriftGuardError::invalid(format!(
                "business_value_matrix must have shape 2x2, got {} rows with lengths {:?}",
                rows.len(),
                shape
            )));
        }
        Ok(Self([[rows[0][0], rows[0][1]], [rows[1][0], rows[1][1]]]))
    }
}

impl From<BusinessValueMatrix> for Vec<Vec<f64>> {
    fn from(m: BusinessValueMatrix) -> Self {
        m.0.iter().map(|r| r.to_vec()).collect()
    }
}

/// Confusion-matrix counts of a binary problem, possibly fractional
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ConfusionCounts {
    pub tp: f64,
    pub fp: f64,
    pub fn_: f64,
    pub tn: f64,
}

impl ConfusionCounts {
    /// Counts of hard targets against hard predictions
    pub fn from_labels(y_true: &[bool], y_pred: &[bool]) -> Self {
        let mut counts = Self::default();
        for (&t, &p) in y_true.iter().zip(y_pred) {
            match (t, p) {
                (true, true) => counts.tp += 1.0,
                (false, true) => counts.fp += 1.0,
                (true, false) => counts.fn_ += 1.0,
                (false, false) => counts.tn += 1.0,
            }
        }
        counts
    }

    /// Expected counts when each positive-class probability is the chance of a positive target
    pub fn expected(y_pred: &[bool], y_proba: &[f64]) -> Self {
        let mut counts = Self::default();
        for (&p, &prob) in y_pred.iter().zip(y_proba) {
            if p {
                counts.tp += prob;
                counts.fp += 1.0 - prob;
            } else {
                counts.fn_ += prob;
                counts.tn += 1.0 - prob;
            }
        }
        counts
    }

    pub fn total(&self) -> f64 {
        self.tp + self.fp + self.fn_ + self.tn
    }

    pub fn accuracy(&self) -> f64 {
        ratio(self.tp + self.tn, self.total())
    }

    pub fn precision(&self) -> f64 {
        ratio(self.tp, self.tp + self.fp)
    }

    pub fn recall(&self) -> f64 {
        ratio(self.tp, self.tp + self.fn_)
    }

    pub fn specificity(&self) -> f64 {
        ratio(self.tn, self.tn + self.fp)
    }

    pub fn f1(&self) -> f64 {
        ratio(self.tp, self.tp + 0.5 * (self.fp + self.fn_))
    }

    pub fn get(&self, cell: ConfusionCell) -> f64 {
        match cell {
            ConfusionCell::TruePositive => self.tp,
            ConfusionCell::FalsePositive => self.fp,
            ConfusionCell::FalseNegative => self.fn_,
            ConfusionCell::TrueNegative => self.tn,
        }
    }

    /// Value of a cell under a normalization
    pub fn normalized(&self, cell: ConfusionCell, normalization: ConfusionMatrixNormalization) -> f64 {
        let value = self.get(cell);
        match normalization {
            ConfusionMatrixNormalization::None => value,
            ConfusionMatrixNormalization::All => ratio(value, self.total()),
            ConfusionMatrixNormalization::True => {
                let same_target = if cell.actual_positive() {
                    self.tp + self.fn_
                } else {
                    self.tn + self.fp
                };
                ratio(value, same_target)
            }
            ConfusionMatrixNormalization::Pred => {
                let same_prediction = if cell.predicted_positive() {
                    self.tp + self.fp
                } else {
                    self.tn + self.fn_
                };
                ratio(value, same_prediction)
            }
        }
    }

    /// Business value of these counts
    pub fn business_value(&self, matrix: &BusinessValueMatrix, normalization: BusinessValueNormalization) -> f64 {
        let total: f64 = ConfusionCell::ALL
            .iter()
            .map(|cell| self.get(*cell) * matrix.cell_value(*cell))
            .sum();
        match normalization {
            BusinessValueNormalization::None => total,
            BusinessValueNormalization::PerPrediction => ratio(total, self.total()),
        }
    }
}

fn ratio(numerator: f64, denominator: f64) -> f64 {
    if denominator == 0.0 {
        f64::NAN
    } else {
        numerator / denominator
    }
}

/// Per-metric options
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricSettings {
    pub confusion_matrix_normalization: ConfusionMatrixNormalization,
    pub business_value_matrix: Option<BusinessValueMatrix>,
    pub business_value_normalization: BusinessValueNormalization,
}

impl MetricSettings {
    /// Check that `metrics` can be computed for `problem_type` with these settings
    pub fn validate(&self, metrics: &[MetricKind], problem_type: ProblemType) -> Result<()> {
        if metrics.is_empty() {
            return Err(DriftGuardError::invalid("at least one metric must be given"));
        }
        for metric in metrics {
            if metric.binary_only() && problem_type == ProblemType::MulticlassClassification {
                return Err(DriftGuardError::invalid(format!(
                    "metric '{}' is only supported for binary classification",
                    metric
                )));
            }
            if *metric == MetricKind::BusinessValue && self.business_value_matrix.is_none() {
                return Err(DriftGuardError::invalid(
                    "business_value_matrix must be provided for the business_value metric",
                ));
            }
        }
        Ok(())
    }

    /// Theoretical range of a metric component
    pub fn limits(&self, metric: MetricKind) -> ValueLimits {
        match metric {
            MetricKind::BusinessValue => ValueLimits::UNBOUNDED,
            MetricKind::ConfusionMatrix => match self.confusion_matrix_normalization {
                ConfusionMatrixNormalization::None => ValueLimits::NON_NEGATIVE,
                _ => ValueLimits::UNIT_INTERVAL,
            },
            _ => ValueLimits::UNIT_INTERVAL,
        }
    }
}

/// Column key and display name of a metric component
pub fn component_names(metric: MetricKind, component: MetricComponent) -> (String, String) {
    match component {
        MetricComponent::Whole => (metric.key().to_string(), metric.display_name().to_string()),
        MetricComponent::Cell(cell) => (cell.key().to_string(), cell.display_name().to_string()),
    }
}
