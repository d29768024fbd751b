//! Model output columns of classification problems
//!
//! Binary and multiclass problems are handled uniformly: every label is
//! mapped to an index into a sorted class list and every class carries its
//! own probability vector. Binary problems use the classes `0` and `1`.

use crate::error::{DriftGuardError, Result};
use crate::utils::{float_values, label_values, require_columns};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Kind of monitored model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProblemType {
    BinaryClassification,
    MulticlassClassification,
}

impl fmt::Display for ProblemType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProblemType::BinaryClassification => write!(f, "classification_binary"),
            ProblemType::MulticlassClassification => write!(f, "classification_multiclass"),
        }
    }
}

/// Where predicted probabilities live
///
/// A single column holds the probability of the positive class for binary
/// models. Multiclass models map every class label to its probability column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ModelOutputs {
    Single(String),
    PerClass(BTreeMap<String, String>),
}

impl ModelOutputs {
    /// Every probability column name
    pub fn columns(&self) -> Vec<String> {
        match self {
            ModelOutputs::Single(col) => vec![col.clone()],
            ModelOutputs::PerClass(map) => map.values().cloned().collect(),
        }
    }

    /// Check the mapping shape against the problem type
    pub fn validate(&self, problem_type: ProblemType) -> Result<()> {
        match (problem_type, self) {
            (ProblemType::BinaryClassification, ModelOutputs::Single(col)) if !col.is_empty() => Ok(()),
            (ProblemType::BinaryClassification, _) => Err(DriftGuardError::invalid(
                "y_pred_proba must be a single column name for binary classification",
            )),
            (ProblemType::MulticlassClassification, ModelOutputs::PerClass(map)) if map.len() >= 2 => Ok(()),
            (ProblemType::MulticlassClassification, ModelOutputs::PerClass(_)) => Err(
                DriftGuardError::invalid("y_pred_proba must map at least two classes to probability columns"),
            ),
            (ProblemType::MulticlassClassification, ModelOutputs::Single(_)) => Err(DriftGuardError::invalid(
                "y_pred_proba must be a mapping of class label to probability column for multiclass classification",
            )),
        }
    }
}

/// Column names of a classification model's inputs and outputs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationColumns {
    pub problem_type: ProblemType,
    pub y_true: String,
    pub y_pred: String,
    pub y_pred_proba: ModelOutputs,
}

impl ClassificationColumns {
    /// Columns for a binary model
    pub fn binary(y_true: impl Into<String>, y_pred: impl Into<String>, y_pred_proba: impl Into<String>) -> Self {
        Self {
            problem_type: ProblemType::BinaryClassification,
            y_true: y_true.into(),
            y_pred: y_pred.into(),
            y_pred_proba: ModelOutputs::Single(y_pred_proba.into()),
        }
    }

    /// Columns for a multiclass model
    pub fn multiclass(
        y_true: impl Into<String>,
        y_pred: impl Into<String>,
        y_pred_proba: BTreeMap<String, String>,
    ) -> Self {
        Self {
            problem_type: ProblemType::MulticlassClassification,
            y_true: y_true.into(),
            y_pred: y_pred.into(),
            y_pred_proba: ModelOutputs::PerClass(y_pred_proba),
        }
    }

    /// Validate names and the probability mapping
    pub fn validate(&self) -> Result<()> {
        if self.y_pred.is_empty() {
            return Err(DriftGuardError::invalid("y_pred column name must not be empty"));
        }
        if self.y_true.is_empty() {
            return Err(DriftGuardError::invalid("y_true column name must not be empty"));
        }
        self.y_pred_proba.validate(self.problem_type)
    }

    /// Sorted class labels
    pub fn classes(&self) -> Vec<String> {
        match &self.y_pred_proba {
            ModelOutputs::Single(_) => vec!["0".to_string(), "1".to_string()],
            ModelOutputs::PerClass(map) => map.keys().cloned().collect(),
        }
    }

    /// Prediction and probability columns
    pub fn output_columns(&self) -> Vec<String> {
        let mut cols = vec![self.y_pred.clone()];
        cols.extend(self.y_pred_proba.columns());
        cols
    }
}

/// Cleaned model outputs of one batch or chunk
///
/// Rows with a missing prediction or probability are removed. Targets are
/// kept per row and may be missing.
#[derive(Debug, Clone)]
pub struct ScoredBatch {
    pub classes: Vec<String>,
    pub y_pred: Vec<usize>,
    /// One probability vector per class
    pub y_proba: Vec<Vec<f64>>,
    /// Targets per row, `None` when missing or when the column is absent
    pub y_true: Vec<Option<usize>>,
    /// Number of rows before cleaning
    pub raw_rows: usize,
}

impl ScoredBatch {
    /// Extract model outputs from a frame
    ///
    /// With `require_targets` the target column must exist; otherwise it is
    /// read when present.
    pub fn from_frame(df: &DataFrame, columns: &ClassificationColumns, require_targets: bool) -> Result<Self> {
        let mut required = columns.output_columns();
        if require_targets {
            required.push(columns.y_true.clone());
        }
        require_columns(df, &required)?;

        let classes = columns.classes();
        let index: BTreeMap<&str, usize> = classes.iter().enumerate().map(|(i, c)| (c.as_str(), i)).collect();
        let n = df.height();

        let (y_pred, proba): (Vec<Option<usize>>, Vec<Vec<Option<f64>>>) = match &columns.y_pred_proba {
            ModelOutputs::Single(col) => {
                let pred = binary_labels(df, &columns.y_pred)?;
                let p1 = float_values(df, col)?;
                let p0 = p1.iter().map(|p| p.map(|v| 1.0 - v)).collect();
                (pred, vec![p0, p1])
            }
            ModelOutputs::PerClass(map) => {
                let pred = class_labels(df, &columns.y_pred, &index)?;
                let proba = map
                    .values()
                    .map(|col| float_values(df, col))
                    .collect::<Result<Vec<_>>>()?;
                (pred, proba)
            }
        };

        let y_true_raw: Vec<Option<usize>> = if crate::utils::has_column(df, &columns.y_true) {
            match columns.problem_type {
                ProblemType::BinaryClassification => binary_labels(df, &columns.y_true)?,
                ProblemType::MulticlassClassification => class_labels(df, &columns.y_true, &index)?,
            }
        } else {
            vec![None; n]
        };

        let keep: Vec<usize> = (0..n)
            .filter(|&i| y_pred[i].is_some() && proba.iter().all(|p| p[i].is_some()))
            .collect();

        Ok(Self {
            classes,
            y_pred: keep.iter().filter_map(|&i| y_pred[i]).collect(),
            y_proba: proba
                .iter()
                .map(|p| keep.iter().filter_map(|&i| p[i]).collect())
                .collect(),
            y_true: keep.iter().map(|&i| y_true_raw[i]).collect(),
            raw_rows: n,
        })
    }

    /// Number of usable rows
    pub fn len(&self) -> usize {
        self.y_pred.len()
    }

    pub fn is_empty(&self) -> bool {
        self.y_pred.is_empty()
    }

    pub fn n_classes(&self) -> usize {
        self.classes.len()
    }

    /// Whether the batch carries any target
    pub fn has_targets(&self) -> bool {
        self.y_true.iter().any(Option::is_some)
    }

    /// Share of usable rows without a target
    pub fn targets_missing_rate(&self) -> f64 {
        if self.is_empty() {
            return f64::NAN;
        }
        self.y_true.iter().filter(|t| t.is_none()).count() as f64 / self.len() as f64
    }

    /// Rows that carry a target
    pub fn labeled(&self) -> LabeledBatch {
        let keep: Vec<usize> = (0..self.len()).filter(|&i| self.y_true[i].is_some()).collect();
        LabeledBatch {
            n_classes: self.n_classes(),
            y_true: keep.iter().filter_map(|&i| self.y_true[i]).collect(),
            y_pred: keep.iter().map(|&i| self.y_pred[i]).collect(),
            y_proba: self
                .y_proba
                .iter()
                .map(|p| keep.iter().map(|&i| p[i]).collect())
                .collect(),
        }
    }

    /// Predictions as one-vs-rest flags for `class`
    pub fn predicted_as(&self, class: usize) -> Vec<bool> {
        self.y_pred.iter().map(|&p| p == class).collect()
    }
}

/// Rows with targets, predictions and probabilities all present
#[derive(Debug, Clone)]
pub struct LabeledBatch {
    pub n_classes: usize,
    pub y_true: Vec<usize>,
    pub y_pred: Vec<usize>,
    pub y_proba: Vec<Vec<f64>>,
}

impl LabeledBatch {
    pub fn len(&self) -> usize {
        self.y_true.len()
    }

    pub fn is_empty(&self) -> bool {
        self.y_true.is_empty()
    }

    /// Targets as one-vs-rest flags for `class`
    pub fn true_is(&self, class: usize) -> Vec<bool> {
        self.y_true.iter().map(|&t| t == class).collect()
    }

    /// Predictions as one-vs-rest flags for `class`
    pub fn predicted_as(&self, class: usize) -> Vec<bool> {
        self.y_pred.iter().map(|&p| p == class).collect()
    }

    pub fn distinct_targets(&self) -> usize {
        self.y_true.iter().collect::<BTreeSet<_>>().len()
    }

    pub fn distinct_predictions(&self) -> usize {
        self.y_pred.iter().collect::<BTreeSet<_>>().len()
    }
}

fn binary_labels(df: &DataFrame, name: &str) -> Result<Vec<Option<usize>>> {
    float_values(df, name)?
        .into_iter()
        .map(|v| match v {
            None => Ok(None),
            Some(x) if x == 0.0 => Ok(Some(0)),
            Some(x) if x == 1.0 => Ok(Some(1)),
            Some(x) => Err(DriftGuardError::invalid(format!(
                "column '{}' contains {} but binary labels must be 0 or 1",
                name, x
            ))),
        })
        .collect()
}

fn class_labels(df: &DataFrame, name: &str, index: &BTreeMap<&str, usize>) -> Result<Vec<Option<usize>>> {
    label_values(df, name)?
        .into_iter()
        .map(|v| match v {
            None => Ok(None),
            Some(label) => index.get(label.as_str()).copied().map(Some).ok_or_else(|| {
                DriftGuardError::invalid(format!(
                    "column '{}' contains label '{}' which has no probability column",
                    name, label
                ))
            }),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn multiclass_columns() -> ClassificationColumns {
        let map: BTreeMap<String, String> = [("b", "p_b"), ("a", "p_a"), ("c", "p_c")]
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ClassificationColumns::multiclass("y_true", "y_pred", map)
    }

    #[test]
    fn test_validation_rejects_mismatched_outputs() {
        let mut cols = ClassificationColumns::binary("y_true", "y_pred", "p");
        assert!(cols.validate().is_ok());
        cols.problem_type = ProblemType::MulticlassClassification;
        assert!(matches!(cols.validate(), Err(DriftGuardError::InvalidArguments(_))));

        let mut multi = multiclass_columns();
        assert!(multi.validate().is_ok());
        multi.problem_type = ProblemType::BinaryClassification;
        assert!(multi.validate().is_err());
    }

    #[test]
    fn test_classes_are_sorted() {
        assert_eq!(multiclass_columns().classes(), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_binary_batch_cleaning() {
        let df = df!(
            "y_true" => &[Some(1.0), None, Some(0.0), Some(1.0)],
            "y_pred" => &[Some(1i64), Some(0), None, Some(1)],
            "p" => &[Some(0.9), Some(0.2), Some(0.4), Some(f64::NAN)]
        )
        .unwrap();
        let cols = ClassificationColumns::binary("y_true", "y_pred", "p");
        let batch = ScoredBatch::from_frame(&df, &cols, false).unwrap();
        assert_eq!(batch.len(), 2);
        assert_eq!(batch.raw_rows, 4);
        assert_eq!(batch.y_pred, vec![1, 0]);
        assert!((batch.y_proba[0][0] - 0.1).abs() < 1e-12);
        assert_eq!(batch.y_true, vec![Some(1), None]);
        assert!((batch.targets_missing_rate() - 0.5).abs() < 1e-12);
        assert_eq!(batch.labeled().len(), 1);
    }

    #[test]
    fn test_non_binary_label_rejected() {
        let df = df!("y_true" => &[2.0], "y_pred" => &[1.0], "p" => &[0.5]).unwrap();
        let cols = ClassificationColumns::binary("y_true", "y_pred", "p");
        assert!(ScoredBatch::from_frame(&df, &cols, true).is_err());
    }

    #[test]
    fn test_missing_target_column() {
        let df = df!("y_pred" => &[1.0], "p" => &[0.5]).unwrap();
        let cols = ClassificationColumns::binary("y_true", "y_pred", "p");
        assert!(matches!(
            ScoredBatch::from_frame(&df, &cols, true),
            Err(DriftGuardError::MissingColumns { .. })
        ));
        let batch = ScoredBatch::from_frame(&df, &cols, false).unwrap();
        assert!(!batch.has_targets());
    }

    #[test]
    fn test_multiclass_labels_map_to_sorted_indices() {
        let df = df!(
            "y_true" => &["c", "a"],
            "y_pred" => &["b", "a"],
            "p_a" => &[0.2, 0.7],
            "p_b" => &[0.5, 0.2],
            "p_c" => &[0.3, 0.1]
        )
        .unwrap();
        let batch = ScoredBatch::from_frame(&df, &multiclass_columns(), true).unwrap();
        assert_eq!(batch.y_pred, vec![1, 0]);
        assert_eq!(batch.y_true, vec![Some(2), Some(0)]);
        assert!((batch.y_proba[1][0] - 0.5).abs() < 1e-12);
    }
}
