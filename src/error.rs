//! Error types for driftguard

use thiserror::Error;

/// Result type alias for driftguard operations
pub type Result<T> = std::result::Result<T, DriftGuardError>;

/// Main error type for driftguard
#[derive(Error, Debug)]
pub enum DriftGuardError {
    #[error("Invalid arguments: {0}")]
    InvalidArguments(String),

    #[error("Missing required columns: {}", .columns.join(", "))]
    MissingColumns { columns: Vec<String> },

    #[error("Not fitted: {0}")]
    NotFitted(String),

    #[error("Calculator error: {0}")]
    Calculator(String),

    #[error("Chunking error: {0}")]
    Chunking(String),

    #[error("Data error: {0}")]
    Data(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid shape: expected {expected}, got {actual}")]
    Shape { expected: String, actual: String },
}

impl DriftGuardError {
    /// Shorthand for an invalid-arguments error
    pub fn invalid(msg: impl Into<String>) -> Self {
        DriftGuardError::InvalidArguments(msg.into())
    }

    /// Shorthand for a not-fitted error naming the component
    pub fn not_fitted(component: &str) -> Self {
        DriftGuardError::NotFitted(format!(
            "{} has not been fitted, call fit() with reference data first",
            component
        ))
    }
}

impl From<polars::error::PolarsError> for DriftGuardError {
    fn from(err: polars::error::PolarsError) -> Self {
        DriftGuardError::Data(err.to_string())
    }
}

impl From<serde_json::Error> for DriftGuardError {
    fn from(err: serde_json::Error) -> Self {
        DriftGuardError::Serialization(err.to_string())
    }
}

impl From<ndarray::ShapeError> for DriftGuardError {
    fn from(err: ndarray::ShapeError) -> Self {
        DriftGuardError::Shape {
            expected: "valid shape".to_string(),
            actual: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = DriftGuardError::InvalidArguments("data contains no rows".to_string());
        assert_eq!(err.to_string(), "Invalid arguments: data contains no rows");
    }

    #[test]
    fn test_missing_columns_lists_every_name() {
        let err = DriftGuardError::MissingColumns {
            columns: vec!["y_pred".to_string(), "timestamp".to_string()],
        };
        assert_eq!(err.to_string(), "Missing required columns: y_pred, timestamp");
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: DriftGuardError = io_err.into();
        assert!(matches!(err, DriftGuardError::Io(_)));
    }

    #[test]
    fn test_not_fitted_names_component() {
        let err = DriftGuardError::not_fitted("UnivariateDriftCalculator");
        assert!(err.to_string().contains("UnivariateDriftCalculator"));
    }
}
