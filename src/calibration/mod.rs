//! Probability calibration
//!
//! Estimators trust predicted probabilities as expected outcomes, so
//! miscalibrated scores are mapped through a [`Calibrator`] fitted on
//! reference data first.

mod isotonic;
mod metrics;

pub use isotonic::IsotonicRegression;
pub use metrics::{expected_calibration_error, CalibrationBins};

use crate::error::{DriftGuardError, Result};
use ndarray::Array1;
use tracing::debug;

/// Number of equal-width bins used to measure calibration error
pub const CALIBRATION_BIN_COUNT: usize = 10;

/// Trait for probability calibrators
pub trait Calibrator: std::fmt::Debug + Send + Sync {
    /// Fit the calibrator on predicted probabilities and true labels
    fn fit(&mut self, probs: &Array1<f64>, labels: &Array1<f64>) -> Result<()>;

    /// Calibrate probabilities
    fn calibrate(&self, probs: &Array1<f64>) -> Result<Array1<f64>>;

    /// Fit and calibrate in one step
    fn fit_calibrate(&mut self, probs: &Array1<f64>, labels: &Array1<f64>) -> Result<Array1<f64>> {
        self.fit(probs, labels)?;
        self.calibrate(probs)
    }
}

/// Whether calibrating `y_proba` lowers its expected calibration error
///
/// Rows are split into alternating halves; the calibrator is fitted on one
/// half and the calibration error of raw and calibrated probabilities is
/// compared on the other.
pub fn needs_calibration(y_true: &Array1<f64>, y_proba: &Array1<f64>, calibrator: &mut dyn Calibrator) -> Result<bool> {
    if y_true.len() != y_proba.len() {
        return Err(DriftGuardError::Shape {
            expected: format!("{} targets", y_proba.len()),
            actual: format!("{} targets", y_true.len()),
        });
    }
    if y_true.iter().any(|v| v.is_nan()) {
        return Err(DriftGuardError::invalid("target values contain NaN"));
    }
    if y_proba.iter().any(|v| v.is_nan()) {
        return Err(DriftGuardError::invalid("predicted probabilities contain NaN"));
    }
    if y_true.len() < 2 {
        return Ok(false);
    }

    let raw_ece = expected_calibration_error(y_proba, y_true, CALIBRATION_BIN_COUNT)?;
    if raw_ece == 0.0 {
        return Ok(false);
    }

    let half = |parity: usize, values: &Array1<f64>| -> Array1<f64> {
        values.iter().skip(parity).step_by(2).copied().collect()
    };
    let (fit_true, fit_proba) = (half(0, y_true), half(0, y_proba));
    let (test_true, test_proba) = (half(1, y_true), half(1, y_proba));

    calibrator.fit(&fit_proba, &fit_true)?;
    let calibrated = calibrator.calibrate(&test_proba)?;

    let before = expected_calibration_error(&test_proba, &test_true, CALIBRATION_BIN_COUNT)?;
    let after = expected_calibration_error(&calibrated, &test_true, CALIBRATION_BIN_COUNT)?;
    debug!(ece_before = before, ece_after = after, "compared calibration error");
    Ok(after < before)
}
