//! Calculator lifecycle shared by all monitors

use crate::error::Result;
use crate::result::MonitoringResult;
use polars::prelude::DataFrame;

/// Computes chunk-wise results from data
///
/// `fit` learns from reference data. Each `calculate` call returns the
/// reference rows followed by the analysis rows of that batch.
pub trait Calculator {
    fn fit(&mut self, reference: &DataFrame) -> Result<()>;

    fn calculate(&mut self, analysis: &DataFrame) -> Result<MonitoringResult>;

    /// Reference rows followed by the analysis rows of every call so far
    fn cumulative_result(&self) -> Result<MonitoringResult>;
}

/// Estimates chunk-wise results without targets
pub trait Estimator {
    fn fit(&mut self, reference: &DataFrame) -> Result<()>;

    fn estimate(&mut self, analysis: &DataFrame) -> Result<MonitoringResult>;

    /// Reference rows followed by the analysis rows of every call so far
    fn cumulative_result(&self) -> Result<MonitoringResult>;
}
