//! DriftGuard - Post-deployment monitoring for ML models
//!
//! This crate splits streams of scored predictions into chunks and, per chunk:
//! - Estimates classification performance from predicted probabilities alone
//! - Computes realized performance once targets arrive
//! - Detects univariate drift against a reference baseline
//! - Tracks missing values
//!
//! Every monitor learns thresholds and sampling errors from reference data
//! and raises alerts when a chunk leaves the expected range.
//!
//! # Modules
//!
//! ## Monitors
//! - [`estimation`] - Confidence-based performance estimation (CBPE)
//! - [`performance`] - Realized performance metrics
//! - [`drift`] - Univariate drift methods, calculator and ranking
//! - [`data_quality`] - Missing values per column
//!
//! ## Building blocks
//! - [`chunk`] - Size, count, period and default chunkers
//! - [`thresholds`] - Alert threshold policies
//! - [`sampling_error`] - Standard errors of chunk-level values
//! - [`metrics`] - Metric kinds, confusion counts and settings
//! - [`calibration`] - Probability calibration
//! - [`classification`] - Model output columns
//!
//! ## Results
//! - [`result`] - Chunk-wise result containers, filtering and plot data
//! - [`calculator`] - Fit/calculate lifecycle traits

// Core error handling
pub mod error;

// Building blocks
pub mod calibration;
pub mod chunk;
pub mod classification;
pub mod metrics;
pub mod sampling_error;
pub mod thresholds;
pub mod utils;

// Monitors
pub mod calculator;
pub mod data_quality;
pub mod drift;
pub mod estimation;
pub mod performance;

// Results
pub mod result;

pub use error::{DriftGuardError, Result};

/// Re-export commonly used types
pub mod prelude {
    // Error handling
    pub use crate::error::{DriftGuardError, Result};

    // Lifecycle
    pub use crate::calculator::{Calculator, Estimator};

    // Chunking
    pub use crate::chunk::{Chunk, Chunker, ChunkerConfig, IncompleteChunk, Period, PeriodOffset};

    // Thresholds
    pub use crate::thresholds::{ThresholdBounds, ThresholdConfig, ValueLimits};

    // Model outputs and metrics
    pub use crate::classification::{ClassificationColumns, ModelOutputs, ProblemType};
    pub use crate::metrics::{
        BusinessValueMatrix, BusinessValueNormalization, ConfusionMatrixNormalization, MetricKind, MetricSettings,
    };

    // Monitors
    pub use crate::data_quality::{MissingValuesCalculator, MissingValuesConfig};
    pub use crate::drift::{AlertCountRanker, UnivariateDriftCalculator, UnivariateDriftConfig};
    pub use crate::estimation::{Cbpe, CbpeConfig};
    pub use crate::performance::{PerformanceCalculator, PerformanceConfig};

    // Calibration
    pub use crate::calibration::{Calibrator, IsotonicRegression};

    // Results
    pub use crate::result::{MonitoringResult, PlotKind, Plotter, ResultFilter, ResultKey};
}
