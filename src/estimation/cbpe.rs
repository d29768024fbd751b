//! Confidence-based performance estimation

use super::estimated_value;
use crate::calculator::Estimator;
use crate::calibration::{needs_calibration, Calibrator, IsotonicRegression};
use crate::chunk::{Chunk, Chunker, ChunkerConfig, Period};
use crate::classification::{ClassificationColumns, LabeledBatch, ProblemType, ScoredBatch};
use crate::error::{DriftGuardError, Result};
use crate::metrics::{MetricKind, MetricSettings};
use crate::performance::{metric_components, metric_thresholds, realized_value, FittedComponent};
use crate::result::{MonitoringResult, ResultKey, ResultKind, ResultMetadata, ResultRow};
use crate::thresholds::ThresholdConfig;
use crate::utils::{has_column, nan_std, require_columns, require_rows};
use ndarray::Array1;
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

/// Builds an unfitted calibrator
pub type CalibratorFactory = fn() -> Box<dyn Calibrator>;

fn isotonic() -> Box<dyn Calibrator> {
    Box::new(IsotonicRegression::new())
}

fn default_calibrate() -> bool {
    true
}

/// Configuration of a [`Cbpe`] estimator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CbpeConfig {
    pub columns: ClassificationColumns,
    pub metrics: Vec<MetricKind>,
    #[serde(default)]
    pub timestamp_column_name: Option<String>,
    #[serde(default)]
    pub chunker: ChunkerConfig,
    #[serde(default)]
    pub metric_settings: MetricSettings,
    /// Threshold policy overrides keyed by metric key
    #[serde(default)]
    pub thresholds: BTreeMap<String, ThresholdConfig>,
    /// Calibrate probabilities when the reference shows it helps
    #[serde(default = "default_calibrate")]
    pub calibrate: bool,
}

impl CbpeConfig {
    pub fn new(columns: ClassificationColumns, metrics: Vec<MetricKind>) -> Self {
        Self {
            columns,
            metrics,
            timestamp_column_name: None,
            chunker: ChunkerConfig::default(),
            metric_settings: MetricSettings::default(),
            thresholds: BTreeMap::new(),
            calibrate: true,
        }
    }

    pub fn with_timestamp_column(mut self, name: impl Into<String>) -> Self {
        self.timestamp_column_name = Some(name.into());
        self
    }

    pub fn with_chunker(mut self, chunker: ChunkerConfig) -> Self {
        self.chunker = chunker;
        self
    }

    pub fn with_metric_settings(mut self, settings: MetricSettings) -> Self {
        self.metric_settings = settings;
        self
    }

    pub fn with_threshold(mut self, metric: MetricKind, threshold: ThresholdConfig) -> Self {
        self.thresholds.insert(metric.key().to_string(), threshold);
        self
    }

    pub fn with_calibration(mut self, calibrate: bool) -> Self {
        self.calibrate = calibrate;
        self
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        Ok(config)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }
}

/// Per-class calibrators, `None` where raw probabilities are kept
#[derive(Debug)]
struct ClassCalibration {
    calibrators: Vec<Option<Box<dyn Calibrator>>>,
}

impl ClassCalibration {
    fn identity(n_classes: usize) -> Self {
        Self {
            calibrators: (0..n_classes).map(|_| None).collect(),
        }
    }

    fn fit(reference: &LabeledBatch, problem_type: ProblemType, factory: CalibratorFactory) -> Result<Self> {
        let mut calibration = Self::identity(reference.n_classes);
        // binary probabilities of class 0 follow from class 1
        let classes: Vec<usize> = match problem_type {
            ProblemType::BinaryClassification => vec![1],
            ProblemType::MulticlassClassification => (0..reference.n_classes).collect(),
        };
        for class in classes {
            let y_true: Array1<f64> = reference
                .true_is(class)
                .into_iter()
                .map(|t| if t { 1.0 } else { 0.0 })
                .collect();
            let y_proba = Array1::from_vec(reference.y_proba[class].clone());
            let mut candidate = factory();
            if needs_calibration(&y_true, &y_proba, candidate.as_mut())? {
                let mut calibrator = factory();
                calibrator.fit(&y_proba, &y_true)?;
                calibration.calibrators[class] = Some(calibrator);
                debug!(class, "calibrating predicted probabilities");
            } else {
                debug!(class, "predicted probabilities need no calibration");
            }
        }
        Ok(calibration)
    }

    fn is_identity(&self) -> bool {
        self.calibrators.iter().all(Option::is_none)
    }

    fn apply(&self, batch: &mut ScoredBatch, problem_type: ProblemType) -> Result<()> {
        if batch.is_empty() || self.is_identity() {
            return Ok(());
        }
        for (class, calibrator) in self.calibrators.iter().enumerate() {
            if let Some(calibrator) = calibrator {
                let raw = Array1::from_vec(std::mem::take(&mut batch.y_proba[class]));
                batch.y_proba[class] = calibrator.calibrate(&raw)?.to_vec();
            }
        }
        match problem_type {
            ProblemType::BinaryClassification => {
                batch.y_proba[0] = batch.y_proba[1].iter().map(|p| 1.0 - p).collect();
            }
            ProblemType::MulticlassClassification => {
                for row in 0..batch.len() {
                    let total: f64 = batch.y_proba.iter().map(|p| p[row]).sum();
                    if total > 0.0 {
                        for probabilities in batch.y_proba.iter_mut() {
                            probabilities[row] /= total;
                        }
                    }
                }
            }
        }
        Ok(())
    }
}

#[derive(Debug)]
struct FittedState {
    calibration: ClassCalibration,
    components: Vec<FittedComponent>,
    confidence_deviations: BTreeMap<ResultKey, f64>,
    reference_rows: Vec<ResultRow>,
    metadata: ResultMetadata,
}

/// Estimates classification performance from predicted probabilities
///
/// Thresholds and sampling errors come from labeled reference data. Analysis
/// chunks need no targets; when they carry some, the realized value is
/// reported next to the estimate.
#[derive(Debug)]
pub struct Cbpe {
    config: CbpeConfig,
    thresholds: BTreeMap<MetricKind, ThresholdConfig>,
    chunker: Arc<dyn Chunker>,
    calibrator_factory: CalibratorFactory,
    state: Option<FittedState>,
    analysis_rows: Vec<ResultRow>,
}

impl Cbpe {
    pub fn new(config: CbpeConfig) -> Result<Self> {
        config.columns.validate()?;
        config
            .metric_settings
            .validate(&config.metrics, config.columns.problem_type)?;
        let thresholds = metric_thresholds(&config.thresholds, &config.metrics)?;
        let chunker = config.chunker.build()?;
        Ok(Self {
            config,
            thresholds,
            chunker,
            calibrator_factory: isotonic,
            state: None,
            analysis_rows: Vec::new(),
        })
    }

    /// Use another calibrator than isotonic regression
    pub fn with_calibrator(mut self, factory: CalibratorFactory) -> Self {
        self.calibrator_factory = factory;
        self
    }

    pub fn config(&self) -> &CbpeConfig {
        &self.config
    }

    /// Std of the estimated values over reference chunks
    pub fn confidence_deviation(&self, key: &ResultKey) -> Option<f64> {
        self.state.as_ref()?.confidence_deviations.get(key).copied()
    }

    /// Whether any class probabilities are calibrated, after fitting
    pub fn is_calibrated(&self) -> Option<bool> {
        self.state.as_ref().map(|s| !s.calibration.is_identity())
    }

    fn split(&self, data: &DataFrame) -> Result<Vec<Chunk>> {
        let mut columns = self.config.columns.output_columns();
        if has_column(data, &self.config.columns.y_true) {
            columns.push(self.config.columns.y_true.clone());
        }
        columns.extend(self.config.timestamp_column_name.iter().cloned());
        require_columns(data, &columns)?;
        self.chunker.split(
            data,
            self.config.timestamp_column_name.as_deref(),
            Some(columns.as_slice()),
            self.config.chunker.minimum_chunk_size(),
        )
    }

    /// Calibrated outputs of a chunk and its labeled rows before calibration
    fn prepare(&self, calibration: &ClassCalibration, data: &DataFrame) -> Result<(ScoredBatch, LabeledBatch)> {
        let mut batch = ScoredBatch::from_frame(data, &self.config.columns, false)?;
        let labeled = batch.labeled();
        calibration.apply(&mut batch, self.config.columns.problem_type)?;
        Ok((batch, labeled))
    }

    fn evaluate_chunk(
        &self,
        calibration: &ClassCalibration,
        components: &[FittedComponent],
        chunk: &Chunk,
    ) -> Result<ResultRow> {
        let (batch, labeled) = self.prepare(calibration, &chunk.data)?;
        let problem_type = self.config.columns.problem_type;
        let settings = &self.config.metric_settings;
        let values = components
            .iter()
            .map(|c| {
                let estimate = estimated_value(c.metric, c.component, settings, problem_type, &batch);
                let realized = (!labeled.is_empty())
                    .then(|| realized_value(c.metric, c.component, settings, problem_type, &labeled));
                (c.key.clone(), c.record(estimate, realized, batch.len()))
            })
            .collect();
        Ok(ResultRow {
            chunk: chunk.record(),
            values,
        })
    }

    fn state(&self) -> Result<&FittedState> {
        self.state.as_ref().ok_or_else(|| DriftGuardError::not_fitted("Cbpe"))
    }
}

impl Estimator for Cbpe {
    fn fit(&mut self, reference: &DataFrame) -> Result<()> {
        require_rows(reference, "reference")?;
        require_columns(reference, &[self.config.columns.y_true.as_str()])?;
        info!(metrics = self.config.metrics.len(), rows = reference.height(), "fitting CBPE");
        let problem_type = self.config.columns.problem_type;
        let settings = &self.config.metric_settings;

        let full = ScoredBatch::from_frame(reference, &self.config.columns, true)?.labeled();
        if full.is_empty() {
            return Err(DriftGuardError::invalid("reference data contains no labeled rows"));
        }
        let calibration = if self.config.calibrate {
            ClassCalibration::fit(&full, problem_type, self.calibrator_factory)?
        } else {
            ClassCalibration::identity(full.n_classes)
        };

        let mut chunks = self.split(reference)?;
        for chunk in &mut chunks {
            chunk.period = Period::Reference;
            chunk.is_transition = false;
        }
        let prepared = chunks
            .iter()
            .map(|c| self.prepare(&calibration, &c.data))
            .collect::<Result<Vec<_>>>()?;

        let mut components = Vec::new();
        let mut confidence_deviations = BTreeMap::new();
        for (metric, component) in metric_components(&self.config.metrics) {
            let realized: Vec<f64> = prepared
                .iter()
                .map(|(_, labeled)| realized_value(metric, component, settings, problem_type, labeled))
                .collect();
            let estimated: Vec<f64> = prepared
                .iter()
                .map(|(batch, _)| estimated_value(metric, component, settings, problem_type, batch))
                .collect();
            let fitted = FittedComponent::fit(
                metric,
                component,
                settings,
                problem_type,
                &self.thresholds[&metric],
                &realized,
                &full,
            );
            let deviation = nan_std(&estimated);
            debug!(
                key = %fitted.key,
                lower = ?fitted.bounds.lower,
                upper = ?fitted.bounds.upper,
                confidence_deviation = deviation,
                "fitted estimated metric"
            );
            confidence_deviations.insert(fitted.key.clone(), deviation);
            components.push(fitted);
        }

        let reference_rows = chunks
            .iter()
            .map(|chunk| self.evaluate_chunk(&calibration, &components, chunk))
            .collect::<Result<Vec<_>>>()?;
        let metadata = ResultMetadata {
            kind: ResultKind::PerformanceEstimation,
            entries: components.iter().map(FittedComponent::entry).collect(),
            timestamp_column_name: self.config.timestamp_column_name.clone(),
            chunker: self.chunker.to_string(),
            problem_type: Some(problem_type),
        };

        info!(
            chunks = reference_rows.len(),
            calibrated = !calibration.is_identity(),
            "CBPE fitted"
        );
        self.state = Some(FittedState {
            calibration,
            components,
            confidence_deviations,
            reference_rows,
            metadata,
        });
        self.analysis_rows.clear();
        Ok(())
    }

    fn estimate(&mut self, analysis: &DataFrame) -> Result<MonitoringResult> {
        let state = self.state()?;
        let chunks = self.split(analysis)?;
        let rows = chunks
            .iter()
            .filter(|c| c.period == Period::Analysis)
            .map(|chunk| self.evaluate_chunk(&state.calibration, &state.components, chunk))
            .collect::<Result<Vec<_>>>()?;
        let alerts = rows.iter().flat_map(|r| r.values.values()).filter(|r| r.alert).count();
        info!(chunks = rows.len(), alerts, "estimated performance");

        let result = MonitoringResult::with_rows(state.metadata.clone(), &state.reference_rows, &rows);
        self.analysis_rows.extend(rows);
        Ok(result)
    }

    fn cumulative_result(&self) -> Result<MonitoringResult> {
        let state = self.state()?;
        Ok(MonitoringResult::with_rows(
            state.metadata.clone(),
            &state.reference_rows,
            &self.analysis_rows,
        ))
    }
}
