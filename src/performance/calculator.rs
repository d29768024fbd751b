//! Chunk-wise realized performance

use super::{metric_components, metric_thresholds, realized_value, FittedComponent};
use crate::calculator::Calculator;
use crate::chunk::{Chunk, Chunker, ChunkerConfig, Period};
use crate::classification::{ClassificationColumns, ScoredBatch};
use crate::error::{DriftGuardError, Result};
use crate::metrics::{MetricKind, MetricSettings};
use crate::result::{MonitoringResult, ResultKind, ResultMetadata, ResultRow};
use crate::thresholds::ThresholdConfig;
use crate::utils::{has_column, require_columns, require_rows};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Configuration of a [`PerformanceCalculator`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceConfig {
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
}

impl PerformanceConfig {
    pub fn new(columns: ClassificationColumns, metrics: Vec<MetricKind>) -> Self {
        Self {
            columns,
            metrics,
            timestamp_column_name: None,
            chunker: ChunkerConfig::default(),
            metric_settings: MetricSettings::default(),
            thresholds: BTreeMap::new(),
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

    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        Ok(config)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    fn validate(&self) -> Result<BTreeMap<MetricKind, ThresholdConfig>> {
        self.columns.validate()?;
        self.metric_settings.validate(&self.metrics, self.columns.problem_type)?;
        metric_thresholds(&self.thresholds, &self.metrics)
    }
}

#[derive(Debug)]
struct FittedState {
    components: Vec<FittedComponent>,
    reference_rows: Vec<ResultRow>,
    metadata: ResultMetadata,
}

/// Computes metrics on labeled chunks
#[derive(Debug)]
pub struct PerformanceCalculator {
    config: PerformanceConfig,
    thresholds: BTreeMap<MetricKind, ThresholdConfig>,
    chunker: Arc<dyn Chunker>,
    state: Option<FittedState>,
    analysis_rows: Vec<ResultRow>,
}

impl PerformanceCalculator {
    pub fn new(config: PerformanceConfig) -> Result<Self> {
        let thresholds = config.validate()?;
        let chunker = config.chunker.build()?;
        Ok(Self {
            config,
            thresholds,
            chunker,
            state: None,
            analysis_rows: Vec::new(),
        })
    }

    pub fn config(&self) -> &PerformanceConfig {
        &self.config
    }

    fn split(&self, data: &DataFrame) -> Result<Vec<Chunk>> {
        let mut columns = self.config.columns.output_columns();
        columns.push(self.config.columns.y_true.clone());
        columns.extend(self.config.timestamp_column_name.iter().cloned());
        require_columns(data, &columns)?;
        self.chunker.split(
            data,
            self.config.timestamp_column_name.as_deref(),
            Some(columns.as_slice()),
            self.config.chunker.minimum_chunk_size(),
        )
    }

    fn evaluate_chunk(&self, components: &[FittedComponent], chunk: &Chunk) -> Result<ResultRow> {
        let batch = ScoredBatch::from_frame(&chunk.data, &self.config.columns, true)?;
        let labeled = batch.labeled();
        if labeled.is_empty() {
            warn!(chunk = %chunk.key, "chunk has no targets, realized metrics are NaN");
        }
        let values = components
            .iter()
            .map(|c| {
                let value = realized_value(
                    c.metric,
                    c.component,
                    &self.config.metric_settings,
                    self.config.columns.problem_type,
                    &labeled,
                );
                (c.key.clone(), c.record(value, None, labeled.len()))
            })
            .collect();
        let mut record = chunk.record();
        record.targets_missing_rate = Some(batch.targets_missing_rate());
        Ok(ResultRow { chunk: record, values })
    }

    fn state(&self) -> Result<&FittedState> {
        self.state
            .as_ref()
            .ok_or_else(|| DriftGuardError::not_fitted("PerformanceCalculator"))
    }
}

impl Calculator for PerformanceCalculator {
    fn fit(&mut self, reference: &DataFrame) -> Result<()> {
        require_rows(reference, "reference")?;
        info!(metrics = self.config.metrics.len(), rows = reference.height(), "fitting performance calculator");
        let problem_type = self.config.columns.problem_type;
        let settings = &self.config.metric_settings;

        let mut chunks = self.split(reference)?;
        for chunk in &mut chunks {
            chunk.period = Period::Reference;
            chunk.is_transition = false;
        }
        let labeled_chunks = chunks
            .iter()
            .map(|c| ScoredBatch::from_frame(&c.data, &self.config.columns, true).map(|b| b.labeled()))
            .collect::<Result<Vec<_>>>()?;
        let full = ScoredBatch::from_frame(reference, &self.config.columns, true)?.labeled();
        if full.is_empty() {
            return Err(DriftGuardError::invalid("reference data contains no labeled rows"));
        }

        let components: Vec<FittedComponent> = metric_components(&self.config.metrics)
            .into_iter()
            .map(|(metric, component)| {
                let reference_values: Vec<f64> = labeled_chunks
                    .iter()
                    .map(|batch| realized_value(metric, component, settings, problem_type, batch))
                    .collect();
                let threshold = &self.thresholds[&metric];
                FittedComponent::fit(metric, component, settings, problem_type, threshold, &reference_values, &full)
            })
            .collect();
        for c in &components {
            debug!(key = %c.key, lower = ?c.bounds.lower, upper = ?c.bounds.upper, "fitted metric thresholds");
        }

        let reference_rows = chunks
            .iter()
            .map(|chunk| self.evaluate_chunk(&components, chunk))
            .collect::<Result<Vec<_>>>()?;
        let metadata = ResultMetadata {
            kind: ResultKind::RealizedPerformance,
            entries: components.iter().map(FittedComponent::entry).collect(),
            timestamp_column_name: self.config.timestamp_column_name.clone(),
            chunker: self.chunker.to_string(),
            problem_type: Some(problem_type),
        };

        info!(chunks = reference_rows.len(), "performance calculator fitted");
        self.state = Some(FittedState {
            components,
            reference_rows,
            metadata,
        });
        self.analysis_rows.clear();
        Ok(())
    }

    fn calculate(&mut self, analysis: &DataFrame) -> Result<MonitoringResult> {
        let state = self.state()?;
        if !has_column(analysis, &self.config.columns.y_true) {
            return Err(DriftGuardError::MissingColumns {
                columns: vec![self.config.columns.y_true.clone()],
            });
        }
        let chunks = self.split(analysis)?;
        let rows = chunks
            .iter()
            .filter(|c| c.period == Period::Analysis)
            .map(|chunk| self.evaluate_chunk(&state.components, chunk))
            .collect::<Result<Vec<_>>>()?;
        let alerts = rows.iter().flat_map(|r| r.values.values()).filter(|r| r.alert).count();
        info!(chunks = rows.len(), alerts, "calculated realized performance");

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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::result::{ResultFilter, ResultKey};

    /// Correct predictions on every row except each `error_every`-th one
    fn frame(n: usize, error_every: usize, with_missing: bool) -> DataFrame {
        let y_true: Vec<Option<i64>> = (0..n)
            .map(|i| if with_missing && i % 4 == 0 { None } else { Some((i % 2) as i64) })
            .collect();
        let y_pred: Vec<i64> = (0..n)
            .map(|i| if i % error_every == 0 { 1 - (i % 2) as i64 } else { (i % 2) as i64 })
            .collect();
        let proba: Vec<f64> = y_pred
            .iter()
            .enumerate()
            .map(|(i, &p)| if p == 1 { 0.6 + (i % 7) as f64 / 20.0 } else { 0.4 - (i % 7) as f64 / 20.0 })
            .collect();
        df!("y_true" => y_true, "y_pred" => y_pred, "proba" => proba).unwrap()
    }

    fn config() -> PerformanceConfig {
        PerformanceConfig::new(
            ClassificationColumns::binary("y_true", "y_pred", "proba"),
            vec![MetricKind::Accuracy, MetricKind::ConfusionMatrix],
        )
        .with_chunker(ChunkerConfig::Size {
            chunk_size: 100,
            incomplete: Default::default(),
        })
    }

    #[test]
    fn test_realized_accuracy_per_chunk() {
        let mut calc = PerformanceCalculator::new(config()).unwrap();
        calc.fit(&frame(500, 10, false)).unwrap();
        let result = calc.calculate(&frame(200, 3, false)).unwrap();
        assert_eq!(result.kind(), ResultKind::RealizedPerformance);
        assert_eq!(result.len(), 7);

        let analysis = result.filter(&ResultFilter::new().with_period(Period::Analysis)).unwrap();
        for row in analysis.rows() {
            let accuracy = &row.values[&ResultKey::new("accuracy", "accuracy")];
            assert!(accuracy.value < 0.7);
            assert!(accuracy.alert);
            assert_eq!(row.chunk.targets_missing_rate, Some(0.0));
            assert!(row.values.contains_key(&ResultKey::new("true_positive", "confusion_matrix")));
        }
        let reference = result.filter(&ResultFilter::new().with_period(Period::Reference)).unwrap();
        for row in reference.rows() {
            assert!((row.values[&ResultKey::new("accuracy", "accuracy")].value - 0.9).abs() < 1e-12);
        }
    }

    #[test]
    fn test_targets_missing_rate_reported() {
        let mut calc = PerformanceCalculator::new(config()).unwrap();
        calc.fit(&frame(500, 10, false)).unwrap();
        let result = calc.calculate(&frame(100, 10, true)).unwrap();
        let last = result.rows().last().unwrap();
        assert_eq!(last.chunk.targets_missing_rate, Some(0.25));
    }

    #[test]
    fn test_calculate_requires_targets() {
        let mut calc = PerformanceCalculator::new(config()).unwrap();
        calc.fit(&frame(500, 10, false)).unwrap();
        let unlabeled = frame(100, 10, false).drop("y_true").unwrap();
        match calc.calculate(&unlabeled) {
            Err(DriftGuardError::MissingColumns { columns }) => assert_eq!(columns, vec!["y_true"]),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_binary_only_metric_rejected_for_multiclass() {
        let mut map = BTreeMap::new();
        map.insert("a".to_string(), "pa".to_string());
        map.insert("b".to_string(), "pb".to_string());
        map.insert("c".to_string(), "pc".to_string());
        let columns = ClassificationColumns::multiclass("y_true", "y_pred", map);
        assert!(PerformanceCalculator::new(PerformanceConfig::new(columns, vec![MetricKind::ConfusionMatrix])).is_err());
    }

    #[test]
    fn test_cumulative_result_accumulates() {
        let mut calc = PerformanceCalculator::new(config()).unwrap();
        calc.fit(&frame(500, 10, false)).unwrap();
        calc.calculate(&frame(100, 10, false)).unwrap();
        calc.calculate(&frame(200, 10, false)).unwrap();
        let cumulative = calc.cumulative_result().unwrap();
        assert_eq!(cumulative.len(), 8);
    }
}
