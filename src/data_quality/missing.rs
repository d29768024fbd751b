//! Missing values per column and chunk

use crate::calculator::Calculator;
use crate::chunk::{Chunk, Chunker, ChunkerConfig, Period};
use crate::error::{DriftGuardError, Result};
use crate::result::{MetricRecord, MonitoringResult, ResultEntry, ResultKey, ResultKind, ResultMetadata, ResultRow};
use crate::sampling_error::{confidence_bounds, SamplingErrorComponents, SamplingErrorModel};
use crate::thresholds::{calculate_threshold_values, ThresholdBounds, ThresholdConfig, ValueLimits};
use crate::utils::stats::population_std;
use crate::utils::{missing_mask, require_columns, require_rows};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

pub const MISSING_VALUES_RATE: &str = "missing_values_rate";
pub const MISSING_VALUES_COUNT: &str = "missing_values_count";

fn default_normalize() -> bool {
    true
}

/// Configuration of a [`MissingValuesCalculator`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MissingValuesConfig {
    pub column_names: Vec<String>,
    #[serde(default)]
    pub timestamp_column_name: Option<String>,
    #[serde(default)]
    pub chunker: ChunkerConfig,
    /// Report the missing rate instead of the count
    #[serde(default = "default_normalize")]
    pub normalize: bool,
    #[serde(default)]
    pub threshold: ThresholdConfig,
}

impl MissingValuesConfig {
    pub fn new<I, S>(column_names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            column_names: column_names.into_iter().map(Into::into).collect(),
            timestamp_column_name: None,
            chunker: ChunkerConfig::default(),
            normalize: true,
            threshold: ThresholdConfig::default(),
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

    pub fn with_normalize(mut self, normalize: bool) -> Self {
        self.normalize = normalize;
        self
    }

    pub fn with_threshold(mut self, threshold: ThresholdConfig) -> Self {
        self.threshold = threshold;
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

    fn metric(&self) -> &'static str {
        if self.normalize {
            MISSING_VALUES_RATE
        } else {
            MISSING_VALUES_COUNT
        }
    }

    fn limits(&self) -> ValueLimits {
        if self.normalize {
            ValueLimits::UNIT_INTERVAL
        } else {
            ValueLimits::NON_NEGATIVE
        }
    }
}

#[derive(Debug)]
struct FittedColumn {
    name: String,
    bounds: ThresholdBounds,
    sampling_error: SamplingErrorModel,
}

#[derive(Debug)]
struct FittedState {
    columns: Vec<FittedColumn>,
    reference_rows: Vec<ResultRow>,
    metadata: ResultMetadata,
}

/// Reports how many values are missing in each monitored column
#[derive(Debug)]
pub struct MissingValuesCalculator {
    config: MissingValuesConfig,
    chunker: Arc<dyn Chunker>,
    state: Option<FittedState>,
    analysis_rows: Vec<ResultRow>,
}

impl MissingValuesCalculator {
    pub fn new(config: MissingValuesConfig) -> Result<Self> {
        if config.column_names.is_empty() {
            return Err(DriftGuardError::invalid("column_names must not be empty"));
        }
        let chunker = config.chunker.build()?;
        Ok(Self {
            config,
            chunker,
            state: None,
            analysis_rows: Vec::new(),
        })
    }

    pub fn config(&self) -> &MissingValuesConfig {
        &self.config
    }

    fn split(&self, data: &DataFrame) -> Result<Vec<Chunk>> {
        let mut required = self.config.column_names.clone();
        required.extend(self.config.timestamp_column_name.iter().cloned());
        require_columns(data, &required)?;
        self.chunker.split(
            data,
            self.config.timestamp_column_name.as_deref(),
            Some(self.config.column_names.as_slice()),
            self.config.chunker.minimum_chunk_size(),
        )
    }

    fn chunk_value(&self, chunk: &Chunk, column: &str) -> Result<f64> {
        let missing = missing_mask(&chunk.data, column)?.into_iter().filter(|m| *m).count() as f64;
        if !self.config.normalize {
            return Ok(missing);
        }
        Ok(if chunk.is_empty() {
            f64::NAN
        } else {
            missing / chunk.len() as f64
        })
    }

    fn evaluate_chunk(&self, columns: &[FittedColumn], chunk: &Chunk) -> Result<ResultRow> {
        let limits = self.config.limits();
        let mut values = BTreeMap::new();
        for column in columns {
            let value = self.chunk_value(chunk, &column.name)?;
            let sampling_error = column.sampling_error.sampling_error(chunk.len());
            let (lower_cb, upper_cb) = confidence_bounds(value, sampling_error, limits);
            values.insert(
                ResultKey::new(column.name.clone(), self.config.metric()),
                MetricRecord {
                    value,
                    p_value: None,
                    realized: None,
                    sampling_error,
                    upper_confidence_boundary: upper_cb,
                    lower_confidence_boundary: lower_cb,
                    upper_threshold: column.bounds.upper,
                    lower_threshold: column.bounds.lower,
                    alert: column.bounds.is_alert(value),
                },
            );
        }
        Ok(ResultRow {
            chunk: chunk.record(),
            values,
        })
    }

    fn state(&self) -> Result<&FittedState> {
        self.state
            .as_ref()
            .ok_or_else(|| DriftGuardError::not_fitted("MissingValuesCalculator"))
    }
}

impl Calculator for MissingValuesCalculator {
    fn fit(&mut self, reference: &DataFrame) -> Result<()> {
        require_rows(reference, "reference")?;
        info!(columns = self.config.column_names.len(), rows = reference.height(), "fitting missing values calculator");
        let mut chunks = self.split(reference)?;
        for chunk in &mut chunks {
            chunk.period = Period::Reference;
            chunk.is_transition = false;
        }

        let mut columns = Vec::with_capacity(self.config.column_names.len());
        for name in &self.config.column_names {
            let mask: Vec<f64> = missing_mask(reference, name)?
                .into_iter()
                .map(|m| if m { 1.0 } else { 0.0 })
                .collect();
            let std = population_std(&mask);
            let components = if self.config.normalize {
                SamplingErrorComponents::mean(std, 1.0)
            } else {
                SamplingErrorComponents::sum(std, 1.0)
            };
            let reference_values = chunks
                .iter()
                .map(|chunk| self.chunk_value(chunk, name))
                .collect::<Result<Vec<_>>>()?;
            let bounds = calculate_threshold_values(&self.config.threshold, &reference_values, self.config.limits());
            debug!(column = %name, lower = ?bounds.lower, upper = ?bounds.upper, "fitted missing values thresholds");
            columns.push(FittedColumn {
                name: name.clone(),
                bounds,
                sampling_error: SamplingErrorModel::new(vec![components]),
            });
        }

        let reference_rows = chunks
            .iter()
            .map(|chunk| self.evaluate_chunk(&columns, chunk))
            .collect::<Result<Vec<_>>>()?;
        let display_name = if self.config.normalize {
            "Missing Values Rate"
        } else {
            "Missing Values Count"
        };
        let metadata = ResultMetadata {
            kind: ResultKind::MissingValues,
            entries: columns
                .iter()
                .map(|c| ResultEntry {
                    key: ResultKey::new(c.name.clone(), self.config.metric()),
                    display_name: display_name.to_string(),
                })
                .collect(),
            timestamp_column_name: self.config.timestamp_column_name.clone(),
            chunker: self.chunker.to_string(),
            problem_type: None,
        };

        info!(chunks = reference_rows.len(), "missing values calculator fitted");
        self.state = Some(FittedState {
            columns,
            reference_rows,
            metadata,
        });
        self.analysis_rows.clear();
        Ok(())
    }

    fn calculate(&mut self, analysis: &DataFrame) -> Result<MonitoringResult> {
        let state = self.state()?;
        let chunks = self.split(analysis)?;
        let rows = chunks
            .iter()
            .filter(|c| c.period == Period::Analysis)
            .map(|chunk| self.evaluate_chunk(&state.columns, chunk))
            .collect::<Result<Vec<_>>>()?;
        let alerts = rows.iter().flat_map(|r| r.values.values()).filter(|r| r.alert).count();
        info!(chunks = rows.len(), alerts, "calculated missing values");

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
