//! Chunk-wise univariate drift over many columns

use super::methods::{
    is_high_cardinality, ColumnValues, DriftMethod, FeatureType, MethodEvaluation, MethodRegistry, MethodSettings,
    JENSEN_SHANNON,
};
use crate::calculator::Calculator;
use crate::chunk::{Chunk, Chunker, ChunkerConfig, Period};
use crate::error::{DriftGuardError, Result};
use crate::result::{
    MetricRecord, MonitoringResult, ResultEntry, ResultKey, ResultKind, ResultMetadata, ResultRow,
};
use crate::sampling_error::{confidence_bounds, ChunkSpreadError};
use crate::thresholds::ThresholdConfig;
use crate::utils::{float_values, is_numeric_dtype, label_values, require_columns};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

/// Configuration of a [`UnivariateDriftCalculator`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnivariateDriftConfig {
    /// Columns to monitor
    pub column_names: Vec<String>,
    #[serde(default)]
    pub timestamp_column_name: Option<String>,
    #[serde(default)]
    pub chunker: ChunkerConfig,
    /// Method keys applied to continuous columns
    #[serde(default = "default_methods")]
    pub continuous_methods: Vec<String>,
    /// Method keys applied to categorical columns
    #[serde(default = "default_methods")]
    pub categorical_methods: Vec<String>,
    #[serde(default)]
    pub treat_as_categorical: Vec<String>,
    #[serde(default)]
    pub treat_as_continuous: Vec<String>,
    /// Threshold policy overrides keyed by method key
    #[serde(default)]
    pub thresholds: BTreeMap<String, ThresholdConfig>,
}

fn default_methods() -> Vec<String> {
    vec![JENSEN_SHANNON.to_string()]
}

impl UnivariateDriftConfig {
    pub fn new<I, S>(column_names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            column_names: column_names.into_iter().map(Into::into).collect(),
            timestamp_column_name: None,
            chunker: ChunkerConfig::default(),
            continuous_methods: default_methods(),
            categorical_methods: default_methods(),
            treat_as_categorical: Vec::new(),
            treat_as_continuous: Vec::new(),
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

    pub fn with_continuous_methods<I, S>(mut self, methods: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.continuous_methods = methods.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_categorical_methods<I, S>(mut self, methods: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.categorical_methods = methods.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_treat_as_categorical<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.treat_as_categorical = columns.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_treat_as_continuous<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.treat_as_continuous = columns.into_iter().map(Into::into).collect();
        self
    }

    /// Override the threshold policy of one method
    pub fn with_threshold(mut self, method: impl Into<String>, threshold: ThresholdConfig) -> Self {
        self.thresholds.insert(method.into(), threshold);
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

    fn settings(&self, method: &str) -> MethodSettings {
        MethodSettings {
            threshold: self.thresholds.get(method).cloned(),
        }
    }

    fn validate(&self, registry: &MethodRegistry) -> Result<()> {
        if self.column_names.is_empty() {
            return Err(DriftGuardError::invalid("column_names must not be empty"));
        }
        if self.continuous_methods.is_empty() && self.categorical_methods.is_empty() {
            return Err(DriftGuardError::invalid("no drift methods configured"));
        }
        if let Some(both) = self
            .treat_as_categorical
            .iter()
            .find(|c| self.treat_as_continuous.contains(c))
        {
            return Err(DriftGuardError::invalid(format!(
                "column '{}' is both in treat_as_categorical and treat_as_continuous",
                both
            )));
        }
        for (methods, feature_type) in [
            (&self.continuous_methods, FeatureType::Continuous),
            (&self.categorical_methods, FeatureType::Categorical),
        ] {
            for key in methods {
                // constructing validates the key, the feature type and the settings
                registry.create(key, feature_type, &self.settings(key))?;
            }
        }
        Ok(())
    }
}

/// Decide whether a reference column is compared as continuous or categorical
pub fn detect_feature_type(df: &DataFrame, name: &str, config: &UnivariateDriftConfig) -> Result<FeatureType> {
    require_columns(df, &[name])?;
    let dtype = df.column(name)?.dtype().clone();
    if config.treat_as_categorical.iter().any(|c| c == name) {
        return Ok(FeatureType::Categorical);
    }
    if config.treat_as_continuous.iter().any(|c| c == name) {
        if !is_numeric_dtype(&dtype) {
            return Err(DriftGuardError::invalid(format!(
                "column '{}' with dtype {} cannot be treated as continuous",
                name, dtype
            )));
        }
        return Ok(FeatureType::Continuous);
    }
    if !is_numeric_dtype(&dtype) {
        return Ok(FeatureType::Categorical);
    }

    let mut bits: Vec<u64> = float_values(df, name)?.into_iter().flatten().map(f64::to_bits).collect();
    let n_values = bits.len();
    bits.sort_unstable();
    bits.dedup();
    if is_high_cardinality(bits.len(), n_values) {
        Ok(FeatureType::Continuous)
    } else {
        Ok(FeatureType::Categorical)
    }
}

/// Non-missing values of a column in the representation of `feature_type`
pub fn column_values(df: &DataFrame, name: &str, feature_type: FeatureType) -> Result<ColumnValues> {
    Ok(match feature_type {
        FeatureType::Continuous => ColumnValues::Continuous(float_values(df, name)?.into_iter().flatten().collect()),
        FeatureType::Categorical => ColumnValues::Categorical(label_values(df, name)?.into_iter().flatten().collect()),
    })
}

#[derive(Debug)]
struct FittedMethod {
    method: Box<dyn DriftMethod>,
    sampling_error: ChunkSpreadError,
}

#[derive(Debug)]
struct FittedColumn {
    name: String,
    feature_type: FeatureType,
    methods: Vec<FittedMethod>,
}

#[derive(Debug)]
struct FittedState {
    columns: Vec<FittedColumn>,
    reference_rows: Vec<ResultRow>,
    metadata: ResultMetadata,
}

/// Compares every configured column of each chunk against the reference
#[derive(Debug)]
pub struct UnivariateDriftCalculator {
    config: UnivariateDriftConfig,
    registry: MethodRegistry,
    chunker: Arc<dyn Chunker>,
    state: Option<FittedState>,
    analysis_rows: Vec<ResultRow>,
}

impl UnivariateDriftCalculator {
    /// Calculator with the built-in methods
    pub fn new(config: UnivariateDriftConfig) -> Result<Self> {
        Self::with_registry(config, MethodRegistry::default())
    }

    /// Calculator resolving methods through a custom registry
    pub fn with_registry(config: UnivariateDriftConfig, registry: MethodRegistry) -> Result<Self> {
        config.validate(&registry)?;
        let chunker = config.chunker.build()?;
        Ok(Self {
            config,
            registry,
            chunker,
            state: None,
            analysis_rows: Vec::new(),
        })
    }

    pub fn config(&self) -> &UnivariateDriftConfig {
        &self.config
    }

    /// Detected feature type per column, after fitting
    pub fn feature_types(&self) -> Option<Vec<(&str, FeatureType)>> {
        self.state
            .as_ref()
            .map(|s| s.columns.iter().map(|c| (c.name.as_str(), c.feature_type)).collect())
    }

    fn required_columns(&self) -> Vec<String> {
        let mut columns = self.config.column_names.clone();
        columns.extend(self.config.timestamp_column_name.iter().cloned());
        columns
    }

    fn split(&self, data: &DataFrame) -> Result<Vec<Chunk>> {
        require_columns(data, &self.required_columns())?;
        self.chunker.split(
            data,
            self.config.timestamp_column_name.as_deref(),
            Some(self.config.column_names.as_slice()),
            self.config.chunker.minimum_chunk_size(),
        )
    }

    fn state(&self) -> Result<&FittedState> {
        self.state
            .as_ref()
            .ok_or_else(|| DriftGuardError::not_fitted("UnivariateDriftCalculator"))
    }
}

fn drift_record(fitted: &FittedMethod, evaluation: MethodEvaluation, chunk_size: usize) -> MetricRecord {
    let sampling_error = fitted.sampling_error.sampling_error(chunk_size);
    let (lower_cb, upper_cb) = confidence_bounds(evaluation.value, sampling_error, fitted.method.limits());
    let bounds = fitted.method.threshold_bounds();
    MetricRecord {
        value: evaluation.value,
        p_value: evaluation.p_value,
        realized: None,
        sampling_error,
        upper_confidence_boundary: upper_cb,
        lower_confidence_boundary: lower_cb,
        upper_threshold: bounds.upper,
        lower_threshold: bounds.lower,
        alert: evaluation.alert,
    }
}

fn evaluate_chunk(columns: &[FittedColumn], chunk: &Chunk) -> Result<ResultRow> {
    let mut values = BTreeMap::new();
    for column in columns {
        let chunk_values = column_values(&chunk.data, &column.name, column.feature_type)?;
        for fitted in &column.methods {
            let evaluation = fitted.method.evaluate(&chunk_values)?;
            values.insert(
                ResultKey::new(column.name.clone(), fitted.method.key()),
                drift_record(fitted, evaluation, chunk.len()),
            );
        }
    }
    Ok(ResultRow {
        chunk: chunk.record(),
        values,
    })
}

impl Calculator for UnivariateDriftCalculator {
    fn fit(&mut self, reference: &DataFrame) -> Result<()> {
        info!(columns = self.config.column_names.len(), rows = reference.height(), "fitting univariate drift calculator");
        let mut chunks = self.split(reference)?;
        for chunk in &mut chunks {
            chunk.period = Period::Reference;
            chunk.is_transition = false;
        }
        let chunk_sizes: Vec<usize> = chunks.iter().map(Chunk::len).collect();

        let mut columns = Vec::with_capacity(self.config.column_names.len());
        for name in &self.config.column_names {
            let feature_type = detect_feature_type(reference, name, &self.config)?;
            let method_keys = match feature_type {
                FeatureType::Continuous => &self.config.continuous_methods,
                FeatureType::Categorical => &self.config.categorical_methods,
            };
            let reference_values = column_values(reference, name, feature_type)?;
            let chunk_values = chunks
                .iter()
                .map(|chunk| column_values(&chunk.data, name, feature_type))
                .collect::<Result<Vec<_>>>()?;

            let mut methods = Vec::with_capacity(method_keys.len());
            for key in method_keys {
                let mut method = self.registry.create(key, feature_type, &self.config.settings(key))?;
                method.fit(&reference_values)?;
                let statistics = chunk_values
                    .iter()
                    .map(|values| method.statistic(values).map(|(value, _)| value))
                    .collect::<Result<Vec<_>>>()?;
                method.fit_thresholds(&statistics);
                methods.push(FittedMethod {
                    sampling_error: ChunkSpreadError::fit(&statistics, &chunk_sizes),
                    method,
                });
            }
            debug!(column = %name, feature_type = %feature_type, methods = methods.len(), "fitted column");
            columns.push(FittedColumn {
                name: name.clone(),
                feature_type,
                methods,
            });
        }

        let reference_rows = chunks
            .iter()
            .map(|chunk| evaluate_chunk(&columns, chunk))
            .collect::<Result<Vec<_>>>()?;

        let entries = columns
            .iter()
            .flat_map(|column| {
                column.methods.iter().map(move |fitted| ResultEntry {
                    key: ResultKey::new(column.name.clone(), fitted.method.key()),
                    display_name: fitted.method.display_name().to_string(),
                })
            })
            .collect();
        let metadata = ResultMetadata {
            kind: ResultKind::UnivariateDrift,
            entries,
            timestamp_column_name: self.config.timestamp_column_name.clone(),
            chunker: self.chunker.to_string(),
            problem_type: None,
        };

        info!(chunks = reference_rows.len(), "univariate drift calculator fitted");
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
        let mut rows = Vec::with_capacity(chunks.len());
        for chunk in chunks.iter().filter(|c| c.period == Period::Analysis) {
            rows.push(evaluate_chunk(&state.columns, chunk)?);
        }
        let skipped = chunks.len() - rows.len();
        if skipped > 0 {
            debug!(skipped, "skipped chunks holding only reference rows");
        }

        let alerts = rows
            .iter()
            .flat_map(|r| r.values.values())
            .filter(|r| r.alert)
            .count();
        info!(chunks = rows.len(), alerts, "calculated univariate drift");

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
    use crate::drift::methods::{CHI2, KOLMOGOROV_SMIRNOV};
    use crate::result::ResultFilter;

    fn frame(n: usize, shift: f64) -> DataFrame {
        let numeric: Vec<f64> = (0..n).map(|i| shift + ((i * 37) % 101) as f64 / 10.0).collect();
        let category: Vec<&str> = (0..n)
            .map(|i| if shift > 0.0 { "c" } else if i % 2 == 0 { "a" } else { "b" })
            .collect();
        df!("num" => numeric, "cat" => category).unwrap()
    }

    fn config() -> UnivariateDriftConfig {
        UnivariateDriftConfig::new(["num", "cat"])
            .with_chunker(ChunkerConfig::Size {
                chunk_size: 100,
                incomplete: Default::default(),
            })
            .with_continuous_methods([JENSEN_SHANNON, KOLMOGOROV_SMIRNOV])
            .with_categorical_methods([JENSEN_SHANNON, CHI2])
    }

    #[test]
    fn test_feature_type_detection() {
        let df = frame(1000, 0.0);
        let config = config();
        assert_eq!(detect_feature_type(&df, "num", &config).unwrap(), FeatureType::Continuous);
        assert_eq!(detect_feature_type(&df, "cat", &config).unwrap(), FeatureType::Categorical);
        let overridden = config.clone().with_treat_as_categorical(["num"]);
        assert_eq!(detect_feature_type(&df, "num", &overridden).unwrap(), FeatureType::Categorical);
        let invalid = config.with_treat_as_continuous(["cat"]);
        assert!(detect_feature_type(&df, "cat", &invalid).is_err());
    }

    #[test]
    fn test_fit_and_calculate() {
        let mut calc = UnivariateDriftCalculator::new(config()).unwrap();
        calc.fit(&frame(1000, 0.0)).unwrap();
        let result = calc.calculate(&frame(300, 20.0)).unwrap();
        assert_eq!(result.len(), 13);

        let analysis = result.filter(&ResultFilter::new().with_period(Period::Analysis)).unwrap();
        assert_eq!(analysis.len(), 3);
        for row in analysis.rows() {
            assert_eq!(row.values.len(), 4);
            assert!(row.values.values().all(|r| r.alert));
        }

        let reference = result.filter(&ResultFilter::new().with_period(Period::Reference)).unwrap();
        for row in reference.rows() {
            let js = &row.values[&ResultKey::new("num", JENSEN_SHANNON)];
            assert!(!js.alert);
            assert!(js.value >= 0.0 && js.value <= 1.0);
        }
    }

    #[test]
    fn test_calculate_before_fit() {
        let mut calc = UnivariateDriftCalculator::new(config()).unwrap();
        assert!(matches!(calc.calculate(&frame(100, 0.0)), Err(DriftGuardError::NotFitted(_))));
    }

    #[test]
    fn test_missing_columns_listed() {
        let mut calc = UnivariateDriftCalculator::new(UnivariateDriftConfig::new(["num", "x", "y"])).unwrap();
        match calc.fit(&frame(100, 0.0)) {
            Err(DriftGuardError::MissingColumns { columns }) => assert_eq!(columns, vec!["x", "y"]),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_invalid_method_rejected_at_construction() {
        let bad = UnivariateDriftConfig::new(["num"]).with_categorical_methods([KOLMOGOROV_SMIRNOV]);
        assert!(UnivariateDriftCalculator::new(bad).is_err());
        assert!(UnivariateDriftCalculator::new(UnivariateDriftConfig::new(Vec::<String>::new())).is_err());
    }

    #[test]
    fn test_config_from_json() {
        let config = UnivariateDriftConfig::from_json_str(
            r#"{
                "column_names": ["num"],
                "chunker": {"type": "count", "chunk_number": 5},
                "thresholds": {"jensen_shannon": {"type": "constant", "upper": 0.2}}
            }"#,
        )
        .unwrap();
        assert_eq!(config.continuous_methods, vec![JENSEN_SHANNON]);
        assert_eq!(config.chunker, ChunkerConfig::Count { chunk_number: 5 });
        assert_eq!(config.thresholds[JENSEN_SHANNON], ThresholdConfig::constant(None, Some(0.2)));
    }
}
