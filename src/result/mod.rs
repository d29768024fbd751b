//! Result containers
//!
//! Every calculator returns a [`MonitoringResult`]: one row per chunk, each
//! carrying a [`MetricRecord`] per `(column_name, metric)` key. Results own
//! a copy of the metadata they need for filtering and plotting.

mod plot;

pub use plot::{PlotData, PlotKind, Plotter};

use crate::chunk::Period;
use crate::classification::ProblemType;
use crate::error::{DriftGuardError, Result};
use chrono::NaiveDateTime;
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Chunk descriptor of a result row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkRecord {
    pub key: String,
    pub chunk_index: usize,
    pub start_index: usize,
    pub end_index: usize,
    pub start_date: Option<NaiveDateTime>,
    pub end_date: Option<NaiveDateTime>,
    pub period: Period,
    pub is_transition: bool,
    /// Share of rows without a target, realized performance only
    pub targets_missing_rate: Option<f64>,
}

/// Identifies the values of one column evaluated by one metric or method
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ResultKey {
    pub column_name: String,
    pub metric: String,
}

impl ResultKey {
    pub fn new(column_name: impl Into<String>, metric: impl Into<String>) -> Self {
        Self {
            column_name: column_name.into(),
            metric: metric.into(),
        }
    }

    /// Prefix of the flattened column names
    pub fn prefix(&self) -> String {
        if self.column_name == self.metric {
            self.metric.clone()
        } else {
            format!("{}_{}", self.column_name, self.metric)
        }
    }
}

impl fmt::Display for ResultKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.column_name, self.metric)
    }
}

/// Values of one key for one chunk
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetricRecord {
    /// Statistic, estimate or realized value
    pub value: f64,
    /// p-value of hypothesis-test methods
    pub p_value: Option<f64>,
    /// Realized value next to an estimate, when targets are available
    pub realized: Option<f64>,
    pub sampling_error: f64,
    pub upper_confidence_boundary: Option<f64>,
    pub lower_confidence_boundary: Option<f64>,
    pub upper_threshold: Option<f64>,
    pub lower_threshold: Option<f64>,
    pub alert: bool,
}

/// One chunk of a result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultRow {
    pub chunk: ChunkRecord,
    pub values: BTreeMap<ResultKey, MetricRecord>,
}

/// Calculator that produced a result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultKind {
    UnivariateDrift,
    PerformanceEstimation,
    RealizedPerformance,
    MissingValues,
}

impl fmt::Display for ResultKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ResultKind::UnivariateDrift => "univariate_drift",
            ResultKind::PerformanceEstimation => "performance_estimation",
            ResultKind::RealizedPerformance => "realized_performance",
            ResultKind::MissingValues => "missing_values",
        };
        write!(f, "{}", name)
    }
}

/// A key with its display name
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultEntry {
    pub key: ResultKey,
    pub display_name: String,
}

/// Metadata copied from the producing calculator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultMetadata {
    pub kind: ResultKind,
    /// Keys in reporting order
    pub entries: Vec<ResultEntry>,
    pub timestamp_column_name: Option<String>,
    /// Description of the chunker used
    pub chunker: String,
    pub problem_type: Option<ProblemType>,
}

impl ResultMetadata {
    /// Distinct column names in reporting order
    pub fn column_names(&self) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();
        for entry in &self.entries {
            if !names.contains(&entry.key.column_name) {
                names.push(entry.key.column_name.clone());
            }
        }
        names
    }

    /// Distinct metric or method keys in reporting order
    pub fn metrics(&self) -> Vec<String> {
        let mut metrics: Vec<String> = Vec::new();
        for entry in &self.entries {
            if !metrics.contains(&entry.key.metric) {
                metrics.push(entry.key.metric.clone());
            }
        }
        metrics
    }

    pub fn display_name(&self, key: &ResultKey) -> Option<&str> {
        self.entries
            .iter()
            .find(|e| &e.key == key)
            .map(|e| e.display_name.as_str())
    }
}

/// Selection applied by [`MonitoringResult::filter`]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResultFilter {
    /// Keep only rows of this period
    pub period: Option<Period>,
    /// Keep only these metrics or methods
    pub metrics: Option<Vec<String>>,
    /// Keep only these columns
    pub column_names: Option<Vec<String>>,
}

impl ResultFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_period(mut self, period: Period) -> Self {
        self.period = Some(period);
        self
    }

    pub fn with_metrics<I, S>(mut self, metrics: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.metrics = Some(metrics.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_column_names<I, S>(mut self, column_names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.column_names = Some(column_names.into_iter().map(Into::into).collect());
        self
    }
}

/// Chunk-keyed output of a calculator or estimator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitoringResult {
    rows: Vec<ResultRow>,
    metadata: ResultMetadata,
}

impl MonitoringResult {
    pub fn new(rows: Vec<ResultRow>, metadata: ResultMetadata) -> Self {
        Self { rows, metadata }
    }

    pub fn rows(&self) -> &[ResultRow] {
        &self.rows
    }

    pub fn metadata(&self) -> &ResultMetadata {
        &self.metadata
    }

    pub fn kind(&self) -> ResultKind {
        self.metadata.kind
    }

    /// Number of chunk rows
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Chunk keys in row order
    pub fn chunk_keys(&self) -> Vec<&str> {
        self.rows.iter().map(|r| r.chunk.key.as_str()).collect()
    }

    /// Records of one key in row order, with their chunks
    pub fn series(&self, column_name: &str, metric: &str) -> Result<Vec<(&ChunkRecord, &MetricRecord)>> {
        let key = ResultKey::new(column_name, metric);
        if self.metadata.display_name(&key).is_none() {
            return Err(DriftGuardError::invalid(format!("result has no values for '{}'", key)));
        }
        Ok(self
            .rows
            .iter()
            .filter_map(|row| row.values.get(&key).map(|record| (&row.chunk, record)))
            .collect())
    }

    /// Record of one key in one chunk
    pub fn get(&self, chunk_key: &str, column_name: &str, metric: &str) -> Option<&MetricRecord> {
        let key = ResultKey::new(column_name, metric);
        self.rows
            .iter()
            .find(|r| r.chunk.key == chunk_key)
            .and_then(|r| r.values.get(&key))
    }

    /// A new result restricted to the selected period, metrics and columns
    ///
    /// Unknown metric or column names are an error.
    pub fn filter(&self, filter: &ResultFilter) -> Result<MonitoringResult> {
        if let Some(metrics) = &filter.metrics {
            let known = self.metadata.metrics();
            if let Some(unknown) = metrics.iter().find(|m| !known.contains(m)) {
                return Err(DriftGuardError::invalid(format!(
                    "unknown metric '{}', result holds {:?}",
                    unknown, known
                )));
            }
        }
        if let Some(columns) = &filter.column_names {
            let known = self.metadata.column_names();
            if let Some(unknown) = columns.iter().find(|c| !known.contains(c)) {
                return Err(DriftGuardError::invalid(format!(
                    "unknown column '{}', result holds {:?}",
                    unknown, known
                )));
            }
        }

        let keep_key = |key: &ResultKey| {
            filter.metrics.as_ref().map_or(true, |m| m.contains(&key.metric))
                && filter
                    .column_names
                    .as_ref()
                    .map_or(true, |c| c.contains(&key.column_name))
        };

        let rows = self
            .rows
            .iter()
            .filter(|row| filter.period.map_or(true, |p| row.chunk.period == p))
            .map(|row| ResultRow {
                chunk: row.chunk.clone(),
                values: row
                    .values
                    .iter()
                    .filter(|(k, _)| keep_key(k))
                    .map(|(k, v)| (k.clone(), *v))
                    .collect(),
            })
            .collect();

        let mut metadata = self.metadata.clone();
        metadata.entries.retain(|e| keep_key(&e.key));
        Ok(MonitoringResult { rows, metadata })
    }

    /// Flatten into a polars frame
    ///
    /// Chunk columns come first, followed by `<prefix>_<field>` columns per
    /// key where the prefix is `<column_name>_<metric>`, or just the metric
    /// when both are equal. `p_value` and `realized` columns only appear when
    /// some row carries them.
    pub fn to_dataframe(&self) -> Result<DataFrame> {
        let chunks: Vec<&ChunkRecord> = self.rows.iter().map(|r| &r.chunk).collect();
        let mut columns: Vec<Column> = vec![
            Column::new("chunk_key".into(), chunks.iter().map(|c| c.key.as_str()).collect::<Vec<_>>()),
            Column::new(
                "chunk_index".into(),
                chunks.iter().map(|c| c.chunk_index as u64).collect::<Vec<_>>(),
            ),
            Column::new(
                "start_index".into(),
                chunks.iter().map(|c| c.start_index as u64).collect::<Vec<_>>(),
            ),
            Column::new(
                "end_index".into(),
                chunks.iter().map(|c| c.end_index as u64).collect::<Vec<_>>(),
            ),
            datetime_column("start_date", chunks.iter().map(|c| c.start_date))?,
            datetime_column("end_date", chunks.iter().map(|c| c.end_date))?,
            Column::new(
                "period".into(),
                chunks.iter().map(|c| c.period.to_string()).collect::<Vec<_>>(),
            ),
            Column::new(
                "is_transition".into(),
                chunks.iter().map(|c| c.is_transition).collect::<Vec<_>>(),
            ),
        ];
        if chunks.iter().any(|c| c.targets_missing_rate.is_some()) {
            columns.push(Column::new(
                "targets_missing_rate".into(),
                chunks.iter().map(|c| c.targets_missing_rate).collect::<Vec<_>>(),
            ));
        }

        for entry in &self.metadata.entries {
            let records: Vec<Option<&MetricRecord>> = self.rows.iter().map(|r| r.values.get(&entry.key)).collect();
            let prefix = entry.key.prefix();
            let optional = |name: &str, f: fn(&MetricRecord) -> Option<f64>| {
                Column::new(
                    format!("{}_{}", prefix, name).into(),
                    records.iter().map(|r| r.and_then(f)).collect::<Vec<_>>(),
                )
            };

            columns.push(optional("value", |r| Some(r.value)));
            if records.iter().flatten().any(|r| r.p_value.is_some()) {
                columns.push(optional("p_value", |r| r.p_value));
            }
            if records.iter().flatten().any(|r| r.realized.is_some()) {
                columns.push(optional("realized", |r| r.realized));
            }
            columns.push(optional("sampling_error", |r| Some(r.sampling_error)));
            columns.push(optional("upper_confidence_boundary", |r| r.upper_confidence_boundary));
            columns.push(optional("lower_confidence_boundary", |r| r.lower_confidence_boundary));
            columns.push(optional("upper_threshold", |r| r.upper_threshold));
            columns.push(optional("lower_threshold", |r| r.lower_threshold));
            columns.push(Column::new(
                format!("{}_alert", prefix).into(),
                records.iter().map(|r| r.map_or(false, |r| r.alert)).collect::<Vec<_>>(),
            ));
        }

        Ok(DataFrame::new(columns)?)
    }

    /// Hand the series of one key to a plotting collaborator
    pub fn plot<P: Plotter>(&self, plotter: &P, kind: PlotKind, column_name: &str, metric: &str) -> Result<P::Output> {
        if !kind.supports(self.kind()) {
            return Err(DriftGuardError::invalid(format!(
                "plot kind '{}' is not available for {} results",
                kind,
                self.kind()
            )));
        }
        let key = ResultKey::new(column_name, metric);
        let series = self.series(column_name, metric)?;
        let display_name = self.metadata.display_name(&key).unwrap_or(metric).to_string();
        plotter.render(&PlotData::from_series(kind, key, display_name, &series))
    }

    /// Replace the analysis rows, keeping the reference rows
    pub(crate) fn with_rows(metadata: ResultMetadata, reference: &[ResultRow], analysis: &[ResultRow]) -> Self {
        let rows = reference.iter().chain(analysis).cloned().collect();
        Self { rows, metadata }
    }
}

fn datetime_column(name: &str, values: impl Iterator<Item = Option<NaiveDateTime>>) -> Result<Column> {
    let nanos: Vec<Option<i64>> = values
        .map(|v| v.and_then(|dt| dt.and_utc().timestamp_nanos_opt()))
        .collect();
    let series = Series::new(name.into(), nanos).cast(&DataType::Datetime(TimeUnit::Nanoseconds, None))?;
    Ok(series.into())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(value: f64, alert: bool) -> MetricRecord {
        MetricRecord {
            value,
            p_value: None,
            realized: None,
            sampling_error: 0.01,
            upper_confidence_boundary: Some(value + 0.02),
            lower_confidence_boundary: Some(value - 0.02),
            upper_threshold: Some(0.1),
            lower_threshold: None,
            alert,
        }
    }

    fn chunk(key: &str, index: usize, period: Period) -> ChunkRecord {
        ChunkRecord {
            key: key.to_string(),
            chunk_index: index,
            start_index: index * 10,
            end_index: index * 10 + 9,
            start_date: None,
            end_date: None,
            period,
            is_transition: false,
            targets_missing_rate: None,
        }
    }

    fn sample() -> MonitoringResult {
        let keys = [ResultKey::new("f1", "jensen_shannon"), ResultKey::new("f2", "jensen_shannon")];
        let rows = vec![
            ResultRow {
                chunk: chunk("[0:9]", 0, Period::Reference),
                values: keys.iter().map(|k| (k.clone(), record(0.02, false))).collect(),
            },
            ResultRow {
                chunk: chunk("[10:19]", 1, Period::Analysis),
                values: keys.iter().map(|k| (k.clone(), record(0.3, true))).collect(),
            },
        ];
        let metadata = ResultMetadata {
            kind: ResultKind::UnivariateDrift,
            entries: keys
                .iter()
                .map(|k| ResultEntry {
                    key: k.clone(),
                    display_name: "Jensen-Shannon distance".to_string(),
                })
                .collect(),
            timestamp_column_name: None,
            chunker: "SizeBasedChunker(chunk_size=10, incomplete=keep)".to_string(),
            problem_type: None,
        };
        MonitoringResult::new(rows, metadata)
    }

    #[test]
    fn test_filter_by_period_and_column() {
        let result = sample();
        let filtered = result
            .filter(&ResultFilter::new().with_period(Period::Analysis).with_column_names(["f2"]))
            .unwrap();
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered.rows()[0].values.len(), 1);
        assert_eq!(filtered.metadata().column_names(), vec!["f2"]);
        // the source is untouched
        assert_eq!(result.len(), 2);
        assert_eq!(result.rows()[0].values.len(), 2);
    }

    #[test]
    fn test_filter_rejects_unknown_names() {
        let result = sample();
        assert!(result.filter(&ResultFilter::new().with_metrics(["chi2"])).is_err());
        assert!(result.filter(&ResultFilter::new().with_column_names(["f9"])).is_err());
    }

    #[test]
    fn test_to_dataframe_layout() {
        let df = sample().to_dataframe().unwrap();
        assert_eq!(df.height(), 2);
        let names: Vec<String> = df.get_column_names().iter().map(|c| c.to_string()).collect();
        assert!(names.contains(&"f1_jensen_shannon_value".to_string()));
        assert!(names.contains(&"f2_jensen_shannon_alert".to_string()));
        assert!(!names.iter().any(|n| n.ends_with("_p_value")));
    }

    #[test]
    fn test_series_and_get() {
        let result = sample();
        let series = result.series("f1", "jensen_shannon").unwrap();
        assert_eq!(series.len(), 2);
        assert!(series[1].1.alert);
        assert!(result.get("[10:19]", "f2", "jensen_shannon").is_some());
        assert!(result.series("f1", "chi2").is_err());
    }

    #[test]
    fn test_prefix_collapses_equal_names() {
        assert_eq!(ResultKey::new("roc_auc", "roc_auc").prefix(), "roc_auc");
        assert_eq!(ResultKey::new("true_positive", "confusion_matrix").prefix(), "true_positive_confusion_matrix");
    }
}
