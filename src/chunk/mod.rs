//! Chunking of datasets into evaluation windows
//!
//! A chunker turns a frame into an ordered list of contiguous [`Chunk`]s.
//! Every variant only decides where the row boundaries fall; slicing, period
//! inference, timestamp bounds and minimum-size warnings are shared by
//! [`Chunker::split`].

mod count;
mod default;
mod period;
mod size;

pub use count::CountBasedChunker;
pub use default::DefaultChunker;
pub use period::{PeriodBasedChunker, PeriodOffset};
pub use size::SizeBasedChunker;

use crate::error::{DriftGuardError, Result};
use crate::result::ChunkRecord;
use crate::utils::{has_column, label_values, require_columns, require_rows, timestamp_values};
use chrono::NaiveDateTime;
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, warn};

/// Column holding `reference` / `analysis` labels when a frame mixes both
pub const PERIOD_COLUMN: &str = "period";

/// Minimum chunk size below which a warning is logged
pub const DEFAULT_MINIMUM_CHUNK_SIZE: usize = 500;

/// Data period a chunk belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Period {
    /// Baseline data used for fitting
    Reference,
    /// Monitored data
    Analysis,
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Period::Reference => write!(f, "reference"),
            Period::Analysis => write!(f, "analysis"),
        }
    }
}

impl FromStr for Period {
    type Err = DriftGuardError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "reference" => Ok(Period::Reference),
            "analysis" => Ok(Period::Analysis),
            other => Err(DriftGuardError::invalid(format!(
                "unknown period '{}', expected 'reference' or 'analysis'",
                other
            ))),
        }
    }
}

/// What to do with a trailing chunk smaller than the requested size
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IncompleteChunk {
    /// Keep it as its own, shorter chunk
    #[default]
    Keep,
    /// Merge it into the previous chunk
    Append,
    /// Drop its rows
    Drop,
}

impl fmt::Display for IncompleteChunk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IncompleteChunk::Keep => write!(f, "keep"),
            IncompleteChunk::Append => write!(f, "append"),
            IncompleteChunk::Drop => write!(f, "drop"),
        }
    }
}

/// Row range produced by a chunker, before slicing
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkSpan {
    /// First row (inclusive)
    pub start: usize,
    /// One past the last row
    pub end: usize,
    /// Display key, defaults to the index range
    pub key: Option<String>,
    /// Period start for time-based chunkers
    pub start_datetime: Option<NaiveDateTime>,
    /// Period end for time-based chunkers
    pub end_datetime: Option<NaiveDateTime>,
}

impl ChunkSpan {
    /// Span over `[start, end)` with a default key
    pub fn rows(start: usize, end: usize) -> Self {
        Self {
            start,
            end,
            key: None,
            start_datetime: None,
            end_datetime: None,
        }
    }

    /// Number of rows
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    /// Whether the span has no rows
    pub fn is_empty(&self) -> bool {
        self.end == self.start
    }
}

/// A contiguous slice of a dataset
#[derive(Debug, Clone)]
pub struct Chunk {
    /// Display label (index range or period string)
    pub key: String,
    /// 0-based sequence number
    pub chunk_index: usize,
    /// First row (inclusive)
    pub start_index: usize,
    /// Last row (inclusive)
    pub end_index: usize,
    pub start_datetime: Option<NaiveDateTime>,
    pub end_datetime: Option<NaiveDateTime>,
    pub period: Period,
    /// Chunk straddles reference and analysis rows
    pub is_transition: bool,
    /// The rows of this chunk
    pub data: DataFrame,
}

impl Chunk {
    /// Number of rows
    pub fn len(&self) -> usize {
        self.data.height()
    }

    /// Whether the chunk has no rows
    pub fn is_empty(&self) -> bool {
        self.data.height() == 0
    }

    /// Metadata row for result containers
    pub fn record(&self) -> ChunkRecord {
        ChunkRecord {
            key: self.key.clone(),
            chunk_index: self.chunk_index,
            start_index: self.start_index,
            end_index: self.end_index,
            start_date: self.start_datetime,
            end_date: self.end_datetime,
            period: self.period,
            is_transition: self.is_transition,
            targets_missing_rate: None,
        }
    }
}

/// Splits a dataset into ordered, contiguous chunks
pub trait Chunker: fmt::Debug + fmt::Display + Send + Sync {
    /// Row boundaries for a frame of `n_rows` rows
    ///
    /// `timestamps` is present when a timestamp column was supplied.
    fn spans(
        &self,
        n_rows: usize,
        timestamps: Option<&[Option<NaiveDateTime>]>,
    ) -> Result<Vec<ChunkSpan>>;

    /// Timestamp column this chunker was configured with, if any
    fn timestamp_column(&self) -> Option<&str> {
        None
    }

    /// Split `data` into chunks
    ///
    /// `columns` restricts the chunk data to the named columns. Chunks smaller
    /// than `minimum_chunk_size` are logged as warnings.
    fn split(
        &self,
        data: &DataFrame,
        timestamp_column: Option<&str>,
        columns: Option<&[String]>,
        minimum_chunk_size: usize,
    ) -> Result<Vec<Chunk>> {
        let timestamp_column = timestamp_column.or_else(|| self.timestamp_column());
        split_frame(self, data, timestamp_column, columns, minimum_chunk_size)
    }
}

fn split_frame<C: Chunker + ?Sized>(
    chunker: &C,
    data: &DataFrame,
    timestamp_column: Option<&str>,
    columns: Option<&[String]>,
    minimum_chunk_size: usize,
) -> Result<Vec<Chunk>> {
    require_rows(data, "input")?;

    let timestamps = match timestamp_column {
        Some(name) => Some(timestamp_values(data, name)?),
        None => None,
    };
    let periods = if has_column(data, PERIOD_COLUMN) {
        let labels = label_values(data, PERIOD_COLUMN)?;
        let parsed = labels
            .iter()
            .map(|label| match label {
                Some(l) => l.parse::<Period>(),
                None => Err(DriftGuardError::invalid(format!(
                    "column '{}' contains missing values",
                    PERIOD_COLUMN
                ))),
            })
            .collect::<Result<Vec<_>>>()?;
        Some(parsed)
    } else {
        None
    };

    let spans = chunker.spans(data.height(), timestamps.as_deref())?;
    if spans.is_empty() {
        return Err(DriftGuardError::Chunking(format!(
            "{} produced no chunks for {} rows",
            chunker,
            data.height()
        )));
    }

    let frame = match columns {
        Some(cols) => {
            require_columns(data, cols)?;
            data.select(cols.iter().map(|c| c.as_str()))?
        }
        None => data.clone(),
    };

    let mut chunks = Vec::with_capacity(spans.len());
    for span in spans {
        if span.is_empty() {
            continue;
        }
        let chunk_index = chunks.len();
        let key = span
            .key
            .clone()
            .unwrap_or_else(|| format!("[{}:{}]", span.start, span.end - 1));

        let (start_datetime, end_datetime) = match (&timestamps, span.start_datetime) {
            (_, Some(start)) => (Some(start), span.end_datetime),
            (Some(ts), None) => {
                let window = ts[span.start..span.end].iter().flatten();
                (window.clone().min().copied(), window.max().copied())
            }
            (None, None) => (None, None),
        };

        let (period, is_transition) = match &periods {
            Some(p) => infer_period(&p[span.start..span.end]),
            None => (Period::Analysis, false),
        };

        if span.len() < minimum_chunk_size {
            warn!(
                chunk = %key,
                size = span.len(),
                minimum = minimum_chunk_size,
                "chunk is smaller than the minimum chunk size, results may be unreliable"
            );
        }

        chunks.push(Chunk {
            key,
            chunk_index,
            start_index: span.start,
            end_index: span.end - 1,
            start_datetime,
            end_datetime,
            period,
            is_transition,
            data: frame.slice(span.start as i64, span.len()),
        });
    }

    debug!(chunker = %chunker, chunks = chunks.len(), rows = data.height(), "split data into chunks");
    Ok(chunks)
}

/// A chunk fully in reference rows is reference; anything else is analysis
fn infer_period(labels: &[Period]) -> (Period, bool) {
    let has_reference = labels.iter().any(|p| *p == Period::Reference);
    let has_analysis = labels.iter().any(|p| *p == Period::Analysis);
    match (has_reference, has_analysis) {
        (true, false) => (Period::Reference, false),
        (true, true) => (Period::Analysis, true),
        _ => (Period::Analysis, false),
    }
}

/// Serializable chunker choice
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChunkerConfig {
    /// Fixed number of rows per chunk
    Size {
        chunk_size: usize,
        #[serde(default)]
        incomplete: IncompleteChunk,
    },
    /// Fixed number of chunks
    Count { chunk_number: usize },
    /// Calendar periods of a timestamp column
    Period {
        offset: PeriodOffset,
        #[serde(default)]
        timestamp_column: Option<String>,
    },
    /// Roughly ten chunks, never smaller than the minimum chunk size
    Default {
        #[serde(default = "default_minimum_chunk_size")]
        minimum_chunk_size: usize,
    },
}

fn default_minimum_chunk_size() -> usize {
    DEFAULT_MINIMUM_CHUNK_SIZE
}

impl Default for ChunkerConfig {
    fn default() -> Self {
        ChunkerConfig::Default {
            minimum_chunk_size: DEFAULT_MINIMUM_CHUNK_SIZE,
        }
    }
}

impl ChunkerConfig {
    /// Build the configured chunker
    pub fn build(&self) -> Result<Arc<dyn Chunker>> {
        let chunker: Arc<dyn Chunker> = match self {
            ChunkerConfig::Size {
                chunk_size,
                incomplete,
            } => Arc::new(SizeBasedChunker::new(*chunk_size)?.with_incomplete(*incomplete)),
            ChunkerConfig::Count { chunk_number } => Arc::new(CountBasedChunker::new(*chunk_number)?),
            ChunkerConfig::Period {
                offset,
                timestamp_column,
            } => {
                let mut chunker = PeriodBasedChunker::new(*offset);
                if let Some(col) = timestamp_column {
                    chunker = chunker.with_timestamp_column(col);
                }
                Arc::new(chunker)
            }
            ChunkerConfig::Default { minimum_chunk_size } => {
                Arc::new(DefaultChunker::new().with_minimum_chunk_size(*minimum_chunk_size))
            }
        };
        Ok(chunker)
    }

    /// Minimum chunk size used for undersized-chunk warnings
    pub fn minimum_chunk_size(&self) -> usize {
        match self {
            ChunkerConfig::Default { minimum_chunk_size } => *minimum_chunk_size,
            _ => DEFAULT_MINIMUM_CHUNK_SIZE,
        }
    }

    /// Pick a chunker from the mutually exclusive size / number / period options
    pub fn from_options(
        chunk_size: Option<usize>,
        chunk_number: Option<usize>,
        chunk_period: Option<PeriodOffset>,
    ) -> Result<Self> {
        match (chunk_size, chunk_number, chunk_period) {
            (None, None, None) => Ok(ChunkerConfig::default()),
            (Some(chunk_size), None, None) => Ok(ChunkerConfig::Size {
                chunk_size,
                incomplete: IncompleteChunk::Keep,
            }),
            (None, Some(chunk_number), None) => Ok(ChunkerConfig::Count { chunk_number }),
            (None, None, Some(offset)) => Ok(ChunkerConfig::Period {
                offset,
                timestamp_column: None,
            }),
            _ => Err(DriftGuardError::invalid(
                "only one of chunk_size, chunk_number or chunk_period may be set",
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(n: usize) -> DataFrame {
        let values: Vec<f64> = (0..n).map(|i| i as f64).collect();
        df!("x" => values).unwrap()
    }

    fn assert_partition(chunks: &[Chunk], n: usize) {
        let mut expected_start = 0;
        for (i, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.chunk_index, i);
            assert_eq!(chunk.start_index, expected_start);
            assert_eq!(chunk.end_index + 1 - chunk.start_index, chunk.len());
            expected_start = chunk.end_index + 1;
        }
        assert_eq!(expected_start, n);
    }

    #[test]
    fn test_period_round_trip() {
        assert_eq!("Reference".parse::<Period>().unwrap(), Period::Reference);
        assert_eq!(Period::Analysis.to_string(), "analysis");
        assert!("future".parse::<Period>().is_err());
    }

    #[test]
    fn test_split_partitions_rows_for_every_chunker() {
        let df = frame(1234);
        let chunkers: Vec<Arc<dyn Chunker>> = vec![
            Arc::new(SizeBasedChunker::new(100).unwrap()),
            Arc::new(CountBasedChunker::new(7).unwrap()),
            Arc::new(DefaultChunker::new().with_minimum_chunk_size(10)),
        ];
        for chunker in chunkers {
            let chunks = chunker.split(&df, None, None, 1).unwrap();
            assert_partition(&chunks, 1234);
        }
    }

    #[test]
    fn test_split_is_deterministic() {
        let df = frame(999);
        let chunker = CountBasedChunker::new(4).unwrap();
        let a: Vec<(usize, usize)> = chunker
            .split(&df, None, None, 1)
            .unwrap()
            .iter()
            .map(|c| (c.start_index, c.end_index))
            .collect();
        let b: Vec<(usize, usize)> = chunker
            .split(&df, None, None, 1)
            .unwrap()
            .iter()
            .map(|c| (c.start_index, c.end_index))
            .collect();
        assert_eq!(a, b);
    }

    #[test]
    fn test_default_keys_are_index_ranges() {
        let chunks = SizeBasedChunker::new(5).unwrap().split(&frame(10), None, None, 1).unwrap();
        assert_eq!(chunks[0].key, "[0:4]");
        assert_eq!(chunks[1].key, "[5:9]");
    }

    #[test]
    fn test_empty_frame_is_invalid() {
        let df = frame(0);
        let err = SizeBasedChunker::new(5).unwrap().split(&df, None, None, 1).unwrap_err();
        assert!(matches!(err, DriftGuardError::InvalidArguments(_)));
    }

    #[test]
    fn test_column_selection() {
        let df = df!("a" => &[1, 2, 3, 4], "b" => &[5, 6, 7, 8]).unwrap();
        let cols = vec!["b".to_string()];
        let chunks = SizeBasedChunker::new(2).unwrap().split(&df, None, Some(&cols), 1).unwrap();
        assert_eq!(chunks[0].data.width(), 1);

        let missing = vec!["c".to_string()];
        let err = SizeBasedChunker::new(2)
            .unwrap()
            .split(&df, None, Some(&missing), 1)
            .unwrap_err();
        assert!(matches!(err, DriftGuardError::MissingColumns { .. }));
    }

    #[test]
    fn test_period_inference_from_period_column() {
        let df = df!(
            "x" => &[1, 2, 3, 4, 5, 6],
            "period" => &["reference", "reference", "reference", "analysis", "analysis", "analysis"]
        )
        .unwrap();
        let chunks = SizeBasedChunker::new(2).unwrap().split(&df, None, None, 1).unwrap();
        assert_eq!(chunks[0].period, Period::Reference);
        assert_eq!(chunks[1].period, Period::Analysis);
        assert!(chunks[1].is_transition);
        assert_eq!(chunks[2].period, Period::Analysis);
        assert!(!chunks[2].is_transition);
    }

    #[test]
    fn test_timestamp_bounds_for_row_chunkers() {
        let df = df!(
            "ts" => &["2021-01-01 00:00:00", "2021-01-02 00:00:00", "2021-01-03 00:00:00", "2021-01-04 00:00:00"],
            "x" => &[1.0, 2.0, 3.0, 4.0]
        )
        .unwrap();
        let chunks = SizeBasedChunker::new(2).unwrap().split(&df, Some("ts"), None, 1).unwrap();
        assert_eq!(chunks[1].start_datetime, crate::utils::parse_timestamp("2021-01-03"));
        assert_eq!(chunks[1].end_datetime, crate::utils::parse_timestamp("2021-01-04"));
    }

    #[test]
    fn test_config_from_options() {
        assert_eq!(
            ChunkerConfig::from_options(None, Some(5), None).unwrap(),
            ChunkerConfig::Count { chunk_number: 5 }
        );
        assert!(ChunkerConfig::from_options(Some(10), Some(5), None).is_err());
        assert_eq!(ChunkerConfig::from_options(None, None, None).unwrap(), ChunkerConfig::default());
    }

    #[test]
    fn test_config_from_json() {
        let config: ChunkerConfig =
            serde_json::from_str(r#"{"type": "period", "offset": "week", "timestamp_column": "ts"}"#).unwrap();
        assert_eq!(
            config,
            ChunkerConfig::Period {
                offset: PeriodOffset::Week,
                timestamp_column: Some("ts".to_string())
            }
        );
        let chunker = config.build().unwrap();
        assert_eq!(chunker.timestamp_column(), Some("ts"));
    }
}
