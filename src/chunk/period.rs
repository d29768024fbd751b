//! Calendar-period chunking

use super::{ChunkSpan, Chunker};
use crate::error::{DriftGuardError, Result};
use chrono::{Datelike, Months, NaiveDate, NaiveDateTime, TimeDelta, Timelike};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Calendar period used to group rows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PeriodOffset {
    Hour,
    Day,
    /// Monday through Sunday, so every week ends on a Sunday
    Week,
    Month,
    Quarter,
    Year,
}

impl FromStr for PeriodOffset {
    type Err = DriftGuardError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "H" | "h" | "hour" => Ok(PeriodOffset::Hour),
            "D" | "d" | "day" => Ok(PeriodOffset::Day),
            "W" | "w" | "week" => Ok(PeriodOffset::Week),
            "M" | "month" => Ok(PeriodOffset::Month),
            "Q" | "q" | "quarter" => Ok(PeriodOffset::Quarter),
            "Y" | "y" | "A" | "year" => Ok(PeriodOffset::Year),
            other => Err(DriftGuardError::invalid(format!("unknown chunk period '{}'", other))),
        }
    }
}

impl fmt::Display for PeriodOffset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PeriodOffset::Hour => "hour",
            PeriodOffset::Day => "day",
            PeriodOffset::Week => "week",
            PeriodOffset::Month => "month",
            PeriodOffset::Quarter => "quarter",
            PeriodOffset::Year => "year",
        };
        write!(f, "{}", name)
    }
}

fn midnight(date: NaiveDate) -> NaiveDateTime {
    date.and_time(chrono::NaiveTime::MIN)
}

fn first_of_month(year: i32, month: u32) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(year, month, 1)
}

impl PeriodOffset {
    /// Start of the period containing `ts`
    pub fn period_start(&self, ts: NaiveDateTime) -> Option<NaiveDateTime> {
        let date = ts.date();
        match self {
            PeriodOffset::Hour => date.and_hms_opt(ts.hour(), 0, 0),
            PeriodOffset::Day => Some(midnight(date)),
            PeriodOffset::Week => {
                let back = TimeDelta::days(date.weekday().num_days_from_monday() as i64);
                date.checked_sub_signed(back).map(midnight)
            }
            PeriodOffset::Month => first_of_month(date.year(), date.month()).map(midnight),
            PeriodOffset::Quarter => {
                let month = (date.month0() / 3) * 3 + 1;
                first_of_month(date.year(), month).map(midnight)
            }
            PeriodOffset::Year => first_of_month(date.year(), 1).map(midnight),
        }
    }

    /// Start of the period following the one starting at `start`
    pub fn next_start(&self, start: NaiveDateTime) -> Option<NaiveDateTime> {
        match self {
            PeriodOffset::Hour => start.checked_add_signed(TimeDelta::hours(1)),
            PeriodOffset::Day => start.checked_add_signed(TimeDelta::days(1)),
            PeriodOffset::Week => start.checked_add_signed(TimeDelta::days(7)),
            PeriodOffset::Month => start.checked_add_months(Months::new(1)),
            PeriodOffset::Quarter => start.checked_add_months(Months::new(3)),
            PeriodOffset::Year => start.checked_add_months(Months::new(12)),
        }
    }

    /// Display key of the period starting at `start`
    pub fn key(&self, start: NaiveDateTime) -> String {
        match self {
            PeriodOffset::Hour => start.format("%Y-%m-%d %H:00").to_string(),
            PeriodOffset::Day => start.format("%Y-%m-%d").to_string(),
            PeriodOffset::Week => {
                let last_day = start.date() + TimeDelta::days(6);
                format!("{}/{}", start.format("%Y-%m-%d"), last_day.format("%Y-%m-%d"))
            }
            PeriodOffset::Month => start.format("%Y-%m").to_string(),
            PeriodOffset::Quarter => format!("{}Q{}", start.year(), start.month0() / 3 + 1),
            PeriodOffset::Year => start.format("%Y").to_string(),
        }
    }
}

/// Groups rows into calendar periods of a timestamp column
///
/// Rows must be sorted by timestamp. Each chunk starts at its period start and
/// ends one nanosecond before the next period starts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeriodBasedChunker {
    offset: PeriodOffset,
    timestamp_column: Option<String>,
}

impl PeriodBasedChunker {
    pub fn new(offset: PeriodOffset) -> Self {
        Self {
            offset,
            timestamp_column: None,
        }
    }

    /// Set the timestamp column used when `split` is not given one
    pub fn with_timestamp_column(mut self, column: impl Into<String>) -> Self {
        self.timestamp_column = Some(column.into());
        self
    }

    pub fn offset(&self) -> PeriodOffset {
        self.offset
    }
}

impl Chunker for PeriodBasedChunker {
    fn spans(&self, n_rows: usize, timestamps: Option<&[Option<NaiveDateTime>]>) -> Result<Vec<ChunkSpan>> {
        let timestamps = timestamps.ok_or_else(|| {
            DriftGuardError::invalid("PeriodBasedChunker requires a timestamp column")
        })?;
        if timestamps.len() != n_rows {
            return Err(DriftGuardError::Calculator(format!(
                "expected {} timestamps, got {}",
                n_rows,
                timestamps.len()
            )));
        }

        let mut spans: Vec<ChunkSpan> = Vec::new();
        let mut previous: Option<NaiveDateTime> = None;
        for (row, ts) in timestamps.iter().enumerate() {
            let ts = ts.ok_or_else(|| {
                DriftGuardError::invalid(format!("timestamp column has a missing value at row {}", row))
            })?;
            if previous.map_or(false, |p| ts < p) {
                return Err(DriftGuardError::invalid(
                    "data must be sorted by timestamp for period-based chunking",
                ));
            }
            previous = Some(ts);

            let start = self.offset.period_start(ts).ok_or_else(|| {
                DriftGuardError::invalid(format!("timestamp {} is out of the supported range", ts))
            })?;

            match spans.last_mut() {
                Some(span) if span.start_datetime == Some(start) => span.end = row + 1,
                _ => {
                    let end_datetime = self
                        .offset
                        .next_start(start)
                        .map(|next| next - TimeDelta::nanoseconds(1));
                    spans.push(ChunkSpan {
                        start: row,
                        end: row + 1,
                        key: Some(self.offset.key(start)),
                        start_datetime: Some(start),
                        end_datetime,
                    });
                }
            }
        }
        Ok(spans)
    }

    fn timestamp_column(&self) -> Option<&str> {
        self.timestamp_column.as_deref()
    }
}

impl fmt::Display for PeriodBasedChunker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PeriodBasedChunker(offset={})", self.offset)
    }
}
