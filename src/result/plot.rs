//! Plot data handed to rendering collaborators
//!
//! Rendering itself lives outside the crate. A [`Plotter`] receives the
//! per-chunk series of one key and produces whatever figure type it likes.

use super::{ChunkRecord, MetricRecord, ResultKey, ResultKind};
use crate::chunk::Period;
use crate::error::Result;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlotKind {
    /// Drift statistic per chunk with thresholds
    Drift,
    /// Estimated or realized metric per chunk with confidence band
    Performance,
    /// Missing-value rate per chunk
    MissingValues,
}

impl PlotKind {
    /// Whether this kind can be drawn from results of `kind`
    pub fn supports(&self, kind: ResultKind) -> bool {
        matches!(
            (self, kind),
            (PlotKind::Drift, ResultKind::UnivariateDrift)
                | (PlotKind::Performance, ResultKind::PerformanceEstimation)
                | (PlotKind::Performance, ResultKind::RealizedPerformance)
                | (PlotKind::MissingValues, ResultKind::MissingValues)
        )
    }
}

impl fmt::Display for PlotKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PlotKind::Drift => "drift",
            PlotKind::Performance => "performance",
            PlotKind::MissingValues => "missing_values",
        };
        write!(f, "{}", name)
    }
}

/// Column-oriented series of one key
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlotData {
    pub kind: PlotKind,
    pub key: ResultKey,
    pub title: String,
    pub chunk_keys: Vec<String>,
    pub periods: Vec<Period>,
    pub start_dates: Vec<Option<NaiveDateTime>>,
    pub end_dates: Vec<Option<NaiveDateTime>>,
    pub values: Vec<f64>,
    pub realized: Vec<Option<f64>>,
    pub upper_confidence_boundary: Vec<Option<f64>>,
    pub lower_confidence_boundary: Vec<Option<f64>>,
    pub upper_threshold: Vec<Option<f64>>,
    pub lower_threshold: Vec<Option<f64>>,
    pub alerts: Vec<bool>,
}

impl PlotData {
    pub(crate) fn from_series(
        kind: PlotKind,
        key: ResultKey,
        display_name: String,
        series: &[(&ChunkRecord, &MetricRecord)],
    ) -> Self {
        let title = if key.column_name == key.metric {
            display_name
        } else {
            format!("{} ({})", display_name, key.column_name)
        };
        Self {
            kind,
            key,
            title,
            chunk_keys: series.iter().map(|(c, _)| c.key.clone()).collect(),
            periods: series.iter().map(|(c, _)| c.period).collect(),
            start_dates: series.iter().map(|(c, _)| c.start_date).collect(),
            end_dates: series.iter().map(|(c, _)| c.end_date).collect(),
            values: series.iter().map(|(_, r)| r.value).collect(),
            realized: series.iter().map(|(_, r)| r.realized).collect(),
            upper_confidence_boundary: series.iter().map(|(_, r)| r.upper_confidence_boundary).collect(),
            lower_confidence_boundary: series.iter().map(|(_, r)| r.lower_confidence_boundary).collect(),
            upper_threshold: series.iter().map(|(_, r)| r.upper_threshold).collect(),
            lower_threshold: series.iter().map(|(_, r)| r.lower_threshold).collect(),
            alerts: series.iter().map(|(_, r)| r.alert).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Rendering collaborator
pub trait Plotter {
    type Output;

    fn render(&self, data: &PlotData) -> Result<Self::Output>;
}
