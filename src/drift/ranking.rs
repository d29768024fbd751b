//! Ranking of drifting columns

use crate::chunk::Period;
use crate::error::{DriftGuardError, Result};
use crate::result::{MonitoringResult, ResultKind};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Position of one column in a ranking
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankedColumn {
    /// 1-based rank
    pub rank: usize,
    pub column_name: String,
    pub number_of_alerts: usize,
}

/// Orders columns by the number of alerts over analysis chunks
#[derive(Debug, Clone, Copy, Default)]
pub struct AlertCountRanker;

impl AlertCountRanker {
    pub fn new() -> Self {
        Self
    }

    /// Rank the columns of a univariate drift result
    ///
    /// Alerts of every method on a column count towards that column. Ties are
    /// broken by column name. With `only_drifting`, columns without alerts are
    /// left out.
    pub fn rank(&self, result: &MonitoringResult, only_drifting: bool) -> Result<Vec<RankedColumn>> {
        if result.kind() != ResultKind::UnivariateDrift {
            return Err(DriftGuardError::invalid(format!(
                "alert count ranking needs a univariate drift result, got {}",
                result.kind()
            )));
        }
        let analysis: Vec<_> = result
            .rows()
            .iter()
            .filter(|r| r.chunk.period == Period::Analysis)
            .collect();
        if analysis.is_empty() {
            return Err(DriftGuardError::invalid("cannot rank a result without analysis rows"));
        }

        let mut counts: BTreeMap<String, usize> = result
            .metadata()
            .column_names()
            .into_iter()
            .map(|c| (c, 0))
            .collect();
        for row in &analysis {
            for (key, record) in &row.values {
                if record.alert {
                    *counts.entry(key.column_name.clone()).or_insert(0) += 1;
                }
            }
        }

        let mut ranked: Vec<(String, usize)> = counts
            .into_iter()
            .filter(|(_, n)| !only_drifting || *n > 0)
            .collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

        Ok(ranked
            .into_iter()
            .enumerate()
            .map(|(i, (column_name, number_of_alerts))| RankedColumn {
                rank: i + 1,
                column_name,
                number_of_alerts,
            })
            .collect())
    }
}
