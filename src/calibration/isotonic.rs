//! Isotonic regression calibrator

use crate::calibration::Calibrator;
use crate::error::{DriftGuardError, Result};
use ndarray::Array1;
use serde::{Deserialize, Serialize};

/// Monotone non-decreasing map from raw scores to observed positive rates
///
/// Fitted as a step function over pooled blocks and evaluated with linear
/// interpolation between block ends. Scores outside the fitted range take the
/// value of the nearest end.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IsotonicRegression {
    /// `(score, calibrated)` knots sorted by score
    knots: Option<Vec<(f64, f64)>>,
    clip: bool,
}

impl IsotonicRegression {
    pub fn new() -> Self {
        Self { knots: None, clip: true }
    }

    /// Clamp calibrated values to [0, 1] (on by default)
    pub fn with_clip(mut self, clip: bool) -> Self {
        self.clip = clip;
        self
    }

    pub fn is_fitted(&self) -> bool {
        self.knots.is_some()
    }
}

impl Default for IsotonicRegression {
    fn default() -> Self {
        Self::new()
    }
}

/// Pool adjacent violators over weighted values
///
/// Returns `(mean, weight, length)` of each pooled block in input order.
fn pool_adjacent_violators(values: &[f64], weights: &[f64]) -> Vec<(f64, f64, usize)> {
    let mut blocks: Vec<(f64, f64, usize)> = Vec::with_capacity(values.len());
    for (&value, &weight) in values.iter().zip(weights) {
        blocks.push((value, weight, 1));
        while let [.., (prev_mean, prev_weight, prev_len), (mean, weight, len)] = blocks[..] {
            if prev_mean <= mean {
                break;
            }
            blocks.pop();
            let pooled = prev_weight + weight;
            if let Some(last) = blocks.last_mut() {
                *last = ((prev_mean * prev_weight + mean * weight) / pooled, pooled, prev_len + len);
            }
        }
    }
    blocks
}

fn interpolate(knots: &[(f64, f64)], score: f64) -> f64 {
    let (first, last) = match (knots.first(), knots.last()) {
        (Some(first), Some(last)) => (*first, *last),
        _ => return f64::NAN,
    };
    if score <= first.0 {
        return first.1;
    }
    if score >= last.0 {
        return last.1;
    }

    let hi = knots.partition_point(|(x, _)| *x <= score).min(knots.len() - 1);
    let ((x0, y0), (x1, y1)) = (knots[hi - 1], knots[hi]);
    if (x1 - x0).abs() < 1e-12 {
        return y1;
    }
    y0 + (score - x0) / (x1 - x0) * (y1 - y0)
}

impl Calibrator for IsotonicRegression {
    fn fit(&mut self, probs: &Array1<f64>, labels: &Array1<f64>) -> Result<()> {
        if probs.len() != labels.len() {
            return Err(DriftGuardError::Shape {
                expected: format!("{} labels", probs.len()),
                actual: format!("{} labels", labels.len()),
            });
        }
        if probs.is_empty() {
            return Err(DriftGuardError::invalid("cannot fit a calibrator on empty input"));
        }

        let mut pairs: Vec<(f64, f64)> = probs.iter().copied().zip(labels.iter().copied()).collect();
        pairs.sort_by(|a, b| a.0.total_cmp(&b.0));

        // equal scores are averaged into one weighted point before pooling
        let mut scores: Vec<f64> = Vec::new();
        let mut rates: Vec<f64> = Vec::new();
        let mut weights: Vec<f64> = Vec::new();
        for (score, label) in pairs {
            if scores.last() == Some(&score) {
                let i = rates.len() - 1;
                rates[i] = (rates[i] * weights[i] + label) / (weights[i] + 1.0);
                weights[i] += 1.0;
            } else {
                scores.push(score);
                rates.push(label);
                weights.push(1.0);
            }
        }

        // each block contributes its first and last score at the block mean
        let mut knots = Vec::with_capacity(scores.len());
        let mut start = 0;
        for (mean, _, len) in pool_adjacent_violators(&rates, &weights) {
            let end = start + len - 1;
            knots.push((scores[start], mean));
            if end > start {
                knots.push((scores[end], mean));
            }
            start = end + 1;
        }

        self.knots = Some(knots);
        Ok(())
    }

    fn calibrate(&self, probs: &Array1<f64>) -> Result<Array1<f64>> {
        let knots = self
            .knots
            .as_deref()
            .ok_or_else(|| DriftGuardError::not_fitted("IsotonicRegression"))?;
        Ok(probs.mapv(|p| {
            let calibrated = interpolate(knots, p);
            if self.clip {
                calibrated.clamp(0.0, 1.0)
            } else {
                calibrated
            }
        }))
    }
}
