//! Alert thresholds derived from reference chunk values
//!
//! A threshold policy turns the per-chunk values of a metric on reference
//! data into a `(lower, upper)` pair. Bounds are then clipped to the metric's
//! theoretical limits; a bound that ends up at its limit can never be crossed
//! and is dropped.

use crate::utils::StatsSummary;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Default multiplier of the standard-deviation policy
pub const DEFAULT_STD_MULTIPLIER: f64 = 3.0;

/// Threshold policy over reference chunk values
pub trait Threshold: fmt::Debug + Send + Sync {
    /// Raw `(lower, upper)` bounds before clipping
    fn thresholds(&self, reference_values: &[f64]) -> (Option<f64>, Option<f64>);
}

/// `mean ± k·std` of the reference values
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandardDeviationThreshold {
    /// Multiplier for the lower bound, `None` disables it
    pub std_lower_multiplier: Option<f64>,
    /// Multiplier for the upper bound, `None` disables it
    pub std_upper_multiplier: Option<f64>,
}

impl StandardDeviationThreshold {
    pub fn new(multiplier: f64) -> Self {
        Self {
            std_lower_multiplier: Some(multiplier),
            std_upper_multiplier: Some(multiplier),
        }
    }

    /// Set the lower multiplier
    pub fn with_lower_multiplier(mut self, multiplier: Option<f64>) -> Self {
        self.std_lower_multiplier = multiplier;
        self
    }

    /// Set the upper multiplier
    pub fn with_upper_multiplier(mut self, multiplier: Option<f64>) -> Self {
        self.std_upper_multiplier = multiplier;
        self
    }
}

impl Default for StandardDeviationThreshold {
    fn default() -> Self {
        Self::new(DEFAULT_STD_MULTIPLIER)
    }
}

impl Threshold for StandardDeviationThreshold {
    fn thresholds(&self, reference_values: &[f64]) -> (Option<f64>, Option<f64>) {
        let summary = StatsSummary::from_values(reference_values);
        if summary.count == 0 {
            return (None, None);
        }
        let lower = self
            .std_lower_multiplier
            .map(|k| summary.mean - k * summary.std_dev);
        let upper = self
            .std_upper_multiplier
            .map(|k| summary.mean + k * summary.std_dev);
        (lower, upper)
    }
}

/// Fixed bounds independent of the reference values
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ConstantThreshold {
    pub lower: Option<f64>,
    pub upper: Option<f64>,
}

impl ConstantThreshold {
    pub fn new(lower: Option<f64>, upper: Option<f64>) -> Self {
        Self { lower, upper }
    }
}

impl Threshold for ConstantThreshold {
    fn thresholds(&self, _reference_values: &[f64]) -> (Option<f64>, Option<f64>) {
        (self.lower, self.upper)
    }
}

/// Serializable threshold policy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ThresholdConfig {
    StandardDeviation {
        #[serde(default = "default_multiplier")]
        std_lower_multiplier: Option<f64>,
        #[serde(default = "default_multiplier")]
        std_upper_multiplier: Option<f64>,
    },
    Constant {
        #[serde(default)]
        lower: Option<f64>,
        #[serde(default)]
        upper: Option<f64>,
    },
}

fn default_multiplier() -> Option<f64> {
    Some(DEFAULT_STD_MULTIPLIER)
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        ThresholdConfig::StandardDeviation {
            std_lower_multiplier: default_multiplier(),
            std_upper_multiplier: default_multiplier(),
        }
    }
}

impl ThresholdConfig {
    /// Constant policy with the given bounds
    pub fn constant(lower: Option<f64>, upper: Option<f64>) -> Self {
        ThresholdConfig::Constant { lower, upper }
    }
}

impl Threshold for ThresholdConfig {
    fn thresholds(&self, reference_values: &[f64]) -> (Option<f64>, Option<f64>) {
        match self {
            ThresholdConfig::StandardDeviation {
                std_lower_multiplier,
                std_upper_multiplier,
            } => StandardDeviationThreshold {
                std_lower_multiplier: *std_lower_multiplier,
                std_upper_multiplier: *std_upper_multiplier,
            }
            .thresholds(reference_values),
            ThresholdConfig::Constant { lower, upper } => (*lower, *upper),
        }
    }
}

/// Fitted alert bounds, `None` means no bound on that side
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ThresholdBounds {
    pub lower: Option<f64>,
    pub upper: Option<f64>,
}

impl ThresholdBounds {
    pub fn new(lower: Option<f64>, upper: Option<f64>) -> Self {
        Self { lower, upper }
    }

    /// Whether `value` lies outside the bounds; NaN never alerts
    pub fn is_alert(&self, value: f64) -> bool {
        if value.is_nan() {
            return false;
        }
        self.lower.map_or(false, |l| value < l) || self.upper.map_or(false, |u| value > u)
    }
}

/// Theoretical range of a metric
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ValueLimits {
    pub lower: Option<f64>,
    pub upper: Option<f64>,
}

impl ValueLimits {
    pub const UNBOUNDED: ValueLimits = ValueLimits {
        lower: None,
        upper: None,
    };
    pub const UNIT_INTERVAL: ValueLimits = ValueLimits {
        lower: Some(0.0),
        upper: Some(1.0),
    };
    pub const NON_NEGATIVE: ValueLimits = ValueLimits {
        lower: Some(0.0),
        upper: None,
    };

    pub fn new(lower: Option<f64>, upper: Option<f64>) -> Self {
        Self { lower, upper }
    }

    /// Clamp `value` into the limits
    pub fn clip(&self, value: f64) -> f64 {
        let value = self.lower.map_or(value, |l| value.max(l));
        self.upper.map_or(value, |u| value.min(u))
    }
}

/// Compute clipped threshold bounds for a metric
///
/// Each raw bound is clamped into `limits`. A lower bound that lands on the
/// lower limit, or an upper bound that lands on the upper limit, is dropped.
pub fn calculate_threshold_values(
    threshold: &dyn Threshold,
    reference_values: &[f64],
    limits: ValueLimits,
) -> ThresholdBounds {
    let (lower, upper) = threshold.thresholds(reference_values);

    let lower = lower
        .filter(|v| !v.is_nan())
        .map(|v| limits.clip(v))
        .filter(|v| limits.lower.map_or(true, |l| *v > l));
    let upper = upper
        .filter(|v| !v.is_nan())
        .map(|v| limits.clip(v))
        .filter(|v| limits.upper.map_or(true, |u| *v < u));

    ThresholdBounds { lower, upper }
}
