//! Univariate drift detection
//!
//! Compares the distribution of each monitored column in every chunk against
//! the reference data with pluggable statistical methods.

mod calculator;
mod methods;
mod ranking;
pub mod stats;

pub use calculator::{column_values, detect_feature_type, UnivariateDriftCalculator, UnivariateDriftConfig};
pub use methods::{
    is_high_cardinality, Chi2Statistic, ColumnValues, DriftMethod, FeatureType, JensenShannonDistance,
    KolmogorovSmirnovStatistic, MethodConstructor, MethodEvaluation, MethodRegistry, MethodSettings, CHI2,
    CONTINUOUS_UNIQUE_COUNT, CONTINUOUS_UNIQUE_RATIO, DEFAULT_SIGNIFICANCE_LEVEL, JENSEN_SHANNON, KOLMOGOROV_SMIRNOV,
};
pub use ranking::{AlertCountRanker, RankedColumn};
