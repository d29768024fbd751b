//! Utility functions and types

pub mod columns;
pub mod stats;

pub use columns::{
    float_values, has_column, is_numeric_dtype, label_values, missing_mask, parse_timestamp,
    require_columns, require_rows, timestamp_values,
};
pub use stats::{nan_mean, nan_std, StatsSummary};
