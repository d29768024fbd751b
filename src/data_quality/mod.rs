//! Data quality monitoring

mod missing;

pub use missing::{MissingValuesCalculator, MissingValuesConfig, MISSING_VALUES_COUNT, MISSING_VALUES_RATE};
