//! Performance estimation without targets
//!
//! [`Cbpe`] treats calibrated predicted probabilities as expected outcomes and
//! derives every classification metric from the resulting expected confusion
//! matrix.

mod cbpe;
mod estimates;

pub use cbpe::{CalibratorFactory, Cbpe, CbpeConfig};
pub use estimates::{estimate_roc_auc, estimated_value};
