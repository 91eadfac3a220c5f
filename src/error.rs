//! Error taxonomy for loading and aggregating the survey dataset.

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by the loader, the aggregation pipeline and the ranking layer.
///
/// `NotFound` and `Parse` are absorbed by the loader into an unavailable
/// dataset handle. The remaining variants indicate a wiring defect and are
/// returned to the caller as-is.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RiskError {
    #[error("dataset not found at {}", path.display())]
    NotFound { path: PathBuf },

    #[error("failed to parse dataset {}: {reason}", path.display())]
    Parse { path: PathBuf, reason: String },

    #[error("column '{field}' is not part of the dataset schema")]
    Schema { field: String },

    #[error("{metric} of '{key}' is zero; ratio is undefined")]
    DivisionByZero { key: String, metric: String },

    #[error("group '{key}' does not exist in the aggregation result")]
    KeyNotFound { key: String },
}

pub type RiskResult<T> = Result<T, RiskError>;
