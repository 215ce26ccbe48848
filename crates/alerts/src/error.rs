//! Engine-level errors.

use crate::db::DbError;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Alert store error: {0}")]
    Store(#[from] DbError),
    #[error("Alert store call timed out after {0:?}")]
    Timeout(Duration),
    #[error("No Tokio runtime available to host the alert checker")]
    NoRuntime,
}
