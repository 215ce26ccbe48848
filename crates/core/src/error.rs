//! Errors for malformed alert records.

use thiserror::Error;

/// A single field of an alert record that could not be interpreted.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AlertFieldError {
    #[error("unknown alert kind: {0:?}")]
    UnknownKind(String),

    #[error("unknown condition: {0:?}")]
    UnknownCondition(String),

    #[error("unknown frequency: {0:?}")]
    UnknownFrequency(String),

    #[error("unknown snooze condition: {0:?}")]
    UnknownSnooze(String),

    #[error("invalid threshold: {0}")]
    InvalidThreshold(String),

    #[error("missing field: {0}")]
    MissingField(&'static str),
}

/// Malformed record read from the alert store. The alert is skipped, never fatal.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid alert data for {id}: {reason}")]
pub struct InvalidAlertData {
    pub id: String,
    #[source]
    pub reason: AlertFieldError,
}

impl InvalidAlertData {
    pub fn new(id: impl Into<String>, reason: AlertFieldError) -> Self {
        Self {
            id: id.into(),
            reason,
        }
    }
}
