//! Error types for market data operations.

use std::time::Duration;
use thiserror::Error;

/// Errors that can occur while sampling market data.
#[derive(Debug, Error)]
pub enum FeedError {
    #[error("Market data unavailable: {0}")]
    DataUnavailable(String),

    #[error("Request failed: {0}")]
    ConnectionFailed(String),

    #[error("Failed to parse response: {0}")]
    ParseError(String),

    #[error("Rate limit exceeded")]
    RateLimitExceeded,

    #[error("Timed out after {0:?}")]
    Timeout(Duration),
}

impl From<reqwest::Error> for FeedError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            FeedError::ParseError(err.to_string())
        } else {
            FeedError::ConnectionFailed(err.to_string())
        }
    }
}

impl From<serde_json::Error> for FeedError {
    fn from(err: serde_json::Error) -> Self {
        FeedError::ParseError(err.to_string())
    }
}

impl FeedError {
    /// Returns true if this error is transient and likely to succeed next tick.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            FeedError::ConnectionFailed(_)
                | FeedError::DataUnavailable(_)
                | FeedError::Timeout(_)
                | FeedError::RateLimitExceeded
        )
    }
}
