use maskvakt_core::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AnalyticsError {
    #[error("History unavailable: {0}")]
    Store(#[from] StoreError),

    #[error("Invalid period: {0}")]
    InvalidPeriod(String),

    #[error("Unsupported export format: {0}")]
    UnsupportedFormat(String),

    #[error("Failed to encode snapshot: {0}")]
    Encode(#[from] serde_json::Error),
}
