use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Storage backend unavailable: {0}")]
    Unavailable(String),

    #[error("Invalid time range: start {start} is after end {end}")]
    InvalidRange { start: String, end: String },
}
