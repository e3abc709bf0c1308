use maskvakt_core::queue::QueueError;
use thiserror::Error;

/// Classification failed for one frame.
#[derive(Debug, Error)]
pub enum InferenceError {
    #[error("Classifier request failed: {0}")]
    Request(String),

    #[error("Classifier returned HTTP {0}")]
    Status(u16),

    #[error("Malformed classifier response: {0}")]
    Decode(String),

    #[error("Classifier panicked")]
    Panicked,

    #[error("Classifier unavailable: {0}")]
    Unavailable(String),
}

impl From<reqwest::Error> for InferenceError {
    fn from(e: reqwest::Error) -> Self {
        match e.status() {
            Some(status) => InferenceError::Status(status.as_u16()),
            None if e.is_decode() => InferenceError::Decode(e.to_string()),
            None => InferenceError::Request(e.to_string()),
        }
    }
}

#[derive(Debug, Error)]
pub enum DetectionError {
    #[error("Worker count must be at least 1")]
    InvalidWorkerCount,

    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),

    #[error("Failed to spawn worker: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("Inference setup failed: {0}")]
    Inference(#[from] InferenceError),
}
