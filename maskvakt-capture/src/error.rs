use maskvakt_core::queue::QueueError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CaptureError {
    /// The transport handle could not be established.
    #[error("Source {source_id} unavailable: {reason}")]
    SourceUnavailable { source_id: String, reason: String },

    /// A device-level open failure, before it is attributed to a source.
    #[error("Failed to open {target}: {reason}")]
    DeviceOpen { target: String, reason: String },

    /// A single frame read failed; the capture loop keeps going.
    #[error("Transient read failure: {0}")]
    TransientRead(String),

    /// The device panicked while the source was being started.
    #[error("Source {0} panicked while starting")]
    StartPanicked(String),

    #[error("Device is not open")]
    NotOpen,

    #[error("Unknown source: {0}")]
    UnknownSource(String),

    #[error("Invalid frame buffer: {0}")]
    Buffer(#[from] QueueError),

    #[error("Failed to spawn capture thread: {0}")]
    Spawn(#[from] std::io::Error),
}

impl CaptureError {
    /// Whether the capture loop should keep reading after this error.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, CaptureError::TransientRead(_))
    }
}
