//! Collaborator contracts at the pipeline boundary.

use maskvakt_core::detection::DetectionResult;
use maskvakt_core::frame::FrameEnvelope;

use crate::error::InferenceError;

/// Opaque face/mask classifier.
///
/// Called concurrently from every worker thread.
pub trait InferenceAdapter: Send + Sync {
    fn classify(&self, frame: &FrameEnvelope) -> Result<DetectionResult, InferenceError>;
}

impl<F> InferenceAdapter for F
where
    F: Fn(&FrameEnvelope) -> Result<DetectionResult, InferenceError> + Send + Sync,
{
    fn classify(&self, frame: &FrameEnvelope) -> Result<DetectionResult, InferenceError> {
        self(frame)
    }
}

/// Receives every detection result synchronously on the worker thread that
/// produced it, after the result has been persisted.
pub trait ResultHook: Send + Sync {
    fn on_result(&self, result: &DetectionResult);
}

impl<F> ResultHook for F
where
    F: Fn(&DetectionResult) + Send + Sync,
{
    fn on_result(&self, result: &DetectionResult) {
        self(result)
    }
}
