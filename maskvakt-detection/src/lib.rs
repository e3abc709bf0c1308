//! # maskvakt-detection
//!
//! Turns frames into detection results: the classifier contract, an HTTP
//! classifier client, and the bounded worker pool that runs it.

pub mod error;
pub mod http;
pub mod inference;
pub mod pipeline;
pub mod stats;

pub use error::{DetectionError, InferenceError};
pub use http::HttpClassifier;
pub use inference::{InferenceAdapter, ResultHook};
pub use pipeline::{DetectionPipeline, StopReport};
pub use stats::PipelineStats;
