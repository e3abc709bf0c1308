use maskvakt_alerts::{MqttError, NotifyError};
use maskvakt_analytics::AnalyticsError;
use maskvakt_capture::CaptureError;
use maskvakt_config::ConfigError;
use maskvakt_core::StoreError;
use maskvakt_detection::{DetectionError, InferenceError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Camera error: {0}")]
    Capture(#[from] CaptureError),

    #[error("Detection error: {0}")]
    Detection(#[from] DetectionError),

    #[error("Inference error: {0}")]
    Inference(#[from] InferenceError),

    #[error("Analytics error: {0}")]
    Analytics(#[from] AnalyticsError),

    #[error("Storage error: {0}")]
    Store(#[from] StoreError),

    #[error("Notifier error: {0}")]
    Notify(#[from] NotifyError),

    #[error("MQTT error: {0}")]
    Mqtt(#[from] MqttError),

    #[error("Metrics error: {0}")]
    Metrics(#[from] prometheus::Error),

    #[error("Failed to spawn thread: {0}")]
    Spawn(#[from] std::io::Error),
}
