use thiserror::Error;

/// A notifier could not hand the alert off.
#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("Transport failure: {0}")]
    Transport(String),

    #[error("Destination rejected the alert (HTTP {status}): {detail}")]
    Rejected { status: u16, detail: String },

    #[error("Destination unavailable: {0}")]
    Unavailable(String),

    #[error("Failed to encode alert: {0}")]
    Encode(#[from] serde_json::Error),
}

impl From<reqwest::Error> for NotifyError {
    fn from(e: reqwest::Error) -> Self {
        match e.status() {
            Some(status) => NotifyError::Rejected {
                status: status.as_u16(),
                detail: e.to_string(),
            },
            None => NotifyError::Transport(e.to_string()),
        }
    }
}

#[derive(Debug, Error)]
pub enum MqttError {
    #[error("Invalid MQTT settings: {0}")]
    Settings(String),

    #[error("MQTT client error: {0}")]
    Client(#[from] rumqttc::ClientError),

    #[error("Failed to spawn MQTT event loop: {0}")]
    Spawn(#[from] std::io::Error),
}
