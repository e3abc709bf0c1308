//! Classification service endpoint configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use validator::{self, Validate};

use crate::validation;

#[derive(Debug, Serialize, Deserialize, Validate, Clone)]
pub struct InferenceConfig {
    /// URL of the face/mask classification service.
    #[validate(custom(function = validation::validate_http_url))]
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    /// Per-request timeout (milliseconds).
    #[validate(range(min = 1, max = 120_000))]
    #[serde(default = "default_timeout")]
    pub timeout_ms: u64,

    /// Mask probability above which a face counts as masked.
    #[validate(range(min = 0.0, max = 1.0))]
    #[serde(default = "default_threshold")]
    pub confidence_threshold: f32,
}

fn default_endpoint() -> String {
    "http://127.0.0.1:8501/v1/classify".into()
}

fn default_timeout() -> u64 {
    2000
}

fn default_threshold() -> f32 {
    0.8
}

impl InferenceConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            timeout_ms: default_timeout(),
            confidence_threshold: default_threshold(),
        }
    }
}
