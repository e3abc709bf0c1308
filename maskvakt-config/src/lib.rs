//! # Maskvakt Configuration System
//!
//! Hierarchical configuration for the mask-compliance monitor.
//!
//! ## Features
//! - **Unified Configuration**: one document covers capture, detection, alerting and analytics
//! - **Validation**: every section is range/format checked before startup continues
//! - **Environment Awareness**: per-environment override files and `MASKVAKT_*` variables

#![warn(unsafe_code)]
#![deny(rustdoc::broken_intra_doc_links)]

use std::path::Path;

use figment::{
    providers::{Env, Format, Serialized, Yaml},
    Figment,
};
use serde::{Deserialize, Serialize};
use validator::Validate;

mod alerts;
mod analytics;
mod capture;
mod error;
mod inference;
mod pipeline;
mod telemetry;
mod validation;

pub use alerts::{AlertsConfig, MqttConfig, ReconnectConfig, TelegramConfig};
pub use analytics::AnalyticsConfig;
pub use capture::CaptureConfig;
pub use error::ConfigError;
pub use inference::InferenceConfig;
pub use pipeline::PipelineConfig;
pub use telemetry::TelemetryConfig;

const BASE_FILE: &str = "config/maskvakt.yaml";
const ENV_PREFIX: &str = "MASKVAKT_";

/// Top‑level configuration container for all maskvakt components.
#[derive(Debug, Serialize, Deserialize, Validate, Default, Clone)]
pub struct MaskvaktConfig {
    /// Detection worker pool and queues.
    #[validate(nested)]
    #[serde(default)]
    pub pipeline: PipelineConfig,

    /// Camera fleet and capture loop parameters.
    #[validate(nested)]
    #[serde(default)]
    pub capture: CaptureConfig,

    /// Classification service.
    #[validate(nested)]
    #[serde(default)]
    pub inference: InferenceConfig,

    /// Cooldown and notifier destinations.
    #[validate(nested)]
    #[serde(default)]
    pub alerts: AlertsConfig,

    /// Snapshot cache.
    #[validate(nested)]
    #[serde(default)]
    pub analytics: AnalyticsConfig,

    /// Logging.
    #[validate(nested)]
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

impl MaskvaktConfig {
    /// Load configuration from default files and environment.
    ///
    /// Hierarchy:
    /// 1. Default Values
    /// 2. `config/maskvakt.yaml` - Base settings. If missing, defaults are used.
    /// 3. `config/<MASKVAKT_ENV>.yaml` - Environment‑specific overrides.
    /// 4. `MASKVAKT_*` environment variables (`__` separates nesting levels).
    pub fn load() -> Result<Self, ConfigError> {
        let mut figment = Figment::from(Serialized::defaults(MaskvaktConfig::default()));

        if Path::new(BASE_FILE).exists() {
            figment = figment.merge(Yaml::file(BASE_FILE));
        } else {
            eprintln!("{BASE_FILE} not found, using default configuration");
        }

        let env = std::env::var("MASKVAKT_ENV").unwrap_or_else(|_| "production".into());
        let env_file = format!("config/{}.yaml", env);
        if Path::new(&env_file).exists() {
            figment = figment.merge(Yaml::file(env_file));
        }

        Self::extract(figment)
    }

    /// Load configuration from a specific path plus environment overrides.
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.to_path_buf()));
        }

        let figment =
            Figment::from(Serialized::defaults(MaskvaktConfig::default())).merge(Yaml::file(path));
        Self::extract(figment)
    }

    fn extract(figment: Figment) -> Result<Self, ConfigError> {
        figment
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()
            .map_err(ConfigError::from)
            .and_then(|config: Self| {
                config.validate()?;
                Ok(config)
            })
    }
}
