// maskvakt-config/src/validation.rs
//! Custom validation functions for configuration.
//!
//! Provides shared validation logic used across multiple configuration modules.

use std::collections::HashSet;

use maskvakt_core::source::{SourceDescriptor, TransportDescriptor};
use validator::ValidationError;

use crate::alerts::{ReconnectConfig, TelegramConfig};

/// Validate the camera list: ids must be non-empty and unique, network
/// transports must carry a parseable http(s) uri.
pub fn validate_cameras(cameras: &[SourceDescriptor]) -> Result<(), ValidationError> {
    let mut seen = HashSet::with_capacity(cameras.len());
    for camera in cameras {
        if camera.id.trim().is_empty() {
            return Err(ValidationError::new("empty_camera_id"));
        }
        if !seen.insert(camera.id.as_str()) {
            return Err(ValidationError::new("duplicate_camera_id"));
        }
        if let TransportDescriptor::Network { uri } = &camera.transport {
            validate_http_url(uri)?;
        }
    }
    Ok(())
}

/// Validate that a string is an absolute http(s) URL.
pub fn validate_http_url(value: &str) -> Result<(), ValidationError> {
    let parsed = url::Url::parse(value).map_err(|_| ValidationError::new("invalid_url"))?;
    match parsed.scheme() {
        "http" | "https" if parsed.host_str().is_some() => Ok(()),
        _ => Err(ValidationError::new("unsupported_url_scheme")),
    }
}

/// Validate a tracing filter level.
pub fn validate_log_level(level: &str) -> Result<(), ValidationError> {
    let valid = ["trace", "debug", "info", "warn", "error"]
        .contains(&level.to_lowercase().as_str());
    if valid {
        Ok(())
    } else {
        Err(ValidationError::new("invalid_log_level"))
    }
}

/// Validate an MQTT topic prefix: no wildcards, no leading or trailing slash.
pub fn validate_topic_prefix(prefix: &str) -> Result<(), ValidationError> {
    let re = regex::Regex::new("^[A-Za-z0-9_-]+(/[A-Za-z0-9_-]+)*$")
        .map_err(|_| ValidationError::new("invalid_regex"))?;
    if re.is_match(prefix) {
        Ok(())
    } else {
        Err(ValidationError::new("invalid_topic_prefix"))
    }
}

/// Validate that an enabled Telegram destination has both credentials.
pub fn validate_telegram(config: &TelegramConfig) -> Result<(), ValidationError> {
    if !config.enabled {
        return Ok(());
    }
    let present = |v: &Option<String>| v.as_deref().is_some_and(|s| !s.trim().is_empty());
    if present(&config.bot_token) && present(&config.chat_id) {
        Ok(())
    } else {
        Err(ValidationError::new("telegram_credentials_missing"))
    }
}

/// Validate that the reconnect backoff cap is not below its base delay.
pub fn validate_reconnect(config: &ReconnectConfig) -> Result<(), ValidationError> {
    if config.max_delay_ms >= config.base_delay_ms {
        Ok(())
    } else {
        Err(ValidationError::new("max_delay_below_base_delay"))
    }
}
