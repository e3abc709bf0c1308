// maskvakt-config/src/alerts.rs
//! Alert dispatch configuration.
//!
//! Cooldown window plus the notifier destinations:
//! - Structured log sink
//! - Telegram chat
//! - MQTT broker

use std::time::Duration;

use serde::{Deserialize, Serialize};
use validator::{self, Validate};

use crate::validation;

#[derive(Debug, Serialize, Deserialize, Validate, Clone)]
pub struct AlertsConfig {
    /// Minimum time between two alerts for the same (source, kind) pair (seconds).
    #[validate(range(max = 604_800))]
    #[serde(default = "default_cooldown")]
    pub cooldown_secs: u64,

    /// Always record alerts through the structured event log.
    #[serde(default = "default_true")]
    pub log_alerts: bool,

    #[validate(nested)]
    #[serde(default)]
    pub telegram: TelegramConfig,

    #[validate(nested)]
    #[serde(default)]
    pub mqtt: MqttConfig,
}

fn default_cooldown() -> u64 {
    300
}

fn default_true() -> bool {
    true
}

impl AlertsConfig {
    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_secs)
    }
}

impl Default for AlertsConfig {
    fn default() -> Self {
        Self {
            cooldown_secs: default_cooldown(),
            log_alerts: true,
            telegram: TelegramConfig::default(),
            mqtt: MqttConfig::default(),
        }
    }
}

/// Telegram bot destination.
#[derive(Debug, Serialize, Deserialize, Validate, Clone)]
#[validate(schema(function = validation::validate_telegram))]
pub struct TelegramConfig {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default)]
    pub bot_token: Option<String>,

    #[serde(default)]
    pub chat_id: Option<String>,

    /// Bot API base URL.
    #[validate(custom(function = validation::validate_http_url))]
    #[serde(default = "default_api_base")]
    pub api_base: String,

    #[validate(range(min = 1, max = 120_000))]
    #[serde(default = "default_telegram_timeout")]
    pub timeout_ms: u64,
}

fn default_api_base() -> String {
    "https://api.telegram.org".into()
}

fn default_telegram_timeout() -> u64 {
    10_000
}

impl TelegramConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            bot_token: None,
            chat_id: None,
            api_base: default_api_base(),
            timeout_ms: default_telegram_timeout(),
        }
    }
}

/// MQTT broker destination and link parameters.
#[derive(Debug, Serialize, Deserialize, Validate, Clone)]
pub struct MqttConfig {
    #[serde(default)]
    pub enabled: bool,

    #[validate(length(min = 1, max = 253))]
    #[serde(default = "default_broker")]
    pub broker: String,

    #[validate(range(min = 1))]
    #[serde(default = "default_port")]
    pub port: u16,

    #[validate(length(min = 1, max = 23))]
    #[serde(default = "default_client_id")]
    pub client_id: String,

    #[serde(default)]
    pub username: Option<String>,

    #[serde(default)]
    pub password: Option<String>,

    /// Prefix of every published and subscribed topic.
    #[validate(custom(function = validation::validate_topic_prefix))]
    #[serde(default = "default_topic_prefix")]
    pub topic_prefix: String,

    #[validate(range(min = 5, max = 3600))]
    #[serde(default = "default_keep_alive")]
    pub keep_alive_secs: u64,

    #[validate(nested)]
    #[serde(default)]
    pub reconnect: ReconnectConfig,
}

fn default_broker() -> String {
    "localhost".into()
}

fn default_port() -> u16 {
    1883
}

fn default_client_id() -> String {
    "maskvakt".into()
}

fn default_topic_prefix() -> String {
    "face_mask_detection".into()
}

fn default_keep_alive() -> u64 {
    60
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            broker: default_broker(),
            port: default_port(),
            client_id: default_client_id(),
            username: None,
            password: None,
            topic_prefix: default_topic_prefix(),
            keep_alive_secs: default_keep_alive(),
            reconnect: ReconnectConfig::default(),
        }
    }
}

/// Broker reconnect backoff.
#[derive(Debug, Serialize, Deserialize, Validate, Clone)]
#[validate(schema(function = validation::validate_reconnect))]
pub struct ReconnectConfig {
    #[validate(range(min = 1))]
    #[serde(default = "default_base_delay")]
    pub base_delay_ms: u64,

    #[validate(range(min = 1))]
    #[serde(default = "default_max_delay")]
    pub max_delay_ms: u64,

    /// Consecutive failed attempts before the link gives up.
    #[validate(range(min = 1, max = 10_000))]
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

fn default_base_delay() -> u64 {
    5000
}

fn default_max_delay() -> u64 {
    60_000
}

fn default_max_attempts() -> u32 {
    10
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            base_delay_ms: default_base_delay(),
            max_delay_ms: default_max_delay(),
            max_attempts: default_max_attempts(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use validator::Validate;

    #[test]
    fn valid_default_alerts_config() {
        let config = AlertsConfig::default();
        config.validate().expect("Default config should be valid");
    }

    #[test]
    fn enabled_telegram_requires_credentials() {
        let mut config = AlertsConfig::default();
        config.telegram.enabled = true;
        assert!(config.validate().is_err());

        config.telegram.bot_token = Some("123:abc".into());
        config.telegram.chat_id = Some("-100200".into());
        config.validate().expect("Telegram with credentials should pass");
    }

    #[test]
    fn reconnect_max_below_base_rejected() {
        let mut config = AlertsConfig::default();
        config.mqtt.reconnect.base_delay_ms = 10_000;
        config.mqtt.reconnect.max_delay_ms = 1_000;
        assert!(config.validate().is_err());
    }
}
