// maskvakt-config/src/capture.rs
//! Camera capture configuration.
//!
//! Defines the camera fleet and the per-source capture loop parameters:
//! - Frame buffer sizing and target frame rate
//! - Transport read timeouts and frame size limits
//! - Feeder polling cadence

use std::time::Duration;

use maskvakt_core::source::SourceDescriptor;
use serde::{Deserialize, Deserializer, Serialize};
use validator::{self, Validate};

use crate::validation;

/// Capture configuration shared by every camera.
#[derive(Debug, Serialize, Deserialize, Validate, Clone)]
pub struct CaptureConfig {
    /// Per-source frame buffer capacity.
    #[validate(range(min = 1, max = 10_000))]
    #[serde(default = "default_buffer_size")]
    pub buffer_size: usize,

    /// Capture loop rate cap (frames per second).
    #[validate(range(min = 1, max = 120))]
    #[serde(default = "default_target_fps")]
    pub target_fps: u32,

    /// Delay between stop and start during a restart (milliseconds).
    #[validate(range(max = 60_000))]
    #[serde(default = "default_settle_delay")]
    pub settle_delay_ms: u64,

    /// Transport read timeout (milliseconds).
    #[validate(range(min = 1, max = 120_000))]
    #[serde(default = "default_read_timeout")]
    pub read_timeout_ms: u64,

    /// Largest accepted encoded frame.
    #[validate(range(min = 1024, max = 268_435_456))]
    #[serde(default = "default_max_frame", deserialize_with = "deserialize_size")]
    pub max_frame_bytes: usize,

    /// Per-camera pull timeout used by the feeder (milliseconds).
    #[validate(range(max = 10_000))]
    #[serde(default = "default_pull_timeout")]
    pub pull_timeout_ms: u64,

    /// Sleep between feeder passes (milliseconds).
    #[validate(range(min = 1, max = 60_000))]
    #[serde(default = "default_feed_interval")]
    pub feed_interval_ms: u64,

    /// Ordered camera descriptors.
    #[validate(custom(function = validation::validate_cameras))]
    #[serde(default)]
    pub cameras: Vec<SourceDescriptor>,
}

fn default_buffer_size() -> usize {
    10
}

fn default_target_fps() -> u32 {
    30
}

fn default_settle_delay() -> u64 {
    1000
}

fn default_read_timeout() -> u64 {
    5000
}

fn default_max_frame() -> usize {
    8 * 1024 * 1024
}

fn default_pull_timeout() -> u64 {
    10
}

fn default_feed_interval() -> u64 {
    100
}

impl CaptureConfig {
    /// Minimum time between two capture loop iterations.
    pub fn frame_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / f64::from(self.target_fps.max(1)))
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    pub fn pull_timeout(&self) -> Duration {
        Duration::from_millis(self.pull_timeout_ms)
    }

    pub fn feed_interval(&self) -> Duration {
        Duration::from_millis(self.feed_interval_ms)
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum SizeValue {
    Num(usize),
    Str(String),
}

/// Custom deserializer to allow human‑friendly sizes (e.g. "8MiB") or direct numbers.
fn deserialize_size<'de, D>(deserializer: D) -> Result<usize, D::Error>
where
    D: Deserializer<'de>,
{
    match SizeValue::deserialize(deserializer)? {
        SizeValue::Num(n) => Ok(n),
        SizeValue::Str(s) => parse_size(&s).map_err(serde::de::Error::custom),
    }
}

fn parse_size(raw: &str) -> Result<usize, String> {
    let s = raw.trim();
    let split = s
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(s.len());
    let (num_part, unit_part) = s.split_at(split);
    let number: f64 = num_part
        .parse()
        .map_err(|_| format!("Invalid size: {raw}"))?;
    let multiplier = match unit_part.trim().to_lowercase().as_str() {
        "b" | "" => 1.0,
        "kb" | "kib" => 1024.0,
        "mb" | "mib" => 1024.0 * 1024.0,
        "gb" | "gib" => 1024.0 * 1024.0 * 1024.0,
        other => return Err(format!("Unknown size unit: {other}")),
    };
    Ok((number * multiplier) as usize)
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            buffer_size: default_buffer_size(),
            target_fps: default_target_fps(),
            settle_delay_ms: default_settle_delay(),
            read_timeout_ms: default_read_timeout(),
            max_frame_bytes: default_max_frame(),
            pull_timeout_ms: default_pull_timeout(),
            feed_interval_ms: default_feed_interval(),
            cameras: Vec::new(),
        }
    }
}
