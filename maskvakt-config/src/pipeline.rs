//! Detection pipeline sizing and timing.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use validator::{self, Validate};

/// Worker pool and queue configuration.
#[derive(Debug, Serialize, Deserialize, Validate, Clone)]
pub struct PipelineConfig {
    /// Number of detection worker threads.
    #[validate(range(min = 1, max = 64))]
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Capacity of the frame input queue.
    #[validate(range(min = 1, max = 100_000))]
    #[serde(default = "default_capacity")]
    pub input_capacity: usize,

    /// Capacity of the result output queue.
    #[validate(range(min = 1, max = 100_000))]
    #[serde(default = "default_capacity")]
    pub output_capacity: usize,

    /// Worker queue-pop timeout; bounds how long `stop()` takes to be observed.
    #[validate(range(min = 1, max = 60_000))]
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,

    /// Upper bound on how long `stop()` waits for workers to exit.
    #[validate(range(min = 1, max = 600_000))]
    #[serde(default = "default_stop_timeout")]
    pub stop_timeout_ms: u64,
}

fn default_workers() -> usize {
    4
}

fn default_capacity() -> usize {
    100
}

fn default_poll_interval() -> u64 {
    1000
}

fn default_stop_timeout() -> u64 {
    5000
}

impl PipelineConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn stop_timeout(&self) -> Duration {
        Duration::from_millis(self.stop_timeout_ms)
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            input_capacity: default_capacity(),
            output_capacity: default_capacity(),
            poll_interval_ms: default_poll_interval(),
            stop_timeout_ms: default_stop_timeout(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_workers_rejected() {
        let config = PipelineConfig {
            workers: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
