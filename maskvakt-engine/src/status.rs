//! Aggregate status returned by the control surface.

use chrono::{DateTime, Utc};
use maskvakt_alerts::mqtt::LinkState;
use maskvakt_alerts::DispatcherStats;
use maskvakt_analytics::{CacheStats, LiveCounters};
use maskvakt_capture::SourceSnapshot;
use maskvakt_detection::PipelineStats;
use serde::Serialize;

use crate::feeder::FeederStats;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CameraSummary {
    pub total: usize,
    /// Administratively enabled
    pub active: usize,
    /// Capture loop alive
    pub running: usize,
}

impl CameraSummary {
    pub fn from_snapshots(sources: &[SourceSnapshot]) -> Self {
        Self {
            total: sources.len(),
            active: sources.iter().filter(|s| s.active).count(),
            running: sources.iter().filter(|s| s.running).count(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BrokerStatus {
    pub state: LinkState,
    pub healthy: bool,
    pub last_error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RuntimeStatus {
    pub running: bool,
    pub started_at: Option<DateTime<Utc>>,
    pub cameras: CameraSummary,
    pub pipeline: PipelineStats,
    pub feeder: FeederStats,
    pub alerts: DispatcherStats,
    pub notifiers: Vec<String>,
    pub analytics_cache: CacheStats,
    pub live: LiveCounters,
    /// `None` when the broker link is disabled
    pub broker: Option<BrokerStatus>,
}

impl RuntimeStatus {
    /// False when a required component is down: the pipeline stopped while
    /// the runtime runs, or the broker link gave up.
    pub fn is_healthy(&self) -> bool {
        let pipeline_ok = !self.running || self.pipeline.running;
        let broker_ok = self.broker.as_ref().map_or(true, |b| b.healthy);
        pipeline_ok && broker_ok
    }
}
