//! Pipeline counters and the processing-rate meter.
//!
//! Counters are plain atomics and tolerate eventual consistency; readers get
//! a copy through [`PipelineStats`].

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::Serialize;

const RATE_WINDOW: Duration = Duration::from_secs(1);

#[derive(Debug, Default)]
pub(crate) struct PipelineCounters {
    pub frames_processed: AtomicU64,
    pub frames_rejected: AtomicU64,
    pub results_dropped: AtomicU64,
    pub inference_errors: AtomicU64,
    pub store_errors: AtomicU64,
    pub alive_workers: AtomicUsize,
}

impl PipelineCounters {
    #[inline]
    pub fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// Frames per second, recomputed once per window from a counter that is
/// reset at each recomputation.
#[derive(Debug)]
pub(crate) struct RateMeter {
    inner: Mutex<RateWindow>,
}

#[derive(Debug)]
struct RateWindow {
    started: Instant,
    count: u64,
    rate: f64,
}

impl RateMeter {
    pub fn new(now: Instant) -> Self {
        Self {
            inner: Mutex::new(RateWindow {
                started: now,
                count: 0,
                rate: 0.0,
            }),
        }
    }

    pub fn record(&self, now: Instant) {
        let mut window = self.inner.lock();
        window.count += 1;
        let elapsed = now.saturating_duration_since(window.started);
        if elapsed >= RATE_WINDOW {
            window.rate = window.count as f64 / elapsed.as_secs_f64();
            window.count = 0;
            window.started = now;
        }
    }

    /// Last computed rate; 0 once no frame has been recorded for two windows.
    pub fn rate(&self, now: Instant) -> f64 {
        let window = self.inner.lock();
        if now.saturating_duration_since(window.started) >= RATE_WINDOW * 2 {
            0.0
        } else {
            window.rate
        }
    }
}

/// Point-in-time copy of the pipeline statistics.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PipelineStats {
    pub running: bool,
    pub workers: usize,
    pub alive_workers: usize,
    pub frames_processed: u64,
    pub frames_rejected: u64,
    pub results_dropped: u64,
    pub inference_errors: u64,
    pub store_errors: u64,
    /// Frames per second over the last completed window
    pub processing_rate: f64,
    pub input_depth: usize,
    pub input_capacity: usize,
    pub output_depth: usize,
    pub output_capacity: usize,
}
