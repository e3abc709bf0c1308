//! ## maskvakt-engine::feeder
//! **Moves frames from the cameras into the pipeline**
//!
//! Each cycle pulls at most one frame per running camera, submits it, drains
//! the ready results and publishes them to the broker, then sleeps. A full
//! pipeline input drops the frame; the pipeline counts the rejection.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use maskvakt_alerts::mqtt::MqttLink;
use maskvakt_capture::CameraStreamManager;
use maskvakt_detection::DetectionPipeline;
use serde::Serialize;
use tracing::{debug, info};

const DRAIN_LIMIT: usize = 100;

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct FeederStats {
    pub running: bool,
    pub cycles: u64,
    pub frames_fed: u64,
    pub frames_rejected: u64,
    pub results_drained: u64,
    pub results_published: u64,
}

#[derive(Debug, Default)]
pub(crate) struct FeederCounters {
    cycles: AtomicU64,
    frames_fed: AtomicU64,
    frames_rejected: AtomicU64,
    results_drained: AtomicU64,
    results_published: AtomicU64,
}

impl FeederCounters {
    pub fn snapshot(&self, running: bool) -> FeederStats {
        FeederStats {
            running,
            cycles: self.cycles.load(Ordering::Relaxed),
            frames_fed: self.frames_fed.load(Ordering::Relaxed),
            frames_rejected: self.frames_rejected.load(Ordering::Relaxed),
            results_drained: self.results_drained.load(Ordering::Relaxed),
            results_published: self.results_published.load(Ordering::Relaxed),
        }
    }
}

pub(crate) struct FeederContext {
    pub cameras: Arc<CameraStreamManager>,
    pub pipeline: Arc<DetectionPipeline>,
    pub mqtt: Option<Arc<MqttLink>>,
    pub counters: Arc<FeederCounters>,
    pub pull_timeout: Duration,
    pub interval: Duration,
}

pub(crate) struct Feeder {
    running: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

impl Feeder {
    pub fn spawn(context: FeederContext) -> std::io::Result<Self> {
        let running = Arc::new(AtomicBool::new(true));
        let flag = running.clone();
        let handle = thread::Builder::new()
            .name("frame-feeder".into())
            .spawn(move || feed_loop(&context, &flag))?;
        Ok(Self { running, handle })
    }

    pub fn stop(self) {
        self.running.store(false, Ordering::Release);
        if self.handle.join().is_err() {
            tracing::error!("Frame feeder panicked");
        }
    }
}

fn feed_loop(ctx: &FeederContext, running: &AtomicBool) {
    info!("Frame feeder started");
    while running.load(Ordering::Acquire) {
        for source in ctx.cameras.running_sources() {
            let Some(frame) = source.pull(ctx.pull_timeout) else {
                continue;
            };
            if ctx.pipeline.add_frame(frame) {
                ctx.counters.frames_fed.fetch_add(1, Ordering::Relaxed);
            } else {
                ctx.counters.frames_rejected.fetch_add(1, Ordering::Relaxed);
            }
        }

        for result in ctx.pipeline.drain_results(DRAIN_LIMIT) {
            ctx.counters.results_drained.fetch_add(1, Ordering::Relaxed);
            if let Some(link) = &ctx.mqtt {
                match link.publish_detection(&result) {
                    Ok(()) => {
                        ctx.counters.results_published.fetch_add(1, Ordering::Relaxed);
                    }
                    Err(e) => debug!(source_id = result.source_id(), error = %e, "Detection not published"),
                }
            }
        }

        ctx.counters.cycles.fetch_add(1, Ordering::Relaxed);
        thread::sleep(ctx.interval);
    }
    info!("Frame feeder stopped");
}
