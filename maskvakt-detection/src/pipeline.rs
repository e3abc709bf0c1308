//! ## maskvakt-detection::pipeline
//! **Bounded input queue, fixed worker pool, bounded output queue**
//!
//! ### Worker loop
//! 1. Pop a frame with the poll interval as timeout (cancellation point).
//! 2. Classify it. Errors and panics from the classifier drop the frame.
//! 3. Push the result to the output queue, dropping it when full.
//! 4. Persist the result, then call every hook in registration order.
//!
//! `stop()` is cooperative: it flips the run flag, joins workers that exit
//! before the stop timeout and abandons the rest. An abandoned worker still
//! exits at its next poll because every run has its own flag.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;

use crossbeam::channel::{self, Receiver, Sender};
use maskvakt_config::PipelineConfig;
use maskvakt_core::clock::{Clock, SystemClock};
use maskvakt_core::detection::DetectionResult;
use maskvakt_core::frame::FrameEnvelope;
use maskvakt_core::queue::BoundedQueue;
use maskvakt_core::store::DetectionStore;
use maskvakt_telemetry::MetricsRecorder;
use parking_lot::Mutex;
use tracing::{debug, error, info, instrument, warn};

use crate::error::{DetectionError, InferenceError};
use crate::inference::{InferenceAdapter, ResultHook};
use crate::stats::{PipelineCounters, PipelineStats, RateMeter};

/// Outcome of `stop()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StopReport {
    pub joined: usize,
    pub abandoned: usize,
}

struct Run {
    running: Arc<AtomicBool>,
    workers: Vec<JoinHandle<()>>,
    done: Receiver<usize>,
}

/// Everything a worker needs, shared by all workers of one run.
struct WorkerContext {
    adapter: Arc<dyn InferenceAdapter>,
    store: Option<Arc<dyn DetectionStore>>,
    hooks: Vec<Arc<dyn ResultHook>>,
    metrics: Option<MetricsRecorder>,
    clock: Arc<dyn Clock>,
    input: BoundedQueue<FrameEnvelope>,
    output: BoundedQueue<DetectionResult>,
    counters: Arc<PipelineCounters>,
    rate: Arc<RateMeter>,
    poll_interval: std::time::Duration,
}

pub struct DetectionPipeline {
    config: PipelineConfig,
    adapter: Arc<dyn InferenceAdapter>,
    store: Option<Arc<dyn DetectionStore>>,
    hooks: Vec<Arc<dyn ResultHook>>,
    metrics: Option<MetricsRecorder>,
    clock: Arc<dyn Clock>,
    input: BoundedQueue<FrameEnvelope>,
    output: BoundedQueue<DetectionResult>,
    counters: Arc<PipelineCounters>,
    rate: Arc<RateMeter>,
    run: Mutex<Option<Run>>,
    workers: Mutex<usize>,
}

impl DetectionPipeline {
    pub fn new(
        config: &PipelineConfig,
        adapter: Arc<dyn InferenceAdapter>,
    ) -> Result<Self, DetectionError> {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        Ok(Self {
            config: config.clone(),
            adapter,
            store: None,
            hooks: Vec::new(),
            metrics: None,
            input: BoundedQueue::with_capacity(config.input_capacity)?,
            output: BoundedQueue::with_capacity(config.output_capacity)?,
            counters: Arc::new(PipelineCounters::default()),
            rate: Arc::new(RateMeter::new(clock.now())),
            clock,
            run: Mutex::new(None),
            workers: Mutex::new(0),
        })
    }

    /// Persistence target; written before hooks run.
    pub fn with_store(mut self, store: Arc<dyn DetectionStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Adds a hook. Hooks run in the order they were added.
    pub fn with_hook(mut self, hook: Arc<dyn ResultHook>) -> Self {
        self.hooks.push(hook);
        self
    }

    pub fn with_metrics(mut self, metrics: MetricsRecorder) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.rate = Arc::new(RateMeter::new(clock.now()));
        self.clock = clock;
        self
    }

    pub fn is_running(&self) -> bool {
        self.run
            .lock()
            .as_ref()
            .is_some_and(|run| run.running.load(Ordering::Acquire))
    }

    /// `stopped -> running`: spawns `worker_count` workers. No-op when
    /// already running.
    #[instrument(skip(self))]
    pub fn start(&self, worker_count: usize) -> Result<(), DetectionError> {
        if worker_count == 0 {
            return Err(DetectionError::InvalidWorkerCount);
        }
        let mut run = self.run.lock();
        if run.is_some() {
            debug!("Pipeline already running");
            return Ok(());
        }

        let running = Arc::new(AtomicBool::new(true));
        let (done_tx, done_rx) = channel::unbounded();
        let context = Arc::new(WorkerContext {
            adapter: Arc::clone(&self.adapter),
            store: self.store.clone(),
            hooks: self.hooks.clone(),
            metrics: self.metrics.clone(),
            clock: Arc::clone(&self.clock),
            input: self.input.share(),
            output: self.output.share(),
            counters: Arc::clone(&self.counters),
            rate: Arc::clone(&self.rate),
            poll_interval: self.config.poll_interval(),
        });

        let mut workers = Vec::with_capacity(worker_count);
        for index in 0..worker_count {
            let worker = Worker {
                index,
                context: Arc::clone(&context),
                running: Arc::clone(&running),
                done: done_tx.clone(),
            };
            // Counted before spawning so the guard's decrement never underflows.
            self.counters.alive_workers.fetch_add(1, Ordering::AcqRel);
            match thread::Builder::new()
                .name(format!("detect-{index}"))
                .spawn(move || worker.run())
            {
                Ok(handle) => workers.push(handle),
                Err(e) => {
                    self.counters.alive_workers.fetch_sub(1, Ordering::AcqRel);
                    running.store(false, Ordering::Release);
                    error!(error = %e, "Failed to spawn detection worker");
                    return Err(DetectionError::Spawn(e));
                }
            }
        }

        *self.workers.lock() = worker_count;
        *run = Some(Run {
            running,
            workers,
            done: done_rx,
        });
        info!(workers = worker_count, "Detection pipeline started");
        Ok(())
    }

    /// `running -> stopped`. Waits up to the configured stop timeout.
    #[instrument(skip(self))]
    pub fn stop(&self) -> StopReport {
        let Some(run) = self.run.lock().take() else {
            return StopReport::default();
        };
        run.running.store(false, Ordering::Release);

        let deadline = Instant::now() + self.config.stop_timeout();
        let mut finished = vec![false; run.workers.len()];
        let mut remaining = run.workers.len();
        while remaining > 0 {
            match run.done.recv_deadline(deadline) {
                Ok(index) => {
                    if let Some(slot) = finished.get_mut(index) {
                        *slot = true;
                        remaining -= 1;
                    }
                }
                Err(_) => break,
            }
        }

        let mut report = StopReport::default();
        for (index, handle) in run.workers.into_iter().enumerate() {
            if finished[index] {
                if handle.join().is_err() {
                    error!(worker = index, "Detection worker panicked");
                }
                report.joined += 1;
            } else {
                // Dropping the handle detaches the thread.
                report.abandoned += 1;
            }
        }

        if report.abandoned > 0 {
            warn!(abandoned = report.abandoned, "Detection workers did not stop in time");
        }
        info!(joined = report.joined, "Detection pipeline stopped");
        report
    }

    /// Non-blocking submit. `false` when the input queue is full.
    pub fn add_frame(&self, frame: FrameEnvelope) -> bool {
        match self.input.try_push(frame) {
            Ok(()) => true,
            Err(_) => {
                PipelineCounters::bump(&self.counters.frames_rejected);
                false
            }
        }
    }

    /// Up to `limit` results that are ready now; never blocks.
    pub fn drain_results(&self, limit: usize) -> Vec<DetectionResult> {
        self.output.drain(limit)
    }

    /// Classifies one frame directly, outside the queues and hooks.
    pub fn process_single(&self, frame: &FrameEnvelope) -> Result<DetectionResult, InferenceError> {
        classify_guarded(self.adapter.as_ref(), frame)
    }

    pub fn stats(&self) -> PipelineStats {
        let c = &self.counters;
        PipelineStats {
            running: self.is_running(),
            workers: *self.workers.lock(),
            alive_workers: c.alive_workers.load(Ordering::Acquire),
            frames_processed: c.frames_processed.load(Ordering::Relaxed),
            frames_rejected: c.frames_rejected.load(Ordering::Relaxed),
            results_dropped: c.results_dropped.load(Ordering::Relaxed),
            inference_errors: c.inference_errors.load(Ordering::Relaxed),
            store_errors: c.store_errors.load(Ordering::Relaxed),
            processing_rate: self.rate.rate(self.clock.now()),
            input_depth: self.input.len(),
            input_capacity: self.input.capacity(),
            output_depth: self.output.len(),
            output_capacity: self.output.capacity(),
        }
    }
}

impl Drop for DetectionPipeline {
    fn drop(&mut self) {
        self.stop();
    }
}

fn classify_guarded(
    adapter: &dyn InferenceAdapter,
    frame: &FrameEnvelope,
) -> Result<DetectionResult, InferenceError> {
    panic::catch_unwind(AssertUnwindSafe(|| adapter.classify(frame)))
        .unwrap_or(Err(InferenceError::Panicked))
}

struct Worker {
    index: usize,
    context: Arc<WorkerContext>,
    running: Arc<AtomicBool>,
    done: Sender<usize>,
}

/// Keeps the alive count and the done signal correct however the loop exits.
struct AliveGuard<'a> {
    worker: &'a Worker,
}

impl Drop for AliveGuard<'_> {
    fn drop(&mut self) {
        self.worker
            .context
            .counters
            .alive_workers
            .fetch_sub(1, Ordering::AcqRel);
        let _ = self.worker.done.send(self.worker.index);
    }
}

impl Worker {
    fn run(self) {
        let _guard = AliveGuard { worker: &self };
        debug!(worker = self.index, "Detection worker started");
        while self.running.load(Ordering::Acquire) {
            let Some(frame) = self.context.input.pop_timeout(self.context.poll_interval) else {
                continue;
            };
            self.process(&frame);
        }
        debug!(worker = self.index, "Detection worker exiting");
    }

    fn process(&self, frame: &FrameEnvelope) {
        let ctx = &self.context;
        let started = Instant::now();

        let result = match classify_guarded(ctx.adapter.as_ref(), frame) {
            Ok(result) => result,
            Err(e) => {
                PipelineCounters::bump(&ctx.counters.inference_errors);
                if let Some(metrics) = &ctx.metrics {
                    metrics.inference_errors.inc();
                }
                warn!(
                    source_id = %frame.source_id,
                    sequence = frame.sequence,
                    error = %e,
                    "Inference failed, frame dropped"
                );
                return;
            }
        };

        PipelineCounters::bump(&ctx.counters.frames_processed);
        ctx.rate.record(ctx.clock.now());
        if let Some(metrics) = &ctx.metrics {
            metrics.frames_processed.inc();
            metrics
                .inference_latency
                .observe(started.elapsed().as_secs_f64());
        }

        if ctx.output.try_push(result.clone()).is_err() {
            PipelineCounters::bump(&ctx.counters.results_dropped);
            if let Some(metrics) = &ctx.metrics {
                metrics.results_dropped.inc();
            }
            debug!(source_id = %frame.source_id, "Output queue full, result dropped");
        }

        if let Some(store) = &ctx.store {
            if let Err(e) = store.append_detection(&result) {
                PipelineCounters::bump(&ctx.counters.store_errors);
                warn!(source_id = %frame.source_id, error = %e, "Failed to persist detection");
            }
        }

        for hook in &ctx.hooks {
            hook.on_result(&result);
        }
    }
}
