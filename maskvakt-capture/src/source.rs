//! ## maskvakt-capture::source
//! **One camera and its capture thread**
//!
//! A `FrameSource` owns its device and a bounded frame buffer. While running,
//! a dedicated thread reads one frame per iteration, pushes it into the
//! buffer (dropping it when the buffer is full) and sleeps to cap the loop at
//! the target frame rate. Transient read failures are logged and the loop
//! continues; only an unrecoverable device error ends it early.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use chrono::Utc;
use maskvakt_core::frame::FrameEnvelope;
use maskvakt_core::source::{SourceDescriptor, TransportDescriptor};
use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, error, info, instrument, warn};

use crate::buffer::{FrameBuffer, PushOutcome};
use crate::device::{CaptureDevice, CaptureOptions};
use crate::error::CaptureError;

type SharedDevice = Arc<Mutex<Box<dyn CaptureDevice>>>;

/// Copy of a source's descriptor and live state.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceSnapshot {
    pub id: String,
    pub name: String,
    pub location: String,
    pub transport: TransportDescriptor,
    pub active: bool,
    pub running: bool,
    pub frames_captured: u64,
    pub frames_dropped: u64,
    pub buffered: usize,
    pub buffer_capacity: usize,
    /// Why the source last failed to open or stopped on its own
    pub last_error: Option<String>,
}

pub struct FrameSource {
    descriptor: SourceDescriptor,
    id: Arc<str>,
    frame_interval: Duration,
    device: SharedDevice,
    buffer: Arc<FrameBuffer>,
    opened: AtomicBool,
    running: Arc<AtomicBool>,
    // Serializes start/stop and owns the capture thread handle.
    worker: Mutex<Option<JoinHandle<()>>>,
    last_error: Arc<Mutex<Option<String>>>,
}

impl FrameSource {
    pub fn new(
        descriptor: SourceDescriptor,
        device: Box<dyn CaptureDevice>,
        options: &CaptureOptions,
    ) -> Result<Self, CaptureError> {
        let buffer = FrameBuffer::with_capacity(options.buffer_size)?;
        let id: Arc<str> = Arc::from(descriptor.id.as_str());
        Ok(Self {
            descriptor,
            id,
            frame_interval: options.frame_interval,
            device: Arc::new(Mutex::new(device)),
            buffer: Arc::new(buffer),
            opened: AtomicBool::new(false),
            running: Arc::new(AtomicBool::new(false)),
            worker: Mutex::new(None),
            last_error: Arc::new(Mutex::new(None)),
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn descriptor(&self) -> &SourceDescriptor {
        &self.descriptor
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub fn is_open(&self) -> bool {
        self.opened.load(Ordering::Acquire)
    }

    /// Establishes the transport. On failure the source stays stopped and
    /// the reason is kept for status queries.
    #[instrument(skip(self), fields(source_id = %self.id))]
    pub fn open(&self) -> Result<(), CaptureError> {
        if self.is_running() || self.is_open() {
            return Ok(());
        }
        match self.device.lock().open() {
            Ok(()) => {
                self.opened.store(true, Ordering::Release);
                *self.last_error.lock() = None;
                info!("Source opened");
                Ok(())
            }
            Err(e) => {
                let reason = e.to_string();
                warn!(error = %reason, "Source unavailable");
                *self.last_error.lock() = Some(reason.clone());
                Err(CaptureError::SourceUnavailable {
                    source_id: self.id.to_string(),
                    reason,
                })
            }
        }
    }

    /// Spawns the capture loop, opening the transport first if needed.
    /// No-op when already running.
    #[instrument(skip(self), fields(source_id = %self.id))]
    pub fn start(&self) -> Result<(), CaptureError> {
        let mut worker = self.worker.lock();
        if self.is_running() {
            return Ok(());
        }
        // Reap a loop that ended on its own; its device needs reopening.
        if let Some(handle) = worker.take() {
            let _ = handle.join();
            if self.opened.swap(false, Ordering::AcqRel) {
                self.device.lock().close();
            }
        }
        self.open()?;

        self.running.store(true, Ordering::Release);
        let capture = CaptureLoop {
            id: Arc::clone(&self.id),
            interval: self.frame_interval,
            device: Arc::clone(&self.device),
            buffer: Arc::clone(&self.buffer),
            running: Arc::clone(&self.running),
            last_error: Arc::clone(&self.last_error),
        };
        let spawned = thread::Builder::new()
            .name(format!("capture-{}", self.id))
            .spawn(move || capture.run());

        match spawned {
            Ok(handle) => {
                *worker = Some(handle);
                info!("Capture started");
                Ok(())
            }
            Err(e) => {
                self.running.store(false, Ordering::Release);
                Err(CaptureError::Spawn(e))
            }
        }
    }

    /// Signals the loop, joins it and releases the transport. Safe to call on
    /// a stopped source.
    #[instrument(skip(self), fields(source_id = %self.id))]
    pub fn stop(&self) {
        let mut worker = self.worker.lock();
        let was_running = self.running.swap(false, Ordering::AcqRel);
        if let Some(handle) = worker.take() {
            if handle.join().is_err() {
                error!("Capture thread panicked");
            }
        }
        if self.opened.swap(false, Ordering::AcqRel) {
            self.device.lock().close();
        }
        if was_running {
            info!("Capture stopped");
        }
    }

    /// Oldest buffered frame, waiting at most `timeout`.
    pub fn pull(&self, timeout: Duration) -> Option<FrameEnvelope> {
        self.buffer.pull(timeout)
    }

    pub fn frames_captured(&self) -> u64 {
        self.buffer.captured()
    }

    pub fn frames_dropped(&self) -> u64 {
        self.buffer.dropped()
    }

    pub fn last_error(&self) -> Option<String> {
        self.last_error.lock().clone()
    }

    /// Point-in-time copy of this source's state.
    pub fn snapshot(&self) -> SourceSnapshot {
        SourceSnapshot {
            id: self.descriptor.id.clone(),
            name: self.descriptor.name.clone(),
            location: self.descriptor.location.clone(),
            transport: self.descriptor.transport.clone(),
            active: self.descriptor.active,
            running: self.is_running(),
            frames_captured: self.frames_captured(),
            frames_dropped: self.frames_dropped(),
            buffered: self.buffer.len(),
            buffer_capacity: self.buffer.capacity(),
            last_error: self.last_error(),
        }
    }
}

impl Drop for FrameSource {
    fn drop(&mut self) {
        self.stop();
    }
}

struct CaptureLoop {
    id: Arc<str>,
    interval: Duration,
    device: SharedDevice,
    buffer: Arc<FrameBuffer>,
    running: Arc<AtomicBool>,
    last_error: Arc<Mutex<Option<String>>>,
}

impl CaptureLoop {
    fn run(self) {
        let mut sequence = 0u64;
        while self.running.load(Ordering::Acquire) {
            let started = Instant::now();
            let read = self.device.lock().read_frame();
            match read {
                Ok(payload) => {
                    sequence += 1;
                    let frame = FrameEnvelope::new(
                        Arc::clone(&self.id),
                        sequence,
                        Instant::now(),
                        Utc::now(),
                        payload,
                    );
                    if self.buffer.push(frame) == PushOutcome::Dropped {
                        debug!(source_id = %self.id, sequence, "Frame buffer full, frame dropped");
                    }
                }
                Err(e) if e.is_recoverable() => {
                    warn!(source_id = %self.id, error = %e, "Frame read failed");
                }
                Err(e) => {
                    error!(source_id = %self.id, error = %e, "Capture loop stopping");
                    *self.last_error.lock() = Some(e.to_string());
                    self.running.store(false, Ordering::Release);
                    break;
                }
            }

            let elapsed = started.elapsed();
            if elapsed < self.interval {
                thread::sleep(self.interval - elapsed);
            }
        }
    }
}
