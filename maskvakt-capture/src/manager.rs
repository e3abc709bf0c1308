//! ## maskvakt-capture::manager
//! **Camera fleet ownership and control surface**
//!
//! The manager builds one `FrameSource` per configured camera and is the only
//! owner of them. Fleet start is fault-isolated: sources are opened in
//! parallel and a camera that fails to open is reported, never fatal.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use maskvakt_config::CaptureConfig;
use maskvakt_core::frame::FrameEnvelope;
use maskvakt_core::source::SourceDescriptor;
use tracing::{info, instrument, warn};

use crate::device::{CaptureDevice, CaptureOptions, Transport};
use crate::error::CaptureError;
use crate::source::{FrameSource, SourceSnapshot};

/// Builds the device for a descriptor. Production uses [`Transport`].
pub type DeviceFactory =
    Arc<dyn Fn(&SourceDescriptor, &CaptureOptions) -> Box<dyn CaptureDevice> + Send + Sync>;

/// A source that could not be started by `start_all`.
#[derive(Debug)]
pub struct StartFailure {
    pub source_id: String,
    pub error: CaptureError,
}

pub struct CameraStreamManager {
    sources: Vec<Arc<FrameSource>>,
    settle_delay: Duration,
}

impl CameraStreamManager {
    /// Builds the fleet with the real network/local transports.
    pub fn new(config: &CaptureConfig) -> Result<Self, CaptureError> {
        let factory: DeviceFactory = Arc::new(
            |descriptor: &SourceDescriptor, options: &CaptureOptions| -> Box<dyn CaptureDevice> {
                Box::new(Transport::from_descriptor(&descriptor.transport, options))
            },
        );
        Self::with_factory(config, factory)
    }

    pub fn with_factory(config: &CaptureConfig, factory: DeviceFactory) -> Result<Self, CaptureError> {
        let options = CaptureOptions::from(config);
        let sources = config
            .cameras
            .iter()
            .map(|descriptor| {
                let device = factory(descriptor, &options);
                FrameSource::new(descriptor.clone(), device, &options).map(Arc::new)
            })
            .collect::<Result<Vec<_>, _>>()?;

        info!(cameras = sources.len(), "Camera fleet loaded");
        Ok(Self {
            sources,
            settle_delay: config.settle_delay(),
        })
    }

    fn find(&self, id: &str) -> Result<&Arc<FrameSource>, CaptureError> {
        self.sources
            .iter()
            .find(|s| s.id() == id)
            .ok_or_else(|| CaptureError::UnknownSource(id.to_string()))
    }

    pub fn source(&self, id: &str) -> Option<Arc<FrameSource>> {
        self.find(id).ok().cloned()
    }

    /// Starts every administratively active source. Failures are logged and
    /// returned; they never prevent the remaining sources from starting.
    #[instrument(skip(self))]
    pub fn start_all(&self) -> Vec<StartFailure> {
        let active: Vec<&Arc<FrameSource>> =
            self.sources.iter().filter(|s| s.descriptor().active).collect();

        let failures: Vec<StartFailure> = thread::scope(|scope| {
            let handles: Vec<_> = active
                .iter()
                .map(|source| (source.id().to_string(), scope.spawn(move || source.start())))
                .collect();

            handles
                .into_iter()
                .filter_map(|(source_id, handle)| {
                    let result = handle
                        .join()
                        .unwrap_or_else(|_| Err(CaptureError::StartPanicked(source_id.clone())));
                    result.err().map(|error| StartFailure { source_id, error })
                })
                .collect()
        });

        for failure in &failures {
            warn!(source_id = %failure.source_id, error = %failure.error, "Camera failed to start");
        }
        info!(
            started = active.len() - failures.len(),
            failed = failures.len(),
            "Camera fleet started"
        );
        failures
    }

    #[instrument(skip(self))]
    pub fn stop_all(&self) {
        for source in &self.sources {
            source.stop();
        }
    }

    pub fn start(&self, id: &str) -> Result<(), CaptureError> {
        self.find(id)?.start()
    }

    pub fn stop(&self, id: &str) -> Result<(), CaptureError> {
        self.find(id)?.stop();
        Ok(())
    }

    /// Stop, wait the settle delay, start.
    #[instrument(skip(self))]
    pub fn restart(&self, id: &str) -> Result<(), CaptureError> {
        let source = self.find(id)?;
        source.stop();
        thread::sleep(self.settle_delay);
        source.start()
    }

    /// Next buffered frame for `id`, or `None` after `timeout`.
    pub fn pull(&self, id: &str, timeout: Duration) -> Result<Option<FrameEnvelope>, CaptureError> {
        Ok(self.find(id)?.pull(timeout))
    }

    /// Point-in-time copies; later start/stop calls do not affect them.
    pub fn list_sources(&self) -> Vec<SourceSnapshot> {
        self.sources.iter().map(|s| s.snapshot()).collect()
    }

    pub fn running_sources(&self) -> Vec<Arc<FrameSource>> {
        self.sources
            .iter()
            .filter(|s| s.is_running())
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}

impl Drop for CameraStreamManager {
    fn drop(&mut self) {
        self.stop_all();
    }
}
