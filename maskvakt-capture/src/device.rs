//! The capture capability shared by every transport.

use std::time::Duration;

use bytes::Bytes;
use maskvakt_config::CaptureConfig;
use maskvakt_core::source::TransportDescriptor;

use crate::error::CaptureError;
use crate::local::LocalDevice;
use crate::network::NetworkStream;

/// A camera handle that yields encoded frames.
///
/// `open` and `close` may be called repeatedly; a closed device can be
/// reopened.
pub trait CaptureDevice: Send {
    fn open(&mut self) -> Result<(), CaptureError>;

    /// Blocks for at most the transport read timeout.
    fn read_frame(&mut self) -> Result<Bytes, CaptureError>;

    fn close(&mut self);
}

/// Per-source capture parameters derived from configuration.
#[derive(Debug, Clone)]
pub struct CaptureOptions {
    pub buffer_size: usize,
    pub frame_interval: Duration,
    pub read_timeout: Duration,
    pub max_frame_bytes: usize,
}

impl From<&CaptureConfig> for CaptureOptions {
    fn from(config: &CaptureConfig) -> Self {
        Self {
            buffer_size: config.buffer_size,
            frame_interval: config.frame_interval(),
            read_timeout: config.read_timeout(),
            max_frame_bytes: config.max_frame_bytes,
        }
    }
}

impl Default for CaptureOptions {
    fn default() -> Self {
        Self::from(&CaptureConfig::default())
    }
}

/// Exactly the two supported transports.
pub enum Transport {
    Network(NetworkStream),
    Local(LocalDevice),
}

impl Transport {
    pub fn from_descriptor(descriptor: &TransportDescriptor, options: &CaptureOptions) -> Self {
        match descriptor {
            TransportDescriptor::Network { uri } => Transport::Network(NetworkStream::new(
                uri.clone(),
                options.read_timeout,
                options.max_frame_bytes,
            )),
            TransportDescriptor::Local { index } => {
                Transport::Local(LocalDevice::new(*index, options.max_frame_bytes))
            }
        }
    }
}

impl CaptureDevice for Transport {
    fn open(&mut self) -> Result<(), CaptureError> {
        match self {
            Transport::Network(stream) => stream.open(),
            Transport::Local(device) => device.open(),
        }
    }

    fn read_frame(&mut self) -> Result<Bytes, CaptureError> {
        match self {
            Transport::Network(stream) => stream.read_frame(),
            Transport::Local(device) => device.read_frame(),
        }
    }

    fn close(&mut self) {
        match self {
            Transport::Network(stream) => stream.close(),
            Transport::Local(device) => device.close(),
        }
    }
}
