//! # maskvakt-capture
//!
//! Camera capture: the two transports, the per-camera capture loop with its
//! bounded frame buffer, and the manager that owns the fleet.
//!
//! ### Key Submodules:
//! - `device`: the `CaptureDevice` capability and the `Transport` union
//! - `network`: MJPEG over HTTP
//! - `local`: V4L2 read I/O on `/dev/video<index>`
//! - `buffer`: drop-newest frame buffer with counters
//! - `source`: `FrameSource`, one capture thread per camera
//! - `manager`: `CameraStreamManager`, fleet start/stop/restart and pull

pub mod buffer;
pub mod device;
pub mod error;
pub mod local;
pub mod manager;
pub mod network;
pub mod source;

pub use buffer::{FrameBuffer, PushOutcome};
pub use device::{CaptureDevice, CaptureOptions, Transport};
pub use error::CaptureError;
pub use local::LocalDevice;
pub use manager::{CameraStreamManager, DeviceFactory, StartFailure};
pub use network::NetworkStream;
pub use source::{FrameSource, SourceSnapshot};
