//! Locally attached V4L2 camera using read I/O.
//!
//! Drivers that advertise `V4L2_CAP_READWRITE` return one complete frame per
//! `read(2)` in the currently configured pixel format.

use std::fs::{File, OpenOptions};
use std::io::{ErrorKind, Read};
use std::path::{Path, PathBuf};

use bytes::Bytes;
use tracing::info;

use crate::device::CaptureDevice;
use crate::error::CaptureError;

pub struct LocalDevice {
    path: PathBuf,
    max_frame_bytes: usize,
    file: Option<File>,
    scratch: Vec<u8>,
}

impl LocalDevice {
    /// Device `/dev/video{index}`.
    pub fn new(index: u32, max_frame_bytes: usize) -> Self {
        Self::with_path(format!("/dev/video{index}"), max_frame_bytes)
    }

    pub fn with_path(path: impl AsRef<Path>, max_frame_bytes: usize) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            max_frame_bytes,
            file: None,
            scratch: Vec::new(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl CaptureDevice for LocalDevice {
    fn open(&mut self) -> Result<(), CaptureError> {
        if self.file.is_some() {
            return Ok(());
        }
        let file = OpenOptions::new()
            .read(true)
            .open(&self.path)
            .map_err(|e| CaptureError::DeviceOpen {
                target: self.path.display().to_string(),
                reason: e.to_string(),
            })?;
        info!(path = %self.path.display(), "Local device opened");
        self.file = Some(file);
        Ok(())
    }

    fn read_frame(&mut self) -> Result<Bytes, CaptureError> {
        let file = self.file.as_mut().ok_or(CaptureError::NotOpen)?;
        self.scratch.resize(self.max_frame_bytes, 0);

        match file.read(&mut self.scratch) {
            Ok(0) => Err(CaptureError::TransientRead("device returned no data".into())),
            Ok(n) => Ok(Bytes::copy_from_slice(&self.scratch[..n])),
            Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::Interrupted) => {
                Err(CaptureError::TransientRead("frame not ready".into()))
            }
            Err(e) => Err(CaptureError::TransientRead(e.to_string())),
        }
    }

    fn close(&mut self) {
        if self.file.take().is_some() {
            info!(path = %self.path.display(), "Local device closed");
        }
    }
}
