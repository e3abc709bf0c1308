//! Captured frame envelope.

use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;
use chrono::{DateTime, Utc};

/// One captured image tagged with its source and capture time.
///
/// The payload is an opaque encoded bitmap (JPEG for network streams, raw
/// device format for local devices). Cloning is cheap: the payload is a
/// reference-counted `Bytes` buffer.
#[derive(Clone, Debug)]
pub struct FrameEnvelope {
    /// Id of the source that captured the frame
    pub source_id: Arc<str>,

    /// Per-source capture sequence number, starting at 1
    pub sequence: u64,

    /// Monotonic capture instant
    pub captured_at: Instant,

    /// Wall-clock capture time
    pub wall_time: DateTime<Utc>,

    /// Encoded image bytes
    pub payload: Bytes,
}

impl FrameEnvelope {
    #[inline]
    pub fn new(
        source_id: Arc<str>,
        sequence: u64,
        captured_at: Instant,
        wall_time: DateTime<Utc>,
        payload: Bytes,
    ) -> Self {
        Self {
            source_id,
            sequence,
            captured_at,
            wall_time,
            payload,
        }
    }

    pub fn len(&self) -> usize {
        self.payload.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }
}
