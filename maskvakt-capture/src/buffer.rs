//! Per-source frame buffer.
//!
//! Drop-newest: once the buffer is full, incoming frames are discarded and
//! counted while the frames already buffered stay in arrival order.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use maskvakt_core::frame::FrameEnvelope;
use maskvakt_core::queue::{BoundedQueue, QueueError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    Buffered,
    Dropped,
}

pub struct FrameBuffer {
    queue: BoundedQueue<FrameEnvelope>,
    captured: AtomicU64,
    dropped: AtomicU64,
}

impl FrameBuffer {
    pub fn with_capacity(capacity: usize) -> Result<Self, QueueError> {
        Ok(Self {
            queue: BoundedQueue::with_capacity(capacity)?,
            captured: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
        })
    }

    /// Non-blocking push; a full buffer drops `frame`.
    pub fn push(&self, frame: FrameEnvelope) -> PushOutcome {
        self.captured.fetch_add(1, Ordering::Relaxed);
        match self.queue.try_push(frame) {
            Ok(()) => PushOutcome::Buffered,
            Err(_) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                PushOutcome::Dropped
            }
        }
    }

    /// Waits up to `timeout` for the oldest buffered frame.
    pub fn pull(&self, timeout: Duration) -> Option<FrameEnvelope> {
        if timeout.is_zero() {
            self.queue.try_pop()
        } else {
            self.queue.pop_timeout(timeout)
        }
    }

    /// Total frames read from the device, buffered or not.
    pub fn captured(&self) -> u64 {
        self.captured.load(Ordering::Relaxed)
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.queue.capacity()
    }
}
