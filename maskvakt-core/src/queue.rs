//! Bounded multi-producer multi-consumer queue.
//!
//! Every hand-off in the pipeline (camera buffer, detection input, detection
//! output) goes through a `BoundedQueue`. Producers never block: a push into a
//! full queue fails with [`QueueError::Full`] and the caller decides whether to
//! drop. Consumers either poll (`try_pop`) or wait with a deadline
//! (`pop_timeout`) so their loops can re-check a cancellation flag.

use std::time::Duration;

use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender, TrySendError};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum QueueError {
    #[error("Queue capacity exceeded")]
    Full,
    #[error("Invalid capacity (must be at least 1)")]
    InvalidCapacity,
}

/// Cloneable handle to a fixed-capacity FIFO shared between threads.
pub struct BoundedQueue<T> {
    tx: Sender<T>,
    rx: Receiver<T>,
    capacity: usize,
}

impl<T> BoundedQueue<T> {
    /// Creates a queue holding at most `capacity` items.
    pub fn with_capacity(capacity: usize) -> Result<Self, QueueError> {
        if capacity == 0 {
            return Err(QueueError::InvalidCapacity);
        }
        let (tx, rx) = channel::bounded(capacity);
        Ok(Self { tx, rx, capacity })
    }

    /// Creates a new handle to the same queue.
    #[inline]
    pub fn share(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            rx: self.rx.clone(),
            capacity: self.capacity,
        }
    }

    /// Non-blocking push. On a full queue the item is discarded and
    /// `QueueError::Full` returned.
    #[inline]
    pub fn try_push(&self, item: T) -> Result<(), QueueError> {
        match self.tx.try_send(item) {
            Ok(()) => Ok(()),
            // Both ends are owned by `self`, so the channel cannot disconnect.
            Err(TrySendError::Full(_)) | Err(TrySendError::Disconnected(_)) => {
                Err(QueueError::Full)
            }
        }
    }

    /// Non-blocking pop; `None` when empty.
    #[inline]
    pub fn try_pop(&self) -> Option<T> {
        self.rx.try_recv().ok()
    }

    /// Waits up to `timeout` for an item; `None` on timeout.
    pub fn pop_timeout(&self, timeout: Duration) -> Option<T> {
        match self.rx.recv_timeout(timeout) {
            Ok(item) => Some(item),
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => None,
        }
    }

    /// Pops up to `limit` items that are available right now.
    pub fn drain(&self, limit: usize) -> Vec<T> {
        let mut items = Vec::with_capacity(limit.min(self.len()));
        while items.len() < limit {
            match self.rx.try_recv() {
                Ok(item) => items.push(item),
                Err(_) => break,
            }
        }
        items
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.rx.is_full()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl<T> Clone for BoundedQueue<T> {
    fn clone(&self) -> Self {
        self.share()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn rejects_zero_capacity() {
        assert!(matches!(
            BoundedQueue::<u32>::with_capacity(0),
            Err(QueueError::InvalidCapacity)
        ));
    }

    #[test]
    fn signals_queue_full() {
        let queue = BoundedQueue::with_capacity(2).unwrap();
        queue.try_push(1).unwrap();
        queue.try_push(2).unwrap();
        assert_eq!(queue.try_push(3), Err(QueueError::Full));
        assert!(queue.is_full());
    }

    #[test]
    fn maintains_fifo_order() {
        let queue = BoundedQueue::with_capacity(4).unwrap();
        queue.try_push(1).unwrap();
        queue.try_push(2).unwrap();
        assert_eq!(queue.try_pop(), Some(1));
        assert_eq!(queue.try_pop(), Some(2));
        assert_eq!(queue.try_pop(), None);
    }

    #[test]
    fn pop_timeout_returns_none_when_empty() {
        let queue = BoundedQueue::<u32>::with_capacity(1).unwrap();
        assert_eq!(queue.pop_timeout(Duration::from_millis(5)), None);
    }

    #[test]
    fn drain_respects_limit() {
        let queue = BoundedQueue::with_capacity(8).unwrap();
        for i in 0..5 {
            queue.try_push(i).unwrap();
        }
        assert_eq!(queue.drain(3), vec![0, 1, 2]);
        assert_eq!(queue.drain(10), vec![3, 4]);
        assert!(queue.drain(10).is_empty());
    }

    #[test]
    fn shared_handles_see_same_items() {
        let queue = BoundedQueue::with_capacity(64).unwrap();
        let producer = queue.share();
        let handle = thread::spawn(move || {
            for i in 0..32 {
                producer.try_push(i).unwrap();
            }
        });
        handle.join().unwrap();
        assert_eq!(queue.len(), 32);
        assert_eq!(queue.drain(64).len(), 32);
    }
}
