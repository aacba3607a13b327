//! Bounded live-preview queue.
//!
//! One producer (the receive task) and any number of consumers. When
//! the queue is full the oldest frame is evicted, so the producer never
//! waits on a slow viewer.

use std::collections::VecDeque;
use std::time::Duration;

use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::Notify;

/// Capacity used when none is configured.
pub const DEFAULT_PREVIEW_CAPACITY: usize = 30;

#[derive(Debug)]
pub struct PreviewQueue {
    frames: Mutex<VecDeque<Bytes>>,
    capacity: usize,
    notify: Notify,
}

impl PreviewQueue {
    /// Create a queue holding at most `capacity` frames (minimum 1).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            frames: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
            notify: Notify::new(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.frames.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.lock().is_empty()
    }

    /// Offer a frame, evicting the oldest one if the queue is full.
    ///
    /// Returns the evicted frame, if any. Never blocks.
    pub fn push(&self, frame: Bytes) -> Option<Bytes> {
        let evicted = {
            let mut frames = self.frames.lock();
            let evicted = if frames.len() >= self.capacity {
                frames.pop_front()
            } else {
                None
            };
            frames.push_back(frame);
            evicted
        };
        self.notify.notify_one();
        evicted
    }

    /// Take the oldest frame without waiting.
    pub fn try_pop(&self) -> Option<Bytes> {
        self.frames.lock().pop_front()
    }

    /// Wait up to `timeout` for the next frame.
    ///
    /// `None` means nothing arrived in time; callers simply retry.
    pub async fn pop_timeout(&self, timeout: Duration) -> Option<Bytes> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let notified = self.notify.notified();
            if let Some(frame) = self.try_pop() {
                return Some(frame);
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return self.try_pop();
            }
        }
    }
}

impl Default for PreviewQueue {
    fn default() -> Self {
        Self::new(DEFAULT_PREVIEW_CAPACITY)
    }
}

// ── Tests ────────────────────────────────────────────────────────
