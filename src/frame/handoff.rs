//! 所有权移交 (handoff 策略)
//! Single pending frame: the producer hands over an owned buffer, the consumer
//! takes it, draws it once and drops it. A newer frame replaces (and frees) an
//! undrawn one.

use std::sync::{Mutex, PoisonError};

use super::PublishOutcome;

pub struct HandoffSlot {
    pending: Mutex<Option<Vec<u8>>>,
    capacity: usize,
}

impl HandoffSlot {
    pub fn new(capacity: usize) -> Self {
        Self {
            pending: Mutex::new(None),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn publish(&self, mut frame: Vec<u8>) -> PublishOutcome {
        if frame.is_empty() {
            return PublishOutcome::Empty;
        }
        let truncated = frame.len() > self.capacity;
        frame.truncate(self.capacity);
        let len = frame.len();

        let stale = self
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(frame);
        // 旧帧在锁外释放
        drop(stale);

        PublishOutcome::Published { len, truncated }
    }

    pub fn take(&self) -> Option<Vec<u8>> {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }
}
