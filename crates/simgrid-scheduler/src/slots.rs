//! Slot pool: bounds how many workers run at once.
//!
//! A [`SlotToken`] wraps an owned semaphore permit. Dropping the token
//! returns the slot, so a worker that finishes, fails, panics or is
//! aborted always gives its capacity back.

use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::error::{SchedulerError, SchedulerResult};

/// Bounded counting gate of fixed capacity.
#[derive(Debug, Clone)]
pub struct SlotPool {
    semaphore: Arc<Semaphore>,
    capacity: usize,
}

/// One unit of pool capacity, held for the lifetime of a worker.
#[derive(Debug)]
pub struct SlotToken {
    _permit: OwnedSemaphorePermit,
}

impl SlotToken {
    /// Give the slot back. Equivalent to dropping the token.
    pub fn release(self) {}
}

impl SlotPool {
    /// Create a pool with `capacity` slots (at least one).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(capacity)),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Wait for a free slot.
    pub async fn acquire(&self) -> SchedulerResult<SlotToken> {
        let permit = self
            .semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| SchedulerError::SlotPoolClosed)?;
        Ok(SlotToken { _permit: permit })
    }

    /// Take a slot only if one is free right now.
    pub fn try_acquire(&self) -> Option<SlotToken> {
        self.semaphore
            .clone()
            .try_acquire_owned()
            .ok()
            .map(|permit| SlotToken { _permit: permit })
    }

    /// Number of slots currently held.
    pub fn outstanding(&self) -> usize {
        self.capacity - self.semaphore.available_permits()
    }
}
