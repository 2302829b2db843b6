//! FIFO job queue shared between submitters and the admission controller.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use simgrid_core::Job;

/// Unbounded FIFO of submitted jobs. Cloning shares the same queue.
#[derive(Debug, Clone, Default)]
pub struct JobQueue {
    jobs: Arc<Mutex<VecDeque<Job>>>,
}

impl JobQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a job. Never blocks.
    pub fn enqueue(&self, job: Job) {
        self.lock().push_back(job);
    }

    /// Remove the oldest job, if any.
    pub fn dequeue(&self) -> Option<Job> {
        self.lock().pop_front()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Take every queued job, oldest first.
    pub fn drain(&self) -> Vec<Job> {
        self.lock().drain(..).collect()
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<Job>> {
        // Queue operations cannot leave the deque half-modified.
        self.jobs.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
