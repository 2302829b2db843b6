//! Scheduler error types.

use thiserror::Error;

use simgrid_core::JobId;

/// Errors that can occur during scheduling operations.
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("device query failed: {0}")]
    Device(#[from] simgrid_device::DeviceError),

    #[error("job error: {0}")]
    Core(#[from] simgrid_core::CoreError),

    #[error("engine error: {0}")]
    Engine(#[from] simgrid_engine::EngineError),

    #[error("a run is already in progress")]
    AlreadyRunning,

    #[error("slot pool closed")]
    SlotPoolClosed,

    #[error("memory mailbox closed before job {0} reported")]
    MailboxClosed(JobId),

    #[error("controller task failed: {0}")]
    Controller(String),
}

pub type SchedulerResult<T> = Result<T, SchedulerError>;
