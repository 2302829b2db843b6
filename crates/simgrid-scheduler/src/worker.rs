//! Worker: one task per admitted job.
//!
//! A worker probes its own job, publishes the footprint to the controller,
//! runs the engine to completion and records the exit in the tracker.
//! Its [`ExitGuard`] guarantees the controller always receives a sample,
//! the tracker always sees a terminal status, and the slot is always
//! returned, even if the task panics or is aborted. The controller builds
//! the guard before spawning, so a task dropped before its first poll is
//! covered too.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::{error, info, warn};

use simgrid_core::{Job, JobId};
use simgrid_engine::{Engine, MemoryProbe, ProbeError};

use crate::mailbox::{MailboxSender, MemorySample};
use crate::slots::SlotToken;
use crate::tracker::{JobStatus, JobTracker};

/// Everything a worker needs besides its job and slot.
#[derive(Clone)]
pub(crate) struct WorkerContext {
    pub probe: MemoryProbe,
    pub engine: Arc<dyn Engine>,
    pub mailbox: MailboxSender,
    pub tracker: JobTracker,
    pub probe_attempts: u32,
    pub shutdown: watch::Receiver<bool>,
}

/// Publishes a fallback sample and status if the worker ends early.
pub(crate) struct ExitGuard {
    id: JobId,
    tracker: JobTracker,
    mailbox: Option<MailboxSender>,
    finished: bool,
    _slot: SlotToken,
}

impl ExitGuard {
    pub(crate) fn new(id: JobId, ctx: &WorkerContext, slot: SlotToken) -> Self {
        Self {
            id,
            tracker: ctx.tracker.clone(),
            mailbox: Some(ctx.mailbox.clone()),
            finished: false,
            _slot: slot,
        }
    }

    async fn publish(&mut self, sample: MemorySample) {
        if let Some(mailbox) = self.mailbox.take() {
            if let Err(e) = mailbox.publish(sample).await {
                warn!(job = %self.id, error = %e, "memory sample dropped");
            }
        }
    }

    fn finish(&mut self, status: JobStatus) {
        self.tracker.set_status(self.id, status);
        self.finished = true;
    }
}

impl Drop for ExitGuard {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        let (status, reason) = if std::thread::panicking() {
            error!(job = %self.id, "worker panicked");
            (JobStatus::Failed("worker panicked".to_string()), "worker panicked")
        } else {
            (JobStatus::Cancelled, "worker cancelled")
        };
        if let Some(mailbox) = self.mailbox.take() {
            mailbox.try_publish(MemorySample::failed(self.id, reason));
        }
        self.tracker.set_status(self.id, status);
        // `_slot` drops after this, so the status lands before the slot frees.
    }
}

/// Run one job to completion, or until shutdown.
pub(crate) async fn run(ctx: WorkerContext, mut job: Job, mut guard: ExitGuard) {
    let mut shutdown = ctx.shutdown.clone();

    tokio::select! {
        status = execute(&ctx, &mut job, &mut guard) => guard.finish(status),
        _ = wait_for_shutdown(&mut shutdown) => {
            info!(job = %job, "worker stopped by shutdown");
        }
    }
}

async fn execute(ctx: &WorkerContext, job: &mut Job, guard: &mut ExitGuard) -> JobStatus {
    let probed = probe_with_attempts(ctx, job).await;

    match probed {
        Ok(mib) => {
            ctx.tracker.record_memory(job.id, mib);
            guard.publish(MemorySample::measured(job.id, mib)).await;
        }
        Err(e) => {
            let reason = format!("memory probe failed: {e}");
            guard.publish(MemorySample::failed(job.id, reason.clone())).await;
            return JobStatus::Failed(reason);
        }
    }

    // The device assignment becomes part of the bundle's input.
    if let Err(e) = job.persist() {
        return JobStatus::Failed(format!("failed to persist job: {e}"));
    }

    ctx.tracker.set_status(job.id, JobStatus::Running);
    match ctx.engine.run(job).await {
        Ok(output) => {
            if let Err(e) = output.write_log(&job.dir) {
                warn!(job = %job, error = %e, "failed to write run log");
            }
            info!(job = %job, elapsed_secs = output.elapsed.as_secs_f64(), "job completed");
            JobStatus::Completed
        }
        Err(e) => {
            warn!(job = %job, error = %e, "job failed");
            JobStatus::Failed(e.to_string())
        }
    }
}

async fn probe_with_attempts(ctx: &WorkerContext, job: &mut Job) -> Result<f64, ProbeError> {
    let attempts = ctx.probe_attempts.max(1);
    let mut attempt = 1;
    loop {
        match ctx.probe.probe(job).await {
            Ok(mib) => return Ok(mib),
            Err(e) if attempt < attempts => {
                warn!(job = %job, attempt, error = %e, "memory probe failed, retrying");
                attempt += 1;
            }
            Err(e) => {
                warn!(job = %job, attempts, error = %e, "memory probe failed");
                return Err(e);
            }
        }
    }
}

/// Resolve once shutdown is signalled. Never resolves if the sender is gone.
pub(crate) async fn wait_for_shutdown(shutdown: &mut watch::Receiver<bool>) {
    if shutdown.wait_for(|stop| *stop).await.is_err() {
        std::future::pending::<()>().await;
    }
}
