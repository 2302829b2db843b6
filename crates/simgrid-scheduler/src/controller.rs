//! Admission controller: the scheduling loop.
//!
//! ```text
//! while queue not empty:
//!     slot   = slots.acquire()          (back-pressure)
//!     job    = queue.dequeue()
//!     device = monitor.query()          (free, index)
//!     spawn worker(job on device, slot)
//!     sample = mailbox.receive()
//!     while free < safety_factor × sample:
//!         sleep headroom_interval; free = monitor.query()
//! wait until slots.outstanding() == 0
//! ```
//!
//! A launch therefore never follows a decision point at which free memory
//! was below `safety_factor` times the previous job's footprint. The job
//! stays on the device chosen at spawn; the headroom wait only gates the
//! next launch.

use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::{JoinError, JoinSet};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use simgrid_core::JobId;
use simgrid_core::config::SchedulerSettings;
use simgrid_device::DeviceMonitor;
use simgrid_engine::{Engine, MemoryProbe};

use crate::error::{SchedulerError, SchedulerResult};
use crate::mailbox::{MailboxSender, MemoryMailbox, ProbeOutcome, memory_mailbox};
use crate::queue::JobQueue;
use crate::slots::SlotPool;
use crate::tracker::{JobStatus, JobTracker, RunSummary};
use crate::worker::{self, ExitGuard, WorkerContext, wait_for_shutdown};

/// Drives jobs from the queue onto devices.
pub struct AdmissionController {
    queue: JobQueue,
    slots: SlotPool,
    monitor: DeviceMonitor,
    probe: MemoryProbe,
    engine: Arc<dyn Engine>,
    tracker: JobTracker,
    settings: SchedulerSettings,
    shutdown: watch::Receiver<bool>,
}

impl AdmissionController {
    pub fn new(
        queue: JobQueue,
        slots: SlotPool,
        monitor: DeviceMonitor,
        engine: Arc<dyn Engine>,
        tracker: JobTracker,
        settings: SchedulerSettings,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            queue,
            slots,
            monitor,
            probe: MemoryProbe::new(engine.clone()),
            engine,
            tracker,
            settings,
            shutdown,
        }
    }

    /// Admit every queued job, then wait for all workers to finish.
    ///
    /// A device query failure stops admission: jobs still queued are
    /// cancelled, jobs already running are allowed to finish, and the error
    /// is returned. A shutdown signal cancels everything and returns the
    /// summary as it stands.
    ///
    /// The summary covers the jobs this run dequeued or cancelled. Jobs
    /// submitted while it drains stay queued for the next run.
    pub async fn run(self) -> SchedulerResult<RunSummary> {
        let started = Instant::now();
        let (sender, mut mailbox) = memory_mailbox();
        let mut workers = JoinSet::new();
        let mut shutdown = self.shutdown.clone();
        let mut run_ids = Vec::new();

        info!(
            queued = self.queue.len(),
            slots = self.slots.capacity(),
            safety_factor = self.settings.safety_factor,
            "admission controller started"
        );

        let admitted = tokio::select! {
            result = self.admit_all(&sender, &mut mailbox, &mut workers, &mut run_ids) => Some(result),
            _ = wait_for_shutdown(&mut shutdown) => None,
        };

        let outcome = match admitted {
            Some(result) => {
                if let Err(e) = &result {
                    error!(error = %e, "admission stopped");
                    run_ids.extend(self.cancel_queued());
                }
                tokio::select! {
                    _ = self.drain() => {}
                    _ = wait_for_shutdown(&mut shutdown) => {}
                }
                result
            }
            None => Ok(()),
        };

        if *shutdown.borrow() {
            info!(running = self.slots.outstanding(), "shutdown requested, stopping workers");
            run_ids.extend(self.cancel_queued());
            workers.shutdown().await;
        }
        while let Some(joined) = workers.join_next().await {
            log_join_error(joined);
        }
        let stranded = self.tracker.cancel_unfinished(&run_ids);
        if stranded > 0 {
            warn!(stranded, "jobs left without a terminal status were cancelled");
        }

        outcome?;
        let summary = self.tracker.summary(&run_ids, started.elapsed());
        info!(
            completed = summary.completed,
            failed = summary.failed.len(),
            cancelled = summary.cancelled,
            elapsed_secs = summary.elapsed.as_secs_f64(),
            "all jobs finished"
        );
        Ok(summary)
    }

    async fn admit_all(
        &self,
        sender: &MailboxSender,
        mailbox: &mut MemoryMailbox,
        workers: &mut JoinSet<()>,
        run_ids: &mut Vec<JobId>,
    ) -> SchedulerResult<()> {
        let ctx = WorkerContext {
            probe: self.probe.clone(),
            engine: self.engine.clone(),
            mailbox: sender.clone(),
            tracker: self.tracker.clone(),
            probe_attempts: self.settings.probe_attempts,
            shutdown: self.shutdown.clone(),
        };

        while !self.queue.is_empty() {
            let slot = self.slots.acquire().await?;
            let Some(mut job) = self.queue.dequeue() else {
                break;
            };
            run_ids.push(job.id);

            let reading = match self.monitor.query().await {
                Ok(reading) => reading,
                Err(e) => {
                    self.tracker.set_status(job.id, JobStatus::Cancelled);
                    return Err(e.into());
                }
            };
            job.device = Some(reading.index);
            self.tracker.admit(job.id, reading.index);
            info!(
                job = %job,
                device = reading.index,
                free_mib = reading.free_mib,
                running = self.slots.outstanding(),
                "launching job"
            );

            let id = job.id;
            let guard = ExitGuard::new(id, &ctx, slot);
            workers.spawn(worker::run(ctx.clone(), job, guard));

            let sample = mailbox
                .receive()
                .await
                .ok_or(SchedulerError::MailboxClosed(id))?;
            if sample.job_id != id {
                warn!(expected = %id, got = %sample.job_id, "memory sample from unexpected job");
            }

            match sample.outcome {
                ProbeOutcome::Measured(mib) => self.wait_for_headroom(reading.free_mib, mib).await?,
                ProbeOutcome::Failed(reason) => {
                    debug!(job = %id, %reason, "no footprint, skipping headroom wait");
                }
            }

            while let Some(joined) = workers.try_join_next() {
                log_join_error(joined);
            }
        }
        Ok(())
    }

    /// Block until the monitor reports at least `safety_factor × footprint`.
    async fn wait_for_headroom(&self, mut free_mib: f64, footprint_mib: f64) -> SchedulerResult<()> {
        let needed = self.settings.safety_factor * footprint_mib;
        while free_mib < needed {
            debug!(
                free_mib,
                needed_mib = needed,
                interval_ms = self.settings.headroom_interval.as_millis() as u64,
                "waiting for device headroom"
            );
            tokio::time::sleep(self.settings.headroom_interval).await;
            free_mib = self.monitor.query().await?.free_mib;
        }
        Ok(())
    }

    /// Poll until every slot is back.
    async fn drain(&self) {
        loop {
            let outstanding = self.slots.outstanding();
            if outstanding == 0 {
                return;
            }
            debug!(outstanding, "waiting for running jobs");
            tokio::time::sleep(self.settings.drain_interval).await;
        }
    }

    /// Cancel every queued job, returning their ids.
    fn cancel_queued(&self) -> Vec<JobId> {
        self.queue
            .drain()
            .into_iter()
            .map(|job| {
                info!(job = %job, "cancelling queued job");
                self.tracker.set_status(job.id, JobStatus::Cancelled);
                job.id
            })
            .collect()
    }
}

fn log_join_error(joined: Result<(), JoinError>) {
    match joined {
        Err(e) if e.is_panic() => error!(error = %e, "worker task panicked"),
        _ => {}
    }
}
