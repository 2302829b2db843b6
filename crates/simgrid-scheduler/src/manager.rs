//! SimulationManager: the submission and run surface.
//!
//! Owns the queue, slot pool and tracker, and starts one
//! [`AdmissionController`] per run. `terminate_all` stops the controller
//! and every live worker; engine processes are killed with them.

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::info;

use simgrid_core::SimgridConfig;
use simgrid_core::config::SchedulerSettings;
use simgrid_core::{Job, JobId};
use simgrid_device::DeviceMonitor;
use simgrid_engine::{CommandEngine, Engine, MpsControl};

use crate::controller::AdmissionController;
use crate::error::{SchedulerError, SchedulerResult};
use crate::queue::JobQueue;
use crate::slots::SlotPool;
use crate::tracker::{JobTracker, RunSummary};

/// Result of [`SimulationManager::run`].
#[derive(Debug)]
pub enum RunOutcome {
    /// The run drained; here is how it went.
    Finished(RunSummary),
    /// The run continues in the background.
    Started(RunHandle),
}

/// Handle to a background run.
#[derive(Debug)]
pub struct RunHandle {
    task: JoinHandle<SchedulerResult<RunSummary>>,
}

impl RunHandle {
    /// Wait for the run to drain.
    pub async fn wait(self) -> SchedulerResult<RunSummary> {
        self.task
            .await
            .map_err(|e| SchedulerError::Controller(e.to_string()))?
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

/// Queues jobs and runs them across the device pool.
pub struct SimulationManager {
    queue: JobQueue,
    slots: SlotPool,
    tracker: JobTracker,
    monitor: DeviceMonitor,
    engine: Arc<dyn Engine>,
    settings: SchedulerSettings,
    shutdown: watch::Sender<bool>,
    running: Arc<AtomicBool>,
}

impl SimulationManager {
    pub fn new(settings: SchedulerSettings, monitor: DeviceMonitor, engine: Arc<dyn Engine>) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            queue: JobQueue::new(),
            slots: SlotPool::new(settings.slots),
            tracker: JobTracker::new(),
            monitor,
            engine,
            settings,
            shutdown,
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Build a manager with the `nvidia-smi` monitor and command engine
    /// described by `config`.
    pub fn from_config(config: &SimgridConfig) -> SchedulerResult<Self> {
        let settings = config.scheduler_settings()?;
        let monitor = DeviceMonitor::from_settings(&config.device_settings()?);
        let mut engine_settings = config.engine_settings();
        let mps = config.mps_settings();
        if mps.enabled {
            for (key, value) in MpsControl::from_settings(&mps).env() {
                engine_settings.env.entry(key).or_insert(value);
            }
        }
        let engine = CommandEngine::from_settings(&engine_settings);
        Ok(Self::new(settings, monitor, Arc::new(engine)))
    }

    /// Queue a job. Jobs launch in submission order.
    pub fn submit(&self, job: Job) -> JobId {
        let id = job.id;
        info!(job = %job, queued = self.queue.len() + 1, "job submitted");
        self.tracker.register(&job);
        self.queue.enqueue(job);
        id
    }

    /// Load the bundle in `dir` and queue it.
    pub fn submit_bundle(&self, dir: &Path) -> SchedulerResult<JobId> {
        Ok(self.submit(Job::load(dir)?))
    }

    /// Start admitting queued jobs.
    ///
    /// With `block_until_drained` the call returns once every job has
    /// finished; otherwise it returns a [`RunHandle`] immediately.
    pub async fn run(&self, block_until_drained: bool) -> SchedulerResult<RunOutcome> {
        let handle = self.spawn()?;
        if block_until_drained {
            Ok(RunOutcome::Finished(handle.wait().await?))
        } else {
            Ok(RunOutcome::Started(handle))
        }
    }

    /// Run until drained.
    pub async fn run_to_completion(&self) -> SchedulerResult<RunSummary> {
        self.spawn()?.wait().await
    }

    /// Start a controller task for the current queue.
    pub fn spawn(&self) -> SchedulerResult<RunHandle> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(SchedulerError::AlreadyRunning);
        }

        let controller = AdmissionController::new(
            self.queue.clone(),
            self.slots.clone(),
            self.monitor.clone(),
            self.engine.clone(),
            self.tracker.clone(),
            self.settings.clone(),
            self.shutdown.subscribe(),
        );
        let running = self.running.clone();
        let task = tokio::spawn(async move {
            let result = controller.run().await;
            running.store(false, Ordering::SeqCst);
            result
        });
        Ok(RunHandle { task })
    }

    /// Stop the controller and kill every running job. Final for this
    /// manager: later runs cancel immediately.
    pub fn terminate_all(&self) {
        info!(running = self.slots.outstanding(), queued = self.queue.len(), "terminating all jobs");
        self.shutdown.send_replace(true);
    }

    pub fn is_terminated(&self) -> bool {
        *self.shutdown.borrow()
    }

    pub fn tracker(&self) -> &JobTracker {
        &self.tracker
    }

    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    pub fn running(&self) -> usize {
        self.slots.outstanding()
    }

    pub fn settings(&self) -> &SchedulerSettings {
        &self.settings
    }
}
