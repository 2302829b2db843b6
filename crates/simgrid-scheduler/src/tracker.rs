//! Job tracker: per-job status and the run summary built from it.
//!
//! Jobs themselves are owned by the queue and then by their worker; the
//! tracker keeps only what outlives a worker: status, device, measured
//! footprint and timestamps.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::Serialize;
use tracing::debug;

use simgrid_core::{Job, JobId};

/// Lifecycle of a submitted job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "reason", rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    /// Slot and device assigned, worker spawned.
    Admitted,
    /// Probe done, engine running.
    Running,
    Completed,
    Failed(String),
    Cancelled,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed(_) | Self::Cancelled)
    }
}

/// What the tracker knows about one job.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobRecord {
    pub id: JobId,
    pub name: String,
    pub status: JobStatus,
    pub device: Option<usize>,
    pub measured_memory_mib: Option<f64>,
    pub submitted_at: u64,
    pub started_at: Option<u64>,
    pub finished_at: Option<u64>,
}

/// Outcome of a drained run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunSummary {
    pub completed: usize,
    pub failed: Vec<(JobId, String)>,
    pub cancelled: usize,
    pub elapsed: Duration,
}

impl RunSummary {
    pub fn total(&self) -> usize {
        self.completed + self.failed.len() + self.cancelled
    }

    pub fn is_success(&self) -> bool {
        self.failed.is_empty() && self.cancelled == 0
    }
}

/// Shared status table, in submission order. Cloning shares the table.
#[derive(Debug, Clone, Default)]
pub struct JobTracker {
    records: Arc<Mutex<Vec<JobRecord>>>,
}

impl JobTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start tracking a job as `Queued`.
    pub fn register(&self, job: &Job) {
        self.lock().push(JobRecord {
            id: job.id,
            name: job.name.clone(),
            status: JobStatus::Queued,
            device: job.device,
            measured_memory_mib: None,
            submitted_at: epoch_secs(),
            started_at: None,
            finished_at: None,
        });
    }

    /// Record admission onto `device`.
    pub fn admit(&self, id: JobId, device: usize) {
        self.update(id, |record| {
            record.device = Some(device);
            record.status = JobStatus::Admitted;
        });
    }

    pub fn record_memory(&self, id: JobId, mib: f64) {
        self.update(id, |record| record.measured_memory_mib = Some(mib));
    }

    /// Move a job to `status`. Terminal statuses are final.
    pub fn set_status(&self, id: JobId, status: JobStatus) {
        self.update(id, |record| {
            if record.status.is_terminal() {
                return;
            }
            debug!(job = %id, from = ?record.status, to = ?status, "job status change");
            match status {
                JobStatus::Running => record.started_at = Some(epoch_secs()),
                ref s if s.is_terminal() => record.finished_at = Some(epoch_secs()),
                _ => {}
            }
            record.status = status;
        });
    }

    pub fn get(&self, id: JobId) -> Option<JobRecord> {
        self.lock().iter().find(|r| r.id == id).cloned()
    }

    pub fn status(&self, id: JobId) -> Option<JobStatus> {
        self.get(id).map(|r| r.status)
    }

    /// Every record, in submission order.
    pub fn records(&self) -> Vec<JobRecord> {
        self.lock().clone()
    }

    /// Summarise the terminal records among `ids`. Non-terminal jobs and
    /// jobs outside `ids` are not counted.
    pub fn summary(&self, ids: &[JobId], elapsed: Duration) -> RunSummary {
        let mut summary = RunSummary {
            elapsed,
            ..Default::default()
        };
        for record in self.lock().iter().filter(|r| ids.contains(&r.id)) {
            match &record.status {
                JobStatus::Completed => summary.completed += 1,
                JobStatus::Failed(reason) => summary.failed.push((record.id, reason.clone())),
                JobStatus::Cancelled => summary.cancelled += 1,
                _ => {}
            }
        }
        summary
    }

    /// Mark every non-terminal job among `ids` as cancelled.
    pub fn cancel_unfinished(&self, ids: &[JobId]) -> usize {
        let mut cancelled = 0;
        for record in self.lock().iter_mut() {
            if ids.contains(&record.id) && !record.status.is_terminal() {
                record.status = JobStatus::Cancelled;
                record.finished_at = Some(epoch_secs());
                cancelled += 1;
            }
        }
        cancelled
    }

    fn update(&self, id: JobId, f: impl FnOnce(&mut JobRecord)) {
        if let Some(record) = self.lock().iter_mut().find(|r| r.id == id) {
            f(record);
        }
    }

    fn lock(&self) -> MutexGuard<'_, Vec<JobRecord>> {
        self.records.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

#[cfg(test)]
mod tests {
    use super::*;
    use simgrid_core::InputParams;
    use std::path::Path;

    fn job(name: &str) -> Job {
        Job::from_input(&Path::new("/sims").join(name), InputParams::default()).unwrap()
    }

    #[test]
    fn lifecycle_updates_record() {
        let tracker = JobTracker::new();
        let j = job("a");
        tracker.register(&j);
        assert_eq!(tracker.status(j.id), Some(JobStatus::Queued));

        tracker.admit(j.id, 1);
        tracker.record_memory(j.id, 512.0);
        tracker.set_status(j.id, JobStatus::Running);
        tracker.set_status(j.id, JobStatus::Completed);

        let record = tracker.get(j.id).unwrap();
        assert_eq!(record.status, JobStatus::Completed);
        assert_eq!(record.device, Some(1));
        assert_eq!(record.measured_memory_mib, Some(512.0));
        assert!(record.started_at.is_some());
        assert!(record.finished_at.is_some());
    }

    #[test]
    fn terminal_status_is_final() {
        let tracker = JobTracker::new();
        let j = job("a");
        tracker.register(&j);
        tracker.set_status(j.id, JobStatus::Failed("probe failed".into()));
        tracker.set_status(j.id, JobStatus::Cancelled);
        assert_eq!(
            tracker.status(j.id),
            Some(JobStatus::Failed("probe failed".into()))
        );
    }

    #[test]
    fn summary_counts_terminal_jobs() {
        let tracker = JobTracker::new();
        let jobs: Vec<_> = ["a", "b", "c", "d"].into_iter().map(job).collect();
        for j in &jobs {
            tracker.register(j);
        }
        tracker.set_status(jobs[0].id, JobStatus::Completed);
        tracker.set_status(jobs[1].id, JobStatus::Failed("boom".into()));
        tracker.set_status(jobs[2].id, JobStatus::Cancelled);

        let ids: Vec<_> = jobs.iter().map(|j| j.id).collect();
        let summary = tracker.summary(&ids, Duration::from_secs(3));
        assert_eq!(summary.completed, 1);
        assert_eq!(summary.failed, vec![(jobs[1].id, "boom".to_string())]);
        assert_eq!(summary.cancelled, 1);
        assert_eq!(summary.total(), 3);
        assert!(!summary.is_success());

        let names: Vec<_> = tracker.records().into_iter().map(|r| r.name).collect();
        assert_eq!(names, ["a", "b", "c", "d"]);

        let only_first = tracker.summary(&ids[..1], Duration::ZERO);
        assert_eq!(only_first.completed, 1);
        assert_eq!(only_first.total(), 1);
    }

    #[test]
    fn cancel_unfinished_leaves_terminal_jobs_alone() {
        let tracker = JobTracker::new();
        let jobs: Vec<_> = ["a", "b", "c"].into_iter().map(job).collect();
        for j in &jobs {
            tracker.register(j);
        }
        tracker.set_status(jobs[0].id, JobStatus::Completed);
        tracker.admit(jobs[1].id, 0);

        let ids: Vec<_> = jobs[..2].iter().map(|j| j.id).collect();
        assert_eq!(tracker.cancel_unfinished(&ids), 1);
        assert_eq!(tracker.status(jobs[0].id), Some(JobStatus::Completed));
        assert_eq!(tracker.status(jobs[1].id), Some(JobStatus::Cancelled));
        assert!(tracker.get(jobs[1].id).unwrap().finished_at.is_some());
        assert_eq!(tracker.status(jobs[2].id), Some(JobStatus::Queued));
    }

    #[test]
    fn status_serializes_with_reason() {
        let json = serde_json::to_string(&JobStatus::Failed("oom".into())).unwrap();
        assert_eq!(json, r#"{"status":"failed","reason":"oom"}"#);
        let json = serde_json::to_string(&JobStatus::Completed).unwrap();
        assert_eq!(json, r#"{"status":"completed"}"#);
    }
}
