//! Memory mailbox: single-slot handoff of probe results from a freshly
//! launched worker back to the admission controller.

use serde::Serialize;
use tokio::sync::mpsc;

use simgrid_core::JobId;

use crate::error::{SchedulerError, SchedulerResult};

/// What a worker's memory probe produced.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum ProbeOutcome {
    /// Device footprint in MiB.
    Measured(f64),
    Failed(String),
}

/// One probe result, published exactly once per launched job.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MemorySample {
    pub job_id: JobId,
    pub outcome: ProbeOutcome,
}

impl MemorySample {
    pub fn measured(job_id: JobId, mib: f64) -> Self {
        Self {
            job_id,
            outcome: ProbeOutcome::Measured(mib),
        }
    }

    pub fn failed(job_id: JobId, reason: impl Into<String>) -> Self {
        Self {
            job_id,
            outcome: ProbeOutcome::Failed(reason.into()),
        }
    }
}

/// Create a connected publisher / receiver pair with room for one sample.
pub fn memory_mailbox() -> (MailboxSender, MemoryMailbox) {
    let (tx, rx) = mpsc::channel(1);
    (MailboxSender { tx }, MemoryMailbox { rx })
}

/// Publishing half, cloned into every worker.
#[derive(Debug, Clone)]
pub struct MailboxSender {
    tx: mpsc::Sender<MemorySample>,
}

impl MailboxSender {
    /// Publish a sample, waiting while a previous one is unconsumed.
    pub async fn publish(&self, sample: MemorySample) -> SchedulerResult<()> {
        let job_id = sample.job_id;
        self.tx
            .send(sample)
            .await
            .map_err(|_| SchedulerError::MailboxClosed(job_id))
    }

    /// Publish without waiting. Used from drop paths where awaiting is
    /// impossible; returns `false` if the sample could not be placed.
    pub fn try_publish(&self, sample: MemorySample) -> bool {
        self.tx.try_send(sample).is_ok()
    }
}

/// Receiving half, owned by the admission controller.
#[derive(Debug)]
pub struct MemoryMailbox {
    rx: mpsc::Receiver<MemorySample>,
}

impl MemoryMailbox {
    /// Wait for the next sample. `None` once every publisher is gone.
    pub async fn receive(&mut self) -> Option<MemorySample> {
        self.rx.recv().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn sample_round_trip() {
        let (tx, mut rx) = memory_mailbox();
        let id = JobId::new();
        tx.publish(MemorySample::measured(id, 1000.0)).await.unwrap();

        let sample = rx.receive().await.unwrap();
        assert_eq!(sample.job_id, id);
        assert_eq!(sample.outcome, ProbeOutcome::Measured(1000.0));
    }

    #[tokio::test(start_paused = true)]
    async fn second_publish_waits_for_consumption() {
        let (tx, mut rx) = memory_mailbox();
        tx.publish(MemorySample::measured(JobId::new(), 1.0)).await.unwrap();
        assert!(!tx.try_publish(MemorySample::measured(JobId::new(), 2.0)));

        let blocked = {
            let tx = tx.clone();
            tokio::spawn(async move { tx.publish(MemorySample::failed(JobId::new(), "x")).await })
        };
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(!blocked.is_finished());

        rx.receive().await.unwrap();
        blocked.await.unwrap().unwrap();
        assert!(matches!(
            rx.receive().await.unwrap().outcome,
            ProbeOutcome::Failed(_)
        ));
    }

    #[tokio::test]
    async fn receive_reports_closure() {
        let (tx, mut rx) = memory_mailbox();
        drop(tx);
        assert!(rx.receive().await.is_none());
    }

    #[tokio::test]
    async fn publish_to_dropped_receiver_fails() {
        let (tx, rx) = memory_mailbox();
        drop(rx);
        let id = JobId::new();
        assert!(matches!(
            tx.publish(MemorySample::measured(id, 1.0)).await,
            Err(SchedulerError::MailboxClosed(got)) if got == id
        ));
    }
}
