//! simgrid-scheduler: memory-aware admission of simulation jobs.
//!
//! Jobs are launched one at a time, in submission order, onto the device
//! with the most free memory. Each new worker first measures its own
//! footprint; the controller then holds the next launch until the device
//! has room for another job of that size.
//!
//! # Architecture
//!
//! ```text
//! SimulationManager
//!   ├── JobQueue (FIFO of submitted jobs)
//!   ├── SlotPool (at most N workers at once)
//!   ├── JobTracker (status per job, RunSummary)
//!   └── AdmissionController (one per run)
//!       ├── DeviceMonitor (free memory per device)
//!       ├── MemoryMailbox (footprint from the newest worker)
//!       └── Worker × N
//!           ├── MemoryProbe (zero-step dry run)
//!           └── Engine (the real run)
//! ```

pub mod controller;
pub mod error;
pub mod mailbox;
pub mod manager;
pub mod queue;
pub mod slots;
pub mod tracker;
mod worker;

pub use controller::AdmissionController;
pub use error::{SchedulerError, SchedulerResult};
pub use mailbox::{MailboxSender, MemoryMailbox, MemorySample, ProbeOutcome, memory_mailbox};
pub use manager::{RunHandle, RunOutcome, SimulationManager};
pub use queue::JobQueue;
pub use slots::{SlotPool, SlotToken};
pub use tracker::{JobRecord, JobStatus, JobTracker, RunSummary};
