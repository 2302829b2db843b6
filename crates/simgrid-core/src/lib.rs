//! simgrid-core: shared types for the SimGrid job orchestrator.
//!
//! - **`config`**: `simgrid.toml` parsing (scheduler, devices, engine)
//! - **`job`**: the typed `Job` record handed to the scheduler
//! - **`input`**: engine parameter map persisted as `input` + `input.json`
//! - **`bundle`**: on-disk job bundles (discovery, building, descriptors)
//! - **`descriptors`**: external forces and observables

pub mod bundle;
pub mod config;
pub mod descriptors;
pub mod error;
pub mod input;
pub mod job;

pub use bundle::{Bundle, BundleBuilder, SimFiles};
pub use config::SimgridConfig;
pub use descriptors::{Force, Observable, ObservableColumn};
pub use error::{CoreError, CoreResult};
pub use input::InputParams;
pub use job::{Job, JobId};
