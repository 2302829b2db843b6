//! simgrid-engine: running jobs through the external simulation engine.
//!
//! - **`engine`**: the [`Engine`] seam and [`CommandEngine`], which runs the
//!   configured engine binary inside a job's bundle directory
//! - **`probe`**: the zero-step dry run that measures a job's device-memory
//!   footprint from the engine's `memory:` diagnostic
//! - **`mps`**: starting and restarting the multi-process service daemon
//! - **`batch`**: handing a bundle's run script to the batch system
//!
//! # Architecture
//!
//! ```text
//! MemoryProbe
//!   └── Engine (trait)
//!       └── CommandEngine → `<program> [args] <input file>` in job.dir
//! ```

pub mod batch;
pub mod engine;
pub mod error;
pub mod mps;
pub mod probe;

pub use batch::submit_run_file;
pub use engine::{CommandEngine, Engine, EngineOutput};
pub use error::{EngineError, EngineResult, ProbeError, ProbeResult};
pub use mps::MpsControl;
pub use probe::{MEMORY_MARKER, MemoryProbe, parse_memory};
