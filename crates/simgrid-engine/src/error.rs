//! Engine and probe error types.

use std::path::PathBuf;

use thiserror::Error;

pub type EngineResult<T> = Result<T, EngineError>;
pub type ProbeResult<T> = Result<T, ProbeError>;

/// Errors from invoking the simulation engine.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("failed to start engine {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("engine exited with {code:?}: {stderr}")]
    Failed { code: Option<i32>, stderr: String },

    #[error("io error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Core(#[from] simgrid_core::CoreError),
}

/// Errors from a memory probe.
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("probe run failed: {0}")]
    Engine(#[from] EngineError),

    #[error("engine diagnostics contain no `memory:` marker")]
    MarkerMissing,

    #[error("`memory:` marker followed by non-numeric value {0:?}")]
    InvalidValue(String),
}
