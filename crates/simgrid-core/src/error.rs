//! Error types for SimGrid core operations.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors raised while loading config or reading/writing job bundles.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("missing {kind} file in {}", dir.display())]
    MissingFile { kind: &'static str, dir: PathBuf },

    #[error("bundle directory does not exist: {}", .0.display())]
    MissingBundle(PathBuf),

    #[error("invalid parameter {key}: {reason}")]
    InvalidParam { key: String, reason: String },

    #[error("invalid duration: {0}")]
    InvalidDuration(String),

    #[error("io error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("config parse error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl CoreError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        CoreError::Io {
            path: path.into(),
            source,
        }
    }
}
