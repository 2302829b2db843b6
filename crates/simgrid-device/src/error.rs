//! Device query error types.

use thiserror::Error;

pub type DeviceResult<T> = Result<T, DeviceError>;

/// Failures of the external free-memory query. All of them are fatal to
/// the admission loop.
#[derive(Debug, Error)]
pub enum DeviceError {
    #[error("failed to run {command}: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("command {command} exited with {code:?}: {output}")]
    CommandFailed {
        command: String,
        code: Option<i32>,
        output: String,
    },

    #[error("unparsable device line {line:?}")]
    Parse { line: String },

    #[error("no devices reported")]
    NoDevices,

    #[error("device {0} not present in reading")]
    UnknownDevice(usize),
}
