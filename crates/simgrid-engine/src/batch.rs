//! Batch-system submission of a bundle's run script.

use std::path::Path;
use std::process::Stdio;

use tokio::process::Command;
use tracing::info;

use simgrid_core::bundle::RUN_FILE;

use crate::error::{EngineError, EngineResult};

/// Submit `run.sh` in `dir` with `program` (normally `sbatch`).
///
/// Returns the submitter's trimmed stdout, e.g. `Submitted batch job 42`.
pub async fn submit_run_file(dir: &Path, program: &str) -> EngineResult<String> {
    let script = dir.join(RUN_FILE);
    if !script.exists() {
        return Err(EngineError::Core(simgrid_core::CoreError::MissingFile {
            kind: "run file (run.sh)",
            dir: dir.to_path_buf(),
        }));
    }

    let output = Command::new(program)
        .arg(RUN_FILE)
        .current_dir(dir)
        .stdin(Stdio::null())
        .output()
        .await
        .map_err(|source| EngineError::Spawn {
            program: program.to_string(),
            source,
        })?;

    if !output.status.success() {
        return Err(EngineError::Failed {
            code: output.status.code(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }

    let reply = String::from_utf8_lossy(&output.stdout).trim().to_string();
    info!(dir = %dir.display(), %reply, "run file submitted");
    Ok(reply)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn submits_from_the_bundle_directory() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(RUN_FILE), "echo 'Submitted batch job 7'\n").unwrap();

        let reply = submit_run_file(dir.path(), "sh").await.unwrap();
        assert_eq!(reply, "Submitted batch job 7");
    }

    #[tokio::test]
    async fn missing_run_file_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            submit_run_file(dir.path(), "sh").await,
            Err(EngineError::Core(_))
        ));
    }

    #[tokio::test]
    async fn submitter_failure_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(RUN_FILE), "echo 'queue closed' >&2; exit 1\n").unwrap();
        match submit_run_file(dir.path(), "sh").await {
            Err(EngineError::Failed { code, stderr }) => {
                assert_eq!(code, Some(1));
                assert_eq!(stderr, "queue closed");
            }
            other => panic!("expected Failed, got {other:?}"),
        }
    }
}
