//! Control of the CUDA multi-process service daemon.
//!
//! With the daemon running, concurrent engine runs on one device share a
//! single context instead of time-slicing. Engines find the daemon through
//! the two directory variables in [`MpsControl::env`].

use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, info};

use simgrid_core::config::MpsSettings;

use crate::error::{EngineError, EngineResult};

pub const PIPE_DIR_VAR: &str = "CUDA_MPS_PIPE_DIRECTORY";
pub const LOG_DIR_VAR: &str = "CUDA_MPS_LOG_DIRECTORY";

/// Pause between stopping and starting the daemon on restart.
const RESTART_PAUSE: Duration = Duration::from_millis(500);

#[derive(Debug, Clone)]
pub struct MpsControl {
    program: String,
    args: Vec<String>,
    pipe_dir: PathBuf,
    log_dir: PathBuf,
}

impl MpsControl {
    pub fn new(program: impl Into<String>, pipe_dir: PathBuf, log_dir: PathBuf) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            pipe_dir,
            log_dir,
        }
    }

    /// Arguments placed before the daemon's own, for wrapper programs.
    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }

    pub fn from_settings(settings: &MpsSettings) -> Self {
        Self::new(
            settings.program.clone(),
            settings.pipe_dir.clone(),
            settings.log_dir.clone(),
        )
    }

    /// Variables an engine needs to reach this daemon.
    pub fn env(&self) -> HashMap<String, String> {
        HashMap::from([
            (PIPE_DIR_VAR.to_string(), self.pipe_dir.display().to_string()),
            (LOG_DIR_VAR.to_string(), self.log_dir.display().to_string()),
        ])
    }

    /// Create the pipe and log directories and start the daemon.
    pub async fn start(&self) -> EngineResult<()> {
        for dir in [&self.pipe_dir, &self.log_dir] {
            std::fs::create_dir_all(dir).map_err(|source| EngineError::Io {
                path: dir.clone(),
                source,
            })?;
        }

        let output = self
            .command()
            .arg("-d")
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|source| self.spawn_error(source))?;
        if !output.status.success() {
            return Err(EngineError::Failed {
                code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        info!(pipe_dir = %self.pipe_dir.display(), "mps daemon started");
        Ok(())
    }

    /// Ask a running daemon to quit.
    pub async fn stop(&self) -> EngineResult<()> {
        let mut child = self
            .command()
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| self.spawn_error(source))?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(b"quit\n")
                .await
                .map_err(|source| self.spawn_error(source))?;
        }

        let output = child
            .wait_with_output()
            .await
            .map_err(|source| self.spawn_error(source))?;
        if !output.status.success() {
            return Err(EngineError::Failed {
                code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        debug!(pipe_dir = %self.pipe_dir.display(), "mps daemon stopped");
        Ok(())
    }

    /// Stop the daemon, ignoring a failure to stop, then start it again.
    pub async fn restart(&self) -> EngineResult<()> {
        if let Err(e) = self.stop().await {
            debug!(error = %e, "mps daemon was not running");
        }
        tokio::time::sleep(RESTART_PAUSE).await;
        self.start().await
    }

    fn command(&self) -> Command {
        let mut command = Command::new(&self.program);
        command.args(&self.args).envs(self.env());
        command
    }

    fn spawn_error(&self, source: std::io::Error) -> EngineError {
        EngineError::Spawn {
            program: self.program.clone(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// A stand-in daemon controller that logs its invocations into the
    /// log directory it was pointed at.
    fn fake_control(root: &std::path::Path) -> MpsControl {
        let script = "if [ \"$1\" = \"-d\" ]; then echo start >> \"$CUDA_MPS_LOG_DIRECTORY/calls\"; \
                      else read cmd; echo \"$cmd\" >> \"$CUDA_MPS_LOG_DIRECTORY/calls\"; fi";
        MpsControl::new("sh", root.join("pipe"), root.join("log"))
            .with_args(vec!["-c".to_string(), script.to_string(), "mps-control".to_string()])
    }

    #[tokio::test]
    async fn start_creates_directories_and_daemonizes() {
        let dir = tempfile::tempdir().unwrap();
        let control = fake_control(dir.path());

        control.start().await.unwrap();
        assert!(dir.path().join("pipe").is_dir());
        let calls = std::fs::read_to_string(dir.path().join("log/calls")).unwrap();
        assert_eq!(calls, "start\n");
    }

    #[tokio::test]
    async fn restart_quits_then_starts() {
        let dir = tempfile::tempdir().unwrap();
        let control = fake_control(dir.path());

        control.start().await.unwrap();
        control.restart().await.unwrap();
        let calls = std::fs::read_to_string(dir.path().join("log/calls")).unwrap();
        assert_eq!(calls, "start\nquit\nstart\n");
    }

    #[test]
    fn env_points_at_both_directories() {
        let control = MpsControl::new("mps", PathBuf::from("/p"), PathBuf::from("/l"));
        let env = control.env();
        assert_eq!(env.get(PIPE_DIR_VAR).map(String::as_str), Some("/p"));
        assert_eq!(env.get(LOG_DIR_VAR).map(String::as_str), Some("/l"));
    }

    #[tokio::test]
    async fn missing_program_is_spawn_error() {
        let dir = tempfile::tempdir().unwrap();
        let control = MpsControl::new(
            "/nonexistent/mps-control",
            dir.path().join("pipe"),
            dir.path().join("log"),
        );
        assert!(matches!(control.start().await, Err(EngineError::Spawn { .. })));
    }
}
