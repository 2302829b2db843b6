//! Engine invocation.
//!
//! The engine is an external program. Each run renders the job's
//! parameters into `job.input_file`, starts the program in the bundle
//! directory with that file as its last argument, and waits for it.

use std::collections::HashMap;
use std::path::Path;
use std::process::Stdio;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info, warn};

use simgrid_core::Job;
use simgrid_core::bundle::LOG_FILE;
use simgrid_core::config::EngineSettings;

use crate::error::{EngineError, EngineResult};

/// Captured result of a successful engine run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EngineOutput {
    pub stdout: String,
    pub stderr: String,
    pub elapsed: Duration,
}

impl EngineOutput {
    /// Write captured output and run time to `log.log` in `dir`.
    pub fn write_log(&self, dir: &Path) -> EngineResult<()> {
        let path = dir.join(LOG_FILE);
        let body = format!(
            "{}{}Run time: {:.3}\n",
            self.stdout,
            self.stderr,
            self.elapsed.as_secs_f64()
        );
        std::fs::write(&path, body).map_err(|source| EngineError::Io { path, source })
    }
}

/// Runs a job to completion (or for `job.steps` steps).
#[async_trait]
pub trait Engine: Send + Sync {
    async fn run(&self, job: &Job) -> EngineResult<EngineOutput>;
}

/// Engine backed by an external executable.
///
/// The child is killed if the run future is dropped, so cancelling a
/// worker also stops its simulation.
#[derive(Debug, Clone)]
pub struct CommandEngine {
    program: String,
    args: Vec<String>,
    env: HashMap<String, String>,
}

impl CommandEngine {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: HashMap::new(),
        }
    }

    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }

    pub fn with_env(mut self, env: HashMap<String, String>) -> Self {
        self.env = env;
        self
    }

    pub fn from_settings(settings: &EngineSettings) -> Self {
        Self::new(settings.program.clone())
            .with_args(settings.args.clone())
            .with_env(settings.env.clone())
    }

    pub fn program(&self) -> &str {
        &self.program
    }
}

#[async_trait]
impl Engine for CommandEngine {
    async fn run(&self, job: &Job) -> EngineResult<EngineOutput> {
        let input_path = job.input_path();
        std::fs::write(&input_path, job.to_input().to_plain_text()).map_err(|source| {
            EngineError::Io {
                path: input_path.clone(),
                source,
            }
        })?;

        debug!(
            job = %job,
            program = %self.program,
            steps = job.steps,
            device = ?job.device,
            input = %job.input_file,
            "starting engine"
        );

        let started = Instant::now();
        let output = Command::new(&self.program)
            .args(&self.args)
            .arg(&job.input_file)
            .current_dir(&job.dir)
            .envs(&self.env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|source| EngineError::Spawn {
                program: self.program.clone(),
                source,
            })?;
        let elapsed = started.elapsed();

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();

        if !output.status.success() {
            warn!(job = %job, code = ?output.status.code(), "engine run failed");
            return Err(EngineError::Failed {
                code: output.status.code(),
                stderr: tail(&stderr, 20),
            });
        }

        info!(job = %job, elapsed_secs = elapsed.as_secs_f64(), "engine run finished");
        Ok(EngineOutput {
            stdout,
            stderr,
            elapsed,
        })
    }
}

/// Last `n` lines of `text`.
fn tail(text: &str, n: usize) -> String {
    let lines: Vec<&str> = text.lines().collect();
    lines[lines.len().saturating_sub(n)..].join("\n")
}
