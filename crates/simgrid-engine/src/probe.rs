//! Memory probe: a zero-step dry run that measures device footprint.
//!
//! The probe temporarily points the job at throwaway output files and a
//! throwaway input file, runs zero steps, reads the `memory:` diagnostic,
//! then restores the job and removes everything it wrote. The bundle's
//! persisted input and real outputs are never touched.

use std::path::PathBuf;
use std::sync::Arc;

use tracing::{debug, info, warn};

use simgrid_core::Job;

use crate::engine::Engine;
use crate::error::{ProbeError, ProbeResult};

/// Token the engine prints before its memory usage.
pub const MEMORY_MARKER: &str = "memory:";

/// Extract the value following [`MEMORY_MARKER`] in `text`.
pub fn parse_memory(text: &str) -> ProbeResult<f64> {
    let mut tokens = text.split_whitespace();
    tokens
        .find(|t| *t == MEMORY_MARKER)
        .ok_or(ProbeError::MarkerMissing)?;
    let raw = tokens.next().unwrap_or_default();
    raw.parse::<f64>()
        .ok()
        .filter(|v| v.is_finite() && *v >= 0.0)
        .ok_or_else(|| ProbeError::InvalidValue(raw.to_string()))
}

/// Run parameters the probe overrides, saved for restoration.
struct SavedParams {
    steps: u64,
    lastconf_file: String,
    trajectory_file: String,
    energy_file: String,
    input_file: String,
}

impl SavedParams {
    fn capture(job: &Job) -> Self {
        Self {
            steps: job.steps,
            lastconf_file: job.lastconf_file.clone(),
            trajectory_file: job.trajectory_file.clone(),
            energy_file: job.energy_file.clone(),
            input_file: job.input_file.clone(),
        }
    }

    fn restore(self, job: &mut Job) {
        job.steps = self.steps;
        job.lastconf_file = self.lastconf_file;
        job.trajectory_file = self.trajectory_file;
        job.energy_file = self.energy_file;
        job.input_file = self.input_file;
    }
}

/// Files the dry run may write. Removed on drop, so a cancelled dry run
/// cleans up as well as a finished one.
struct Throwaway(Vec<PathBuf>);

impl Drop for Throwaway {
    fn drop(&mut self) {
        for path in &self.0 {
            match std::fs::remove_file(path) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => warn!(path = %path.display(), error = %e, "failed to remove probe artifact"),
            }
        }
    }
}

/// Measures a job's device-memory footprint through an [`Engine`].
#[derive(Clone)]
pub struct MemoryProbe {
    engine: Arc<dyn Engine>,
}

impl MemoryProbe {
    pub fn new(engine: Arc<dyn Engine>) -> Self {
        Self { engine }
    }

    /// Probe `job` and record the footprint (MiB) in `job.measured_memory_mib`.
    ///
    /// `job` is restored to its original run parameters whether or not the
    /// probe succeeds.
    pub async fn probe(&self, job: &mut Job) -> ProbeResult<f64> {
        let saved = SavedParams::capture(job);
        let tag = format!("probe_{}", job.id.short());

        job.steps = 0;
        job.lastconf_file = format!("{tag}_last_conf.dat");
        job.trajectory_file = format!("{tag}_trajectory.dat");
        job.energy_file = format!("{tag}_energy.dat");
        job.input_file = format!("{tag}.input");

        let throwaway = Throwaway(
            [
                &job.lastconf_file,
                &job.trajectory_file,
                &job.energy_file,
                &job.input_file,
            ]
            .into_iter()
            .map(|name| job.dir.join(name))
            .collect(),
        );

        debug!(job = %job, device = ?job.device, "probing memory footprint");
        let outcome = self.engine.run(job).await;

        saved.restore(job);
        drop(throwaway);

        let output = outcome?;
        let mib = match parse_memory(&output.stderr) {
            Err(ProbeError::MarkerMissing) => parse_memory(&output.stdout),
            other => other,
        }?;

        job.measured_memory_mib = Some(mib);
        info!(job = %job, memory_mib = mib, "memory probe complete");
        Ok(mib)
    }
}
