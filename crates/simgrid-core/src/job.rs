//! The typed job record handed to the scheduler.
//!
//! Fields the scheduler reads or overrides (steps, device, output files)
//! are explicit; every other engine option rides along in `params`.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::bundle::Bundle;
use crate::error::CoreResult;
use crate::input::{
    INPUT_FILE, InputParams, KEY_DEVICE, KEY_ENERGY_FILE, KEY_LASTCONF_FILE, KEY_STEPS,
    KEY_TRAJECTORY_FILE, parse_count,
};

/// Unique identifier for a submitted job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(Uuid);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Short form used in logs and throwaway file names.
    pub fn short(&self) -> String {
        self.0.simple().to_string()[..8].to_string()
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One schedulable simulation.
#[derive(Debug, Clone, PartialEq)]
pub struct Job {
    pub id: JobId,
    pub name: String,
    /// Bundle directory; the engine runs with this as its working directory.
    pub dir: PathBuf,
    pub steps: u64,
    /// Device index assigned at admission.
    pub device: Option<usize>,
    /// Footprint reported by the last memory probe, in MiB.
    pub measured_memory_mib: Option<f64>,
    pub lastconf_file: String,
    pub trajectory_file: String,
    pub energy_file: String,
    /// Plain-text input file the engine is pointed at.
    pub input_file: String,
    /// Engine-specific passthrough options.
    pub params: InputParams,
}

impl Job {
    /// Load a job from a bundle directory.
    pub fn load(dir: impl Into<PathBuf>) -> CoreResult<Self> {
        let bundle = Bundle::open(dir)?;
        let input = bundle.input()?;
        Self::from_input(bundle.dir(), input)
    }

    /// Split a parameter map into typed fields and passthrough options.
    pub fn from_input(dir: &Path, mut input: InputParams) -> CoreResult<Self> {
        let steps = input.steps()?;
        input.remove(KEY_STEPS);

        let device = input.remove(KEY_DEVICE).and_then(|d| parse_count(&d)).map(|d| d as usize);
        let lastconf_file = input
            .remove(KEY_LASTCONF_FILE)
            .unwrap_or_else(|| "last_conf.dat".to_string());
        let trajectory_file = input
            .remove(KEY_TRAJECTORY_FILE)
            .unwrap_or_else(|| "trajectory.dat".to_string());
        let energy_file = input
            .remove(KEY_ENERGY_FILE)
            .unwrap_or_else(|| "energy.dat".to_string());

        let name = dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| dir.display().to_string());

        Ok(Self {
            id: JobId::new(),
            name,
            dir: dir.to_path_buf(),
            steps,
            device,
            measured_memory_mib: None,
            lastconf_file,
            trajectory_file,
            energy_file,
            input_file: INPUT_FILE.to_string(),
            params: input,
        })
    }

    /// The full parameter map the engine should see for this job.
    pub fn to_input(&self) -> InputParams {
        let mut input = self.params.clone();
        input.set(KEY_STEPS, self.steps.to_string());
        input.set(KEY_LASTCONF_FILE, self.lastconf_file.as_str());
        input.set(KEY_TRAJECTORY_FILE, self.trajectory_file.as_str());
        input.set(KEY_ENERGY_FILE, self.energy_file.as_str());
        if let Some(device) = self.device {
            input.set(KEY_DEVICE, device.to_string());
        }
        input
    }

    /// Persist the current parameters back into the bundle.
    pub fn persist(&self) -> CoreResult<()> {
        self.to_input().save(&self.dir)
    }

    pub fn input_path(&self) -> PathBuf {
        self.dir.join(&self.input_file)
    }
}

impl fmt::Display for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.id.short())
    }
}
