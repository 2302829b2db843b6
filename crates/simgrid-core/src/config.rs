//! simgrid.toml configuration parser.
//!
//! Every table and field is optional. The `*_settings` methods on
//! [`SimgridConfig`] resolve the raw file into concrete values with
//! defaults applied.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{CoreError, CoreResult};

/// CPUs held back from the worker pool for the controller and the OS.
pub const RESERVED_CPUS: usize = 2;
pub const DEFAULT_SAFETY_FACTOR: f64 = 3.0;
pub const DEFAULT_HEADROOM_INTERVAL: Duration = Duration::from_secs(5);
pub const DEFAULT_DRAIN_INTERVAL: Duration = Duration::from_secs(1);
pub const DEFAULT_DEVICE_COMMAND: &str = "nvidia-smi";
pub const DEFAULT_DEVICE_ARGS: [&str; 2] = ["--query-gpu=memory.free", "--format=csv"];
pub const DEFAULT_ENGINE_PROGRAM: &str = "oxDNA";
pub const DEFAULT_BATCH_PROGRAM: &str = "sbatch";
pub const DEFAULT_MPS_PROGRAM: &str = "nvidia-cuda-mps-control";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SimgridConfig {
    pub scheduler: Option<SchedulerConfig>,
    pub devices: Option<DevicesConfig>,
    pub engine: Option<EngineConfig>,
    pub mps: Option<MpsConfig>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Concurrent worker slots. Defaults to CPU parallelism minus a reserve.
    pub slots: Option<usize>,
    /// Free memory must be at least `safety_factor` × the probed footprint.
    pub safety_factor: Option<f64>,
    pub headroom_interval: Option<String>,
    pub drain_interval: Option<String>,
    pub probe_attempts: Option<u32>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DevicesConfig {
    pub command: Option<String>,
    pub args: Option<Vec<String>>,
    /// "most_free" (default) or "pinned".
    pub selection: Option<String>,
    /// Device index used by the "pinned" selection.
    pub device: Option<usize>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    pub program: Option<String>,
    pub args: Option<Vec<String>>,
    pub env: Option<HashMap<String, String>>,
    /// Batch submitter used by `simgrid submit`.
    pub batch_program: Option<String>,
}

/// Multi-process service daemon shared by concurrent engine runs.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MpsConfig {
    /// Start the daemon before a run and point engines at it.
    pub enabled: Option<bool>,
    pub program: Option<String>,
    pub pipe_dir: Option<PathBuf>,
    pub log_dir: Option<PathBuf>,
}

/// Resolved scheduler parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct SchedulerSettings {
    pub slots: usize,
    pub safety_factor: f64,
    pub headroom_interval: Duration,
    pub drain_interval: Duration,
    pub probe_attempts: u32,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            slots: default_slots(),
            safety_factor: DEFAULT_SAFETY_FACTOR,
            headroom_interval: DEFAULT_HEADROOM_INTERVAL,
            drain_interval: DEFAULT_DRAIN_INTERVAL,
            probe_attempts: 1,
        }
    }
}

/// How the device monitor picks a device from a reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Selection {
    MostFree,
    Pinned(usize),
}

/// Resolved device query parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceSettings {
    pub command: String,
    pub args: Vec<String>,
    pub selection: Selection,
}

impl Default for DeviceSettings {
    fn default() -> Self {
        Self {
            command: DEFAULT_DEVICE_COMMAND.to_string(),
            args: DEFAULT_DEVICE_ARGS.iter().map(|s| s.to_string()).collect(),
            selection: Selection::MostFree,
        }
    }
}

/// Resolved engine invocation parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineSettings {
    pub program: String,
    pub args: Vec<String>,
    pub env: HashMap<String, String>,
    pub batch_program: String,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            program: DEFAULT_ENGINE_PROGRAM.to_string(),
            args: Vec::new(),
            env: HashMap::new(),
            batch_program: DEFAULT_BATCH_PROGRAM.to_string(),
        }
    }
}

/// Resolved daemon parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct MpsSettings {
    pub enabled: bool,
    pub program: String,
    pub pipe_dir: PathBuf,
    pub log_dir: PathBuf,
}

impl Default for MpsSettings {
    fn default() -> Self {
        let tag = mps_tag();
        Self {
            enabled: false,
            program: DEFAULT_MPS_PROGRAM.to_string(),
            pipe_dir: std::env::temp_dir().join(format!("mps-pipe_{tag}")),
            log_dir: std::env::temp_dir().join(format!("mps-log_{tag}")),
        }
    }
}

/// The batch allocation's task id when inside one, else this process id.
fn mps_tag() -> String {
    std::env::var("SLURM_TASK_PID").unwrap_or_else(|_| std::process::id().to_string())
}

impl SimgridConfig {
    pub fn from_file(path: &Path) -> CoreResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| CoreError::io(path, e))?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> CoreResult<Self> {
        Ok(toml::from_str(content)?)
    }

    pub fn to_toml_string(&self) -> CoreResult<String> {
        toml::to_string_pretty(self).map_err(|e| CoreError::InvalidParam {
            key: "config".to_string(),
            reason: e.to_string(),
        })
    }

    pub fn scheduler_settings(&self) -> CoreResult<SchedulerSettings> {
        let defaults = SchedulerSettings::default();
        let Some(raw) = &self.scheduler else {
            return Ok(defaults);
        };

        let slots = raw.slots.unwrap_or(defaults.slots);
        if slots == 0 {
            return Err(CoreError::InvalidParam {
                key: "scheduler.slots".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }

        let safety_factor = raw.safety_factor.unwrap_or(defaults.safety_factor);
        if !safety_factor.is_finite() || safety_factor <= 0.0 {
            return Err(CoreError::InvalidParam {
                key: "scheduler.safety_factor".to_string(),
                reason: format!("must be a positive number, got {safety_factor}"),
            });
        }

        Ok(SchedulerSettings {
            slots,
            safety_factor,
            headroom_interval: raw
                .headroom_interval
                .as_deref()
                .map(parse_duration)
                .transpose()?
                .unwrap_or(defaults.headroom_interval),
            drain_interval: raw
                .drain_interval
                .as_deref()
                .map(parse_duration)
                .transpose()?
                .unwrap_or(defaults.drain_interval),
            probe_attempts: raw.probe_attempts.unwrap_or(defaults.probe_attempts).max(1),
        })
    }

    pub fn device_settings(&self) -> CoreResult<DeviceSettings> {
        let defaults = DeviceSettings::default();
        let Some(raw) = &self.devices else {
            return Ok(defaults);
        };

        let selection = match raw.selection.as_deref() {
            None | Some("most_free") => Selection::MostFree,
            Some("pinned") => {
                let device = raw.device.ok_or_else(|| CoreError::InvalidParam {
                    key: "devices.device".to_string(),
                    reason: "required when selection = \"pinned\"".to_string(),
                })?;
                Selection::Pinned(device)
            }
            Some(other) => {
                return Err(CoreError::InvalidParam {
                    key: "devices.selection".to_string(),
                    reason: format!("unknown strategy {other:?}"),
                });
            }
        };

        Ok(DeviceSettings {
            command: raw.command.clone().unwrap_or(defaults.command),
            args: raw.args.clone().unwrap_or(defaults.args),
            selection,
        })
    }

    pub fn engine_settings(&self) -> EngineSettings {
        let defaults = EngineSettings::default();
        let Some(raw) = &self.engine else {
            return defaults;
        };
        EngineSettings {
            program: raw.program.clone().unwrap_or(defaults.program),
            args: raw.args.clone().unwrap_or(defaults.args),
            env: raw.env.clone().unwrap_or(defaults.env),
            batch_program: raw.batch_program.clone().unwrap_or(defaults.batch_program),
        }
    }

    pub fn mps_settings(&self) -> MpsSettings {
        let defaults = MpsSettings::default();
        let Some(raw) = &self.mps else {
            return defaults;
        };
        MpsSettings {
            enabled: raw.enabled.unwrap_or(defaults.enabled),
            program: raw.program.clone().unwrap_or(defaults.program),
            pipe_dir: raw.pipe_dir.clone().unwrap_or(defaults.pipe_dir),
            log_dir: raw.log_dir.clone().unwrap_or(defaults.log_dir),
        }
    }

    /// Scaffold a simgrid.toml with every default spelled out.
    pub fn scaffold() -> Self {
        SimgridConfig {
            scheduler: Some(SchedulerConfig {
                slots: Some(default_slots()),
                safety_factor: Some(DEFAULT_SAFETY_FACTOR),
                headroom_interval: Some("5s".to_string()),
                drain_interval: Some("1s".to_string()),
                probe_attempts: Some(1),
            }),
            devices: Some(DevicesConfig {
                command: Some(DEFAULT_DEVICE_COMMAND.to_string()),
                args: Some(DEFAULT_DEVICE_ARGS.iter().map(|s| s.to_string()).collect()),
                selection: Some("most_free".to_string()),
                device: None,
            }),
            engine: Some(EngineConfig {
                program: Some(DEFAULT_ENGINE_PROGRAM.to_string()),
                args: None,
                env: None,
                batch_program: Some(DEFAULT_BATCH_PROGRAM.to_string()),
            }),
            mps: Some(MpsConfig {
                enabled: Some(false),
                program: Some(DEFAULT_MPS_PROGRAM.to_string()),
                pipe_dir: None,
                log_dir: None,
            }),
        }
    }
}

/// Available CPU parallelism minus [`RESERVED_CPUS`], never below one.
pub fn default_slots() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
        .saturating_sub(RESERVED_CPUS)
        .max(1)
}

/// Parse "500ms", "5s", "2m" or a bare number of seconds.
pub fn parse_duration(s: &str) -> CoreResult<Duration> {
    let s = s.trim();
    let invalid = || CoreError::InvalidDuration(s.to_string());

    if let Some(ms) = s.strip_suffix("ms") {
        ms.trim().parse::<u64>().map(Duration::from_millis).map_err(|_| invalid())
    } else if let Some(secs) = s.strip_suffix('s') {
        secs.trim().parse::<f64>().ok().filter(|v| *v >= 0.0).map(Duration::from_secs_f64).ok_or_else(invalid)
    } else if let Some(mins) = s.strip_suffix('m') {
        mins.trim().parse::<u64>().map(|m| Duration::from_secs(m * 60)).map_err(|_| invalid())
    } else {
        s.parse::<u64>().map(Duration::from_secs).map_err(|_| invalid())
    }
}
