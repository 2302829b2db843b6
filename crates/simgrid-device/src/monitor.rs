//! Device monitor: queries free memory on every compute device.
//!
//! A [`MemorySource`] produces one free-memory value per device; the
//! [`DeviceMonitor`] pairs it with a [`DeviceSelector`] to answer "which
//! device should the next job go to, and how much room does it have".

use std::process::Stdio;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, warn};

use simgrid_core::config::{DeviceSettings, Selection};

use crate::error::{DeviceError, DeviceResult};
use crate::selector::{DeviceSelector, MostFree, Pinned};

/// Free memory on one device at query time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DeviceReading {
    pub index: usize,
    /// Free memory in MiB.
    pub free_mib: f64,
}

/// Anything that can report free memory per device, in device order.
#[async_trait]
pub trait MemorySource: Send + Sync {
    async fn free_memory(&self) -> DeviceResult<Vec<f64>>;
}

/// Runs an external query command (by default `nvidia-smi`) and parses
/// its CSV output.
#[derive(Debug, Clone)]
pub struct SmiSource {
    command: String,
    args: Vec<String>,
}

impl SmiSource {
    pub fn new(command: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            command: command.into(),
            args,
        }
    }

    pub fn from_settings(settings: &DeviceSettings) -> Self {
        Self::new(settings.command.clone(), settings.args.clone())
    }
}

impl Default for SmiSource {
    fn default() -> Self {
        Self::from_settings(&DeviceSettings::default())
    }
}

#[async_trait]
impl MemorySource for SmiSource {
    async fn free_memory(&self) -> DeviceResult<Vec<f64>> {
        let output = Command::new(&self.command)
            .args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|source| DeviceError::Spawn {
                command: self.command.clone(),
                source,
            })?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            warn!(command = %self.command, code = ?output.status.code(), "device query failed");
            return Err(DeviceError::CommandFailed {
                command: self.command.clone(),
                code: output.status.code(),
                output: format!("{}{}", stdout.trim_end(), stderr.trim_end()),
            });
        }

        parse_free_memory(&stdout)
    }
}

/// Parse query output: a header line, then one line per device whose
/// first token is the free memory (e.g. `10240 MiB`).
pub fn parse_free_memory(output: &str) -> DeviceResult<Vec<f64>> {
    let values = output
        .lines()
        .skip(1)
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| {
            line.split_whitespace()
                .next()
                .map(|token| token.trim_end_matches(','))
                .and_then(|token| token.parse::<f64>().ok())
                .filter(|v| v.is_finite() && *v >= 0.0)
                .ok_or_else(|| DeviceError::Parse {
                    line: line.to_string(),
                })
        })
        .collect::<DeviceResult<Vec<f64>>>()?;

    if values.is_empty() {
        return Err(DeviceError::NoDevices);
    }
    Ok(values)
}

/// Source plus selection strategy.
#[derive(Clone)]
pub struct DeviceMonitor {
    source: Arc<dyn MemorySource>,
    selector: Arc<dyn DeviceSelector>,
}

impl DeviceMonitor {
    pub fn new(source: Arc<dyn MemorySource>, selector: Arc<dyn DeviceSelector>) -> Self {
        Self { source, selector }
    }

    /// Most-free selection over `source`.
    pub fn most_free(source: Arc<dyn MemorySource>) -> Self {
        Self::new(source, Arc::new(MostFree))
    }

    pub fn from_settings(settings: &DeviceSettings) -> Self {
        let selector: Arc<dyn DeviceSelector> = match settings.selection {
            Selection::MostFree => Arc::new(MostFree),
            Selection::Pinned(index) => Arc::new(Pinned(index)),
        };
        Self::new(Arc::new(SmiSource::from_settings(settings)), selector)
    }

    /// Fresh readings for every device.
    pub async fn snapshot(&self) -> DeviceResult<Vec<DeviceReading>> {
        let values = self.source.free_memory().await?;
        Ok(values
            .into_iter()
            .enumerate()
            .map(|(index, free_mib)| DeviceReading { index, free_mib })
            .collect())
    }

    /// The device the selector picks from a fresh snapshot.
    pub async fn query(&self) -> DeviceResult<DeviceReading> {
        let readings = self.snapshot().await?;
        let chosen = self.selector.select(&readings)?;
        debug!(
            device = chosen.index,
            free_mib = chosen.free_mib,
            devices = readings.len(),
            strategy = self.selector.name(),
            "device query"
        );
        Ok(chosen)
    }
}

impl std::fmt::Debug for DeviceMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceMonitor")
            .field("selector", &self.selector.name())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedSource(Vec<f64>);

    #[async_trait]
    impl MemorySource for FixedSource {
        async fn free_memory(&self) -> DeviceResult<Vec<f64>> {
            Ok(self.0.clone())
        }
    }

    #[test]
    fn parse_discards_header() {
        let out = "memory.free [MiB]\n10240 MiB\n2048 MiB\n";
        assert_eq!(parse_free_memory(out).unwrap(), vec![10240.0, 2048.0]);
    }

    #[test]
    fn parse_tolerates_blank_lines_and_commas() {
        let out = "memory.free [MiB]\n\n 512, MiB \n";
        assert_eq!(parse_free_memory(out).unwrap(), vec![512.0]);
    }

    #[test]
    fn parse_rejects_garbage_and_empty() {
        assert!(matches!(
            parse_free_memory("header\nN/A\n"),
            Err(DeviceError::Parse { .. })
        ));
        assert!(matches!(
            parse_free_memory("memory.free [MiB]\n"),
            Err(DeviceError::NoDevices)
        ));
    }

    #[tokio::test]
    async fn query_picks_most_free_device() {
        let monitor = DeviceMonitor::most_free(Arc::new(FixedSource(vec![100.0, 900.0, 300.0])));
        let reading = monitor.query().await.unwrap();
        assert_eq!(reading, DeviceReading { index: 1, free_mib: 900.0 });
        assert_eq!(monitor.snapshot().await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn pinned_settings_build_pinned_monitor() {
        let settings = DeviceSettings {
            command: "sh".to_string(),
            args: vec![
                "-c".to_string(),
                "printf 'memory.free [MiB]\\n100 MiB\\n300 MiB\\n'".to_string(),
            ],
            selection: Selection::Pinned(0),
        };
        let reading = DeviceMonitor::from_settings(&settings).query().await.unwrap();
        assert_eq!(reading, DeviceReading { index: 0, free_mib: 100.0 });
    }

    #[tokio::test]
    async fn failing_command_is_command_failed() {
        let source = SmiSource::new("sh", vec!["-c".to_string(), "echo boom; exit 3".to_string()]);
        match source.free_memory().await {
            Err(DeviceError::CommandFailed { code, output, .. }) => {
                assert_eq!(code, Some(3));
                assert!(output.contains("boom"));
            }
            other => panic!("expected CommandFailed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn missing_binary_is_spawn_error() {
        let source = SmiSource::new("/nonexistent/simgrid-smi", Vec::new());
        assert!(matches!(
            source.free_memory().await,
            Err(DeviceError::Spawn { .. })
        ));
    }
}
