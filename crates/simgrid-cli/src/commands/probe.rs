use std::path::Path;
use std::sync::Arc;

use simgrid_core::{Job, SimgridConfig};
use simgrid_device::DeviceMonitor;
use simgrid_engine::{CommandEngine, MemoryProbe};

pub async fn probe(config: &SimgridConfig, bundle: &Path, device: Option<usize>) -> anyhow::Result<()> {
    let mut job = Job::load(bundle)?;
    job.device = match device {
        Some(index) => Some(index),
        None => {
            let monitor = DeviceMonitor::from_settings(&config.device_settings()?);
            Some(monitor.query().await?.index)
        }
    };

    let engine = CommandEngine::from_settings(&config.engine_settings());
    let mib = MemoryProbe::new(Arc::new(engine)).probe(&mut job).await?;
    println!("{}: {mib:.1} MiB on device {}", job.name, job.device.unwrap_or_default());
    Ok(())
}
