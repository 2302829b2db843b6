use simgrid_core::SimgridConfig;
use simgrid_device::DeviceMonitor;

pub async fn devices(config: &SimgridConfig) -> anyhow::Result<()> {
    let monitor = DeviceMonitor::from_settings(&config.device_settings()?);
    let readings = monitor.snapshot().await?;
    let chosen = monitor.query().await?;

    for reading in &readings {
        let marker = if reading.index == chosen.index { "*" } else { " " };
        println!("{marker} device {}: {:.0} MiB free", reading.index, reading.free_mib);
    }
    Ok(())
}
