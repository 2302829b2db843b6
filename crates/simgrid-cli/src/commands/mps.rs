use anyhow::Context;

use simgrid_core::SimgridConfig;
use simgrid_engine::MpsControl;

#[derive(Debug, Clone, Copy)]
pub enum Action {
    Start,
    Stop,
    Restart,
}

pub async fn mps(config: &SimgridConfig, action: Action) -> anyhow::Result<()> {
    let settings = config.mps_settings();
    let control = MpsControl::from_settings(&settings);
    let done = match action {
        Action::Start => control.start().await.map(|()| "started"),
        Action::Stop => control.stop().await.map(|()| "stopped"),
        Action::Restart => control.restart().await.map(|()| "restarted"),
    }
    .with_context(|| format!("running {}", settings.program))?;

    println!("✓ mps daemon {done} (pipe: {})", settings.pipe_dir.display());
    Ok(())
}
