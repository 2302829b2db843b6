use std::path::PathBuf;

use anyhow::Context;

use simgrid_core::SimgridConfig;
use simgrid_engine::submit_run_file;

/// Hand each bundle's run script to the batch system.
pub async fn submit(config: &SimgridConfig, bundles: &[PathBuf]) -> anyhow::Result<()> {
    let program = config.engine_settings().batch_program;
    for dir in bundles {
        let reply = submit_run_file(dir, &program)
            .await
            .with_context(|| format!("submitting {}", dir.display()))?;
        println!("{}: {reply}", dir.display());
    }
    Ok(())
}
