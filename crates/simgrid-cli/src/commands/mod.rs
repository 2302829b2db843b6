pub mod build;
pub mod devices;
pub mod mps;
pub mod probe;
pub mod run;
pub mod submit;

use std::path::Path;

use anyhow::Context;
use simgrid_core::SimgridConfig;

pub const CONFIG_FILE: &str = "simgrid.toml";

/// Explicit `--config`, else `./simgrid.toml` if present, else defaults.
pub fn load_config(path: Option<&Path>) -> anyhow::Result<SimgridConfig> {
    match path {
        Some(path) => SimgridConfig::from_file(path)
            .with_context(|| format!("loading {}", path.display())),
        None if Path::new(CONFIG_FILE).exists() => {
            SimgridConfig::from_file(Path::new(CONFIG_FILE)).context("loading simgrid.toml")
        }
        None => Ok(SimgridConfig::default()),
    }
}

pub fn init(dir: &Path) -> anyhow::Result<()> {
    let output = dir.join(CONFIG_FILE);
    if output.exists() {
        anyhow::bail!("{} already exists", output.display());
    }
    std::fs::write(&output, SimgridConfig::scaffold().to_toml_string()?)?;
    println!("✓ Generated {}", output.display());
    Ok(())
}
