use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::de::DeserializeOwned;

use simgrid_core::{Bundle, BundleBuilder, Force, Observable};

pub struct BuildArgs {
    pub from: PathBuf,
    pub to: PathBuf,
    pub clean: bool,
    pub set: Vec<(String, String)>,
    pub forces: Option<PathBuf>,
    pub observables: Option<PathBuf>,
    pub seq_dep: bool,
    pub run_file: Option<PathBuf>,
    pub job_name: Option<String>,
}

pub fn build(args: BuildArgs) -> anyhow::Result<()> {
    let bundle = BundleBuilder::new(&args.from, &args.to)
        .clean(args.clean)
        .params(args.set)
        .build()
        .with_context(|| format!("building bundle from {}", args.from.display()))?;

    if let Some(path) = &args.forces {
        for force in read_list::<Force>(path)? {
            bundle.add_force(&force)?;
        }
    }
    if let Some(path) = &args.observables {
        for observable in read_list::<Observable>(path)? {
            bundle.add_observable(&observable)?;
        }
    }
    if args.seq_dep {
        bundle.use_sequence_dependence()?;
    }
    if let Some(template) = &args.run_file {
        let job_name = args.job_name.clone().unwrap_or_else(|| default_job_name(&args.to));
        bundle
            .write_run_file(template, &job_name)
            .with_context(|| format!("writing run file from {}", template.display()))?;
    }

    print_bundle(&bundle)
}

fn print_bundle(bundle: &Bundle) -> anyhow::Result<()> {
    let files = bundle.files()?;
    let input = bundle.input()?;
    println!("✓ Built {}", bundle.dir().display());
    if let Some(topology) = &files.topology {
        println!("  topology: {}", topology.display());
    }
    if let Some(run_file) = &files.run_file {
        println!("  run file: {}", run_file.display());
    }
    println!("  steps:    {}", input.steps()?);
    Ok(())
}

/// The bundle directory's own name, as in `sims/window_0` → `window_0`.
fn default_job_name(dir: &Path) -> String {
    dir.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "oxDNA".to_string())
}

fn read_list<T: DeserializeOwned>(path: &Path) -> anyhow::Result<Vec<T>> {
    let content =
        std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("parsing {}", path.display()))
}

/// Parse a `--set key=value` argument.
pub fn parse_key_value(s: &str) -> Result<(String, String), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got {s:?}"))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("empty key in {s:?}"));
    }
    Ok((key.to_string(), value.trim().to_string()))
}
