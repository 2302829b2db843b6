//! simgrid: memory-aware runner for batches of GPU simulations.
//!
//! # Usage
//!
//! ```text
//! simgrid build --from ./system --to ./sims/window_0 --set steps=1e7
//! simgrid run ./sims/window_*
//! simgrid devices
//! simgrid build --from ./system --to ./sims/window_1 --run-file ./template.sh
//! simgrid submit ./sims/window_1
//! ```

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

mod commands;

#[derive(Parser)]
#[command(
    name = "simgrid",
    about = "SimGrid: run simulation bundles across GPUs without exhausting device memory",
    version,
    propagate_version = true,
)]
struct Cli {
    /// Path to simgrid.toml (default: ./simgrid.toml if present).
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run bundles in submission order until all have finished.
    ///
    /// Ctrl-C terminates every running simulation.
    Run {
        /// Bundle directories, launched in the order given.
        #[arg(required = true)]
        bundles: Vec<PathBuf>,
        /// Restart each bundle from its last written configuration.
        #[arg(long = "continue")]
        continue_run: bool,
        /// Print the run summary as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Measure a bundle's device-memory footprint with a zero-step run.
    Probe {
        bundle: PathBuf,
        /// Device to probe on (default: the one with most free memory).
        #[arg(short, long)]
        device: Option<usize>,
    },
    /// Show free memory on every device.
    Devices,
    /// Build a bundle from a directory holding a topology and configuration.
    Build {
        /// Directory with the `.top` and configuration files.
        #[arg(long)]
        from: PathBuf,
        /// Bundle directory to create.
        #[arg(long)]
        to: PathBuf,
        /// Remove `--to` first if it exists.
        #[arg(long)]
        clean: bool,
        /// Input parameter override, repeatable.
        #[arg(long = "set", value_name = "KEY=VALUE", value_parser = commands::build::parse_key_value)]
        set: Vec<(String, String)>,
        /// JSON array of external forces to add.
        #[arg(long)]
        forces: Option<PathBuf>,
        /// JSON array of observables to add.
        #[arg(long)]
        observables: Option<PathBuf>,
        /// Use sequence-dependent interaction parameters.
        #[arg(long)]
        seq_dep: bool,
        /// Batch script template to write into the bundle as run.sh.
        #[arg(long)]
        run_file: Option<PathBuf>,
        /// Batch job name for the run file (default: the bundle's name).
        #[arg(long, requires = "run_file")]
        job_name: Option<String>,
    },
    /// Submit each bundle's run.sh to the batch system.
    Submit {
        #[arg(required = true)]
        bundles: Vec<PathBuf>,
    },
    /// Control the multi-process service daemon.
    Mps {
        #[arg(value_enum)]
        action: MpsAction,
    },
    /// Write a simgrid.toml with every default spelled out.
    Init {
        #[arg(short, long, default_value = ".")]
        path: PathBuf,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum MpsAction {
    Start,
    Stop,
    Restart,
}

impl From<MpsAction> for commands::mps::Action {
    fn from(action: MpsAction) -> Self {
        match action {
            MpsAction::Start => Self::Start,
            MpsAction::Stop => Self::Stop,
            MpsAction::Restart => Self::Restart,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,simgrid=debug".parse().unwrap());
    if cli.log_json {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    let config = commands::load_config(cli.config.as_deref())?;

    match cli.command {
        Command::Run {
            bundles,
            continue_run,
            json,
        } => commands::run::run(&config, &bundles, continue_run, json).await,
        Command::Probe { bundle, device } => commands::probe::probe(&config, &bundle, device).await,
        Command::Devices => commands::devices::devices(&config).await,
        Command::Build {
            from,
            to,
            clean,
            set,
            forces,
            observables,
            seq_dep,
            run_file,
            job_name,
        } => commands::build::build(commands::build::BuildArgs {
            from,
            to,
            clean,
            set,
            forces,
            observables,
            seq_dep,
            run_file,
            job_name,
        }),
        Command::Submit { bundles } => commands::submit::submit(&config, &bundles).await,
        Command::Mps { action } => commands::mps::mps(&config, action.into()).await,
        Command::Init { path } => commands::init(&path),
    }
}
