//! On-disk job bundles.
//!
//! A bundle is a directory holding everything one simulation needs:
//! topology, initial state, the input parameters (`input` + `input.json`),
//! optional force/observable descriptors, an optional batch run script,
//! and whatever the engine writes back (last state, trajectory, energy log,
//! `log.log`).

use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::descriptors::{
    FORCES_FILE, Force, OBSERVABLES_FILE, Observable, append_descriptor,
};
use crate::error::{CoreError, CoreResult};
use crate::input::{
    INPUT_FILE, INPUT_JSON_FILE, InputParams, KEY_CONF_FILE, KEY_LASTCONF_FILE, KEY_TOPOLOGY,
};

pub const LOG_FILE: &str = "log.log";
/// Batch run script written from a user template.
pub const RUN_FILE: &str = "run.sh";
pub const SEQ_DEP_FILE: &str = "oxDNA2_sequence_dependent_parameters.txt";

const SEQ_DEP_PARAMETERS: &str = "STCK_FACT_EPS = 0.18
STCK_G_C = 1.69339
STCK_C_G = 1.74669
STCK_G_G = 1.61295
STCK_C_C = 1.61295
STCK_G_A = 1.59887
STCK_T_C = 1.59887
STCK_A_G = 1.61898
STCK_C_T = 1.61898
STCK_T_G = 1.66322
STCK_C_A = 1.66322
STCK_G_T = 1.68032
STCK_A_C = 1.68032
STCK_A_T = 1.56166
STCK_T_A = 1.64311
STCK_A_A = 1.84642
STCK_T_T = 1.58952
HYDR_A_T = 0.88537
HYDR_T_A = 0.88537
HYDR_C_G = 1.23238
HYDR_G_C = 1.23238
";

/// Files currently present in a bundle directory.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SimFiles {
    pub topology: Option<PathBuf>,
    pub initial_conf: Option<PathBuf>,
    pub last_conf: Option<PathBuf>,
    pub trajectory: Option<PathBuf>,
    pub energy: Option<PathBuf>,
    pub input: Option<PathBuf>,
    pub input_json: Option<PathBuf>,
    pub forces: Option<PathBuf>,
    pub observables: Option<PathBuf>,
    pub log: Option<PathBuf>,
    /// `run.sh`, else the first `slurm*` file.
    pub run_file: Option<PathBuf>,
}

impl SimFiles {
    /// Classify every file in `dir`.
    pub fn scan(dir: &Path) -> CoreResult<Self> {
        let mut files = SimFiles::default();
        for name in sorted_file_names(dir)? {
            let path = dir.join(&name);
            match name.as_str() {
                "trajectory.dat" => files.trajectory = Some(path),
                "last_conf.dat" => files.last_conf = Some(path),
                INPUT_FILE => files.input = Some(path),
                INPUT_JSON_FILE => files.input_json = Some(path),
                FORCES_FILE => files.forces = Some(path),
                OBSERVABLES_FILE => files.observables = Some(path),
                LOG_FILE => files.log = Some(path),
                RUN_FILE => files.run_file = Some(path),
                n if n.starts_with("slurm") => {
                    files.run_file.get_or_insert(path);
                }
                n if n.ends_with(".top") => {
                    files.topology.get_or_insert(path);
                }
                n if is_conf_file(n) => {
                    files.initial_conf.get_or_insert(path);
                }
                n if n.contains("energy") => files.energy = Some(path),
                _ => {}
            }
        }
        Ok(files)
    }
}

/// The topology and starting configuration inside `dir`.
///
/// The topology is the first `*.top`. The configuration is the first
/// `last_conf*` file if any, else the first `*.dat` that is not an
/// energy, trajectory or error_conf output.
pub fn find_topology_and_conf(dir: &Path) -> CoreResult<(String, String)> {
    let names = sorted_file_names(dir)?;

    let topology = names
        .iter()
        .find(|n| n.ends_with(".top"))
        .cloned()
        .ok_or_else(|| CoreError::MissingFile {
            kind: "topology (*.top)",
            dir: dir.to_path_buf(),
        })?;

    let conf = names
        .iter()
        .find(|n| n.starts_with("last_conf"))
        .or_else(|| names.iter().find(|n| is_conf_file(n)))
        .cloned()
        .ok_or_else(|| CoreError::MissingFile {
            kind: "configuration (*.dat)",
            dir: dir.to_path_buf(),
        })?;

    Ok((topology, conf))
}

fn is_conf_file(name: &str) -> bool {
    name.ends_with(".dat")
        && !name.ends_with("energy.dat")
        && !name.ends_with("trajectory.dat")
        && !name.ends_with("error_conf.dat")
}

fn sorted_file_names(dir: &Path) -> CoreResult<Vec<String>> {
    if !dir.is_dir() {
        return Err(CoreError::MissingBundle(dir.to_path_buf()));
    }
    let mut names = Vec::new();
    for entry in std::fs::read_dir(dir).map_err(|e| CoreError::io(dir, e))? {
        let entry = entry.map_err(|e| CoreError::io(dir, e))?;
        if entry.path().is_file() {
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
    }
    names.sort();
    Ok(names)
}

/// A prepared job bundle on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bundle {
    dir: PathBuf,
}

impl Bundle {
    /// Open an existing bundle; `input.json` must be present.
    pub fn open(dir: impl Into<PathBuf>) -> CoreResult<Self> {
        let dir = dir.into();
        if !dir.is_dir() {
            return Err(CoreError::MissingBundle(dir));
        }
        if !dir.join(INPUT_JSON_FILE).exists() {
            return Err(CoreError::MissingFile {
                kind: "input.json",
                dir,
            });
        }
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn input(&self) -> CoreResult<InputParams> {
        InputParams::load(&self.dir)
    }

    pub fn modify_input<I, K, V>(&self, params: I) -> CoreResult<InputParams>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        InputParams::modify(&self.dir, params)
    }

    pub fn files(&self) -> CoreResult<SimFiles> {
        SimFiles::scan(&self.dir)
    }

    /// Add an external force, enabling external forces on first use.
    pub fn add_force(&self, force: &Force) -> CoreResult<Option<String>> {
        let path = self.dir.join(FORCES_FILE);
        if !path.exists() {
            self.modify_input([("external_forces", "1"), ("external_forces_file", FORCES_FILE)])?;
        }
        append_descriptor(&path, "force", force)
    }

    /// Add an observable, registering the observables file on first use.
    pub fn add_observable(&self, observable: &Observable) -> CoreResult<Option<String>> {
        let path = self.dir.join(OBSERVABLES_FILE);
        if !path.exists() {
            self.modify_input([("observables_file", OBSERVABLES_FILE)])?;
        }
        append_descriptor(&path, "output", observable)
    }

    /// Restart from the engine's last written state instead of the initial one.
    pub fn continue_from_last_conf(&self) -> CoreResult<()> {
        let input = self.input()?;
        let last_conf = input.get(KEY_LASTCONF_FILE).unwrap_or("last_conf.dat").to_string();
        if !self.dir.join(&last_conf).exists() {
            return Err(CoreError::MissingFile {
                kind: "last configuration",
                dir: self.dir.clone(),
            });
        }
        self.modify_input([
            (KEY_CONF_FILE, last_conf.as_str()),
            ("refresh_vel", "0"),
            ("restart_step_counter", "0"),
        ])?;
        debug!(dir = %self.dir.display(), %last_conf, "bundle set to continue");
        Ok(())
    }

    /// Copy a batch run script template into the bundle as [`RUN_FILE`],
    /// replacing every line that names a job with one naming `job_name`.
    pub fn write_run_file(&self, template: &Path, job_name: &str) -> CoreResult<PathBuf> {
        let content = std::fs::read_to_string(template).map_err(|e| CoreError::io(template, e))?;
        let mut script = String::with_capacity(content.len());
        for line in content.lines() {
            if line.contains("job-name") {
                script.push_str(&format!("#SBATCH --job-name=\"{job_name}\""));
            } else {
                script.push_str(line);
            }
            script.push('\n');
        }

        let path = self.dir.join(RUN_FILE);
        std::fs::write(&path, script).map_err(|e| CoreError::io(&path, e))?;
        debug!(dir = %self.dir.display(), job_name, "run file written");
        Ok(path)
    }

    /// Switch the bundle to sequence-dependent interaction parameters.
    pub fn use_sequence_dependence(&self) -> CoreResult<()> {
        let path = self.dir.join(SEQ_DEP_FILE);
        std::fs::write(&path, SEQ_DEP_PARAMETERS).map_err(|e| CoreError::io(&path, e))?;
        self.modify_input([("use_average_seq", "no"), ("seq_dep_file", SEQ_DEP_FILE)])?;
        Ok(())
    }
}

/// Builds a bundle from a directory holding a topology and a configuration.
#[derive(Debug, Clone)]
pub struct BundleBuilder {
    source_dir: PathBuf,
    sim_dir: PathBuf,
    clean: bool,
    params: InputParams,
}

impl BundleBuilder {
    pub fn new(source_dir: impl Into<PathBuf>, sim_dir: impl Into<PathBuf>) -> Self {
        Self {
            source_dir: source_dir.into(),
            sim_dir: sim_dir.into(),
            clean: false,
            params: InputParams::empty(),
        }
    }

    /// Remove an existing `sim_dir` before building.
    pub fn clean(mut self, clean: bool) -> Self {
        self.clean = clean;
        self
    }

    /// Parameters layered over the engine defaults, or over the bundle's
    /// existing input when rebuilding without [`clean`](Self::clean).
    pub fn params<I, K, V>(mut self, params: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.params.merge(params);
        self
    }

    pub fn build(&self) -> CoreResult<Bundle> {
        let (topology, conf) = find_topology_and_conf(&self.source_dir)?;

        if self.clean && self.sim_dir.exists() {
            std::fs::remove_dir_all(&self.sim_dir).map_err(|e| CoreError::io(&self.sim_dir, e))?;
            debug!(dir = %self.sim_dir.display(), "removed existing bundle");
        }
        std::fs::create_dir_all(&self.sim_dir).map_err(|e| CoreError::io(&self.sim_dir, e))?;

        for name in [&topology, &conf] {
            let from = self.source_dir.join(name);
            let to = self.sim_dir.join(name);
            std::fs::copy(&from, &to).map_err(|e| CoreError::io(&from, e))?;
        }

        let mut input = if self.sim_dir.join(INPUT_JSON_FILE).exists() {
            InputParams::load(&self.sim_dir)?
        } else {
            InputParams::default()
        };
        input.merge(self.params.iter());
        input.set(KEY_CONF_FILE, conf.as_str());
        input.set(KEY_TOPOLOGY, topology.as_str());
        input.save(&self.sim_dir)?;

        info!(
            source = %self.source_dir.display(),
            bundle = %self.sim_dir.display(),
            %topology,
            %conf,
            "bundle built"
        );
        Bundle::open(&self.sim_dir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source_dir() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("system.top"), "10 2\n").unwrap();
        std::fs::write(dir.path().join("system.dat"), "t = 0\n").unwrap();
        std::fs::write(dir.path().join("energy.dat"), "0 0 0\n").unwrap();
        std::fs::write(dir.path().join("trajectory.dat"), "t = 0\n").unwrap();
        dir
    }

    #[test]
    fn finds_topology_and_initial_conf() {
        let src = source_dir();
        let (top, conf) = find_topology_and_conf(src.path()).unwrap();
        assert_eq!(top, "system.top");
        assert_eq!(conf, "system.dat");
    }

    #[test]
    fn prefers_last_conf_over_initial() {
        let src = source_dir();
        std::fs::write(src.path().join("last_conf.dat"), "t = 100\n").unwrap();
        let (_, conf) = find_topology_and_conf(src.path()).unwrap();
        assert_eq!(conf, "last_conf.dat");
    }

    #[test]
    fn missing_topology_fails_fast() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("system.dat"), "").unwrap();
        assert!(matches!(
            find_topology_and_conf(dir.path()),
            Err(CoreError::MissingFile { .. })
        ));
    }

    #[test]
    fn build_copies_files_and_writes_input() {
        let src = source_dir();
        let out = tempfile::tempdir().unwrap();
        let sim_dir = out.path().join("window_0");

        let bundle = BundleBuilder::new(src.path(), &sim_dir)
            .params([("steps", "1e6"), ("dt", "0.002")])
            .build()
            .unwrap();

        assert!(sim_dir.join("system.top").exists());
        assert!(sim_dir.join("system.dat").exists());
        assert!(!sim_dir.join("energy.dat").exists());

        let input = bundle.input().unwrap();
        assert_eq!(input.get(KEY_TOPOLOGY), Some("system.top"));
        assert_eq!(input.get(KEY_CONF_FILE), Some("system.dat"));
        assert_eq!(input.steps().unwrap(), 1_000_000);
        assert_eq!(input.get("backend"), Some("CUDA"));

        let files = bundle.files().unwrap();
        assert_eq!(files.topology, Some(sim_dir.join("system.top")));
        assert_eq!(files.initial_conf, Some(sim_dir.join("system.dat")));
        assert!(files.input.is_some() && files.input_json.is_some());
    }

    #[test]
    fn clean_build_removes_stale_outputs() {
        let src = source_dir();
        let out = tempfile::tempdir().unwrap();
        let sim_dir = out.path().join("sim");
        BundleBuilder::new(src.path(), &sim_dir).build().unwrap();
        std::fs::write(sim_dir.join("stale.txt"), "x").unwrap();

        BundleBuilder::new(src.path(), &sim_dir).clean(true).build().unwrap();
        assert!(!sim_dir.join("stale.txt").exists());
    }

    #[test]
    fn add_force_enables_external_forces() {
        let src = source_dir();
        let out = tempfile::tempdir().unwrap();
        let bundle = BundleBuilder::new(src.path(), out.path().join("sim")).build().unwrap();

        let force = Force::Com {
            com_list: "1,2".to_string(),
            ref_list: "3,4".to_string(),
            stiff: 0.1,
            r0: 5.0,
            pbc: 1,
            rate: 0.0,
        };
        assert_eq!(bundle.add_force(&force).unwrap().as_deref(), Some("force_0"));
        assert_eq!(bundle.add_force(&force).unwrap(), None);
        assert_eq!(bundle.input().unwrap().get("external_forces"), Some("1"));

        let obs = Observable::distance("com_distance.txt", 1000, "1,2", "3,4");
        assert_eq!(bundle.add_observable(&obs).unwrap().as_deref(), Some("output_0"));
        assert_eq!(
            bundle.input().unwrap().get("observables_file"),
            Some(OBSERVABLES_FILE)
        );
    }

    #[test]
    fn rebuild_keeps_existing_input() {
        let src = source_dir();
        let out = tempfile::tempdir().unwrap();
        let sim_dir = out.path().join("sim");
        let bundle = BundleBuilder::new(src.path(), &sim_dir).build().unwrap();
        let force = Force::MutualTrap {
            particle: 0,
            ref_particle: 5,
            stiff: 0.9,
            r0: 1.2,
            pbc: 1,
        };
        bundle.add_force(&force).unwrap();

        let bundle = BundleBuilder::new(src.path(), &sim_dir)
            .params([("dt", "0.003")])
            .build()
            .unwrap();
        let input = bundle.input().unwrap();
        assert_eq!(input.get("external_forces"), Some("1"));
        assert_eq!(input.get("external_forces_file"), Some(FORCES_FILE));
        assert_eq!(input.get("dt"), Some("0.003"));

        let bundle = BundleBuilder::new(src.path(), &sim_dir).clean(true).build().unwrap();
        assert_eq!(bundle.input().unwrap().get("external_forces"), Some("0"));
        assert!(!sim_dir.join(FORCES_FILE).exists());
    }

    #[test]
    fn run_file_renames_the_job() {
        let src = source_dir();
        let out = tempfile::tempdir().unwrap();
        let bundle = BundleBuilder::new(src.path(), out.path().join("sim")).build().unwrap();
        let template = out.path().join("template.sh");
        std::fs::write(
            &template,
            "#!/bin/bash\n#SBATCH --job-name=old\n#SBATCH -n 1\noxDNA input\n",
        )
        .unwrap();

        let path = bundle.write_run_file(&template, "window_0").unwrap();
        assert_eq!(path, bundle.dir().join(RUN_FILE));
        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            "#!/bin/bash\n#SBATCH --job-name=\"window_0\"\n#SBATCH -n 1\noxDNA input\n"
        );
        assert_eq!(bundle.files().unwrap().run_file, Some(path));
    }

    #[test]
    fn slurm_file_counts_as_run_file_only_without_run_sh() {
        let src = source_dir();
        let out = tempfile::tempdir().unwrap();
        let bundle = BundleBuilder::new(src.path(), out.path().join("sim")).build().unwrap();
        std::fs::write(bundle.dir().join("slurm_job.sh"), "#!/bin/bash\n").unwrap();
        assert_eq!(
            bundle.files().unwrap().run_file,
            Some(bundle.dir().join("slurm_job.sh"))
        );

        std::fs::write(bundle.dir().join(RUN_FILE), "#!/bin/bash\n").unwrap();
        assert_eq!(bundle.files().unwrap().run_file, Some(bundle.dir().join(RUN_FILE)));
    }

    #[test]
    fn continue_requires_last_conf() {
        let src = source_dir();
        let out = tempfile::tempdir().unwrap();
        let bundle = BundleBuilder::new(src.path(), out.path().join("sim")).build().unwrap();
        assert!(bundle.continue_from_last_conf().is_err());

        std::fs::write(bundle.dir().join("last_conf.dat"), "t = 5\n").unwrap();
        bundle.continue_from_last_conf().unwrap();
        let input = bundle.input().unwrap();
        assert_eq!(input.get(KEY_CONF_FILE), Some("last_conf.dat"));
        assert_eq!(input.get("refresh_vel"), Some("0"));
        assert_eq!(input.get("restart_step_counter"), Some("0"));
    }

    #[test]
    fn sequence_dependence_writes_parameter_file() {
        let src = source_dir();
        let out = tempfile::tempdir().unwrap();
        let bundle = BundleBuilder::new(src.path(), out.path().join("sim")).build().unwrap();
        bundle.use_sequence_dependence().unwrap();
        assert!(bundle.dir().join(SEQ_DEP_FILE).exists());
        assert_eq!(bundle.input().unwrap().get("use_average_seq"), Some("no"));
    }
}
