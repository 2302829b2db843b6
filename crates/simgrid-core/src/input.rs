//! Engine input parameters.
//!
//! The parameter map is persisted twice inside a bundle: `input.json`
//! (structured, the source of truth when reading back) and `input`
//! (plain `key = value` lines consumed by the engine).

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{CoreError, CoreResult};

pub const INPUT_FILE: &str = "input";
pub const INPUT_JSON_FILE: &str = "input.json";

pub const KEY_STEPS: &str = "steps";
pub const KEY_DEVICE: &str = "CUDA_device";
pub const KEY_TOPOLOGY: &str = "topology";
pub const KEY_CONF_FILE: &str = "conf_file";
pub const KEY_LASTCONF_FILE: &str = "lastconf_file";
pub const KEY_TRAJECTORY_FILE: &str = "trajectory_file";
pub const KEY_ENERGY_FILE: &str = "energy_file";

const DEFAULTS: &[(&str, &str)] = &[
    ("interaction_type", "DNA2"),
    ("salt_concentration", "1.0"),
    ("sim_type", "MD"),
    ("backend", "CUDA"),
    ("backend_precision", "mixed"),
    ("use_edge", "1"),
    ("edge_n_forces", "1"),
    ("CUDA_list", "verlet"),
    ("CUDA_sort_every", "0"),
    ("max_density_multiplier", "2"),
    ("steps", "1e9"),
    ("ensemble", "nvt"),
    ("thermostat", "john"),
    ("T", "20C"),
    ("dt", "0.003"),
    ("verlet_skin", "0.5"),
    ("diff_coeff", "2.5"),
    ("newtonian_steps", "103"),
    ("lastconf_file", "last_conf.dat"),
    ("trajectory_file", "trajectory.dat"),
    ("refresh_vel", "1"),
    ("no_stdout_energy", "0"),
    ("restart_step_counter", "1"),
    ("energy_file", "energy.dat"),
    ("print_conf_interval", "5e5"),
    ("print_energy_every", "5e5"),
    ("time_scale", "linear"),
    ("max_io", "5"),
    ("external_forces", "0"),
    ("external_forces_file", "forces.json"),
    ("external_forces_as_JSON", "true"),
];

/// Ordered key/value parameters passed to the simulation engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InputParams(BTreeMap<String, String>);

impl Default for InputParams {
    fn default() -> Self {
        Self(
            DEFAULTS
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        )
    }
}

impl InputParams {
    /// An empty parameter map (no engine defaults).
    pub fn empty() -> Self {
        Self(BTreeMap::new())
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn remove(&mut self, key: &str) -> Option<String> {
        self.0.remove(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    /// Merge `other` over `self`; keys in `other` win.
    pub fn merge<I, K, V>(&mut self, other: I)
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        for (k, v) in other {
            self.0.insert(k.into(), v.into());
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Step count, accepting the engine's scientific notation ("1e9").
    pub fn steps(&self) -> CoreResult<u64> {
        let raw = self.get(KEY_STEPS).ok_or_else(|| CoreError::InvalidParam {
            key: KEY_STEPS.to_string(),
            reason: "not set".to_string(),
        })?;
        parse_count(raw).ok_or_else(|| CoreError::InvalidParam {
            key: KEY_STEPS.to_string(),
            reason: format!("not a step count: {raw:?}"),
        })
    }

    /// Render in the engine's plain-text `key = value` format.
    pub fn to_plain_text(&self) -> String {
        let mut out = String::new();
        for (k, v) in &self.0 {
            out.push_str(k);
            out.push_str(" = ");
            out.push_str(v);
            out.push('\n');
        }
        out
    }

    /// Parse the plain-text format. Blank lines and `#` comments are skipped.
    pub fn from_plain_text(text: &str) -> CoreResult<Self> {
        let mut map = BTreeMap::new();
        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let (k, v) = line.split_once('=').ok_or_else(|| CoreError::InvalidParam {
                key: line.to_string(),
                reason: "expected `key = value`".to_string(),
            })?;
            map.insert(k.trim().to_string(), v.trim().to_string());
        }
        Ok(Self(map))
    }

    /// Read `input.json` from a bundle directory.
    pub fn load(dir: &Path) -> CoreResult<Self> {
        let path = dir.join(INPUT_JSON_FILE);
        if !path.exists() {
            return Err(CoreError::MissingFile {
                kind: "input.json",
                dir: dir.to_path_buf(),
            });
        }
        let content = std::fs::read_to_string(&path).map_err(|e| CoreError::io(&path, e))?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Write both encodings into a bundle directory.
    pub fn save(&self, dir: &Path) -> CoreResult<()> {
        let json_path = dir.join(INPUT_JSON_FILE);
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(&json_path, json).map_err(|e| CoreError::io(&json_path, e))?;

        let plain_path = dir.join(INPUT_FILE);
        std::fs::write(&plain_path, self.to_plain_text())
            .map_err(|e| CoreError::io(&plain_path, e))?;

        debug!(dir = %dir.display(), params = self.len(), "input parameters written");
        Ok(())
    }

    /// Load, merge `params`, and persist again.
    pub fn modify<I, K, V>(dir: &Path, params: I) -> CoreResult<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut input = Self::load(dir)?;
        input.merge(params);
        input.save(dir)?;
        Ok(input)
    }
}

/// Parse an integer count that may be written as "1000", "1e6" or "4.0e7".
pub fn parse_count(raw: &str) -> Option<u64> {
    let raw = raw.trim();
    if let Ok(v) = raw.parse::<u64>() {
        return Some(v);
    }
    let v = raw.parse::<f64>().ok()?;
    if v.is_finite() && v >= 0.0 && v.fract() == 0.0 && v <= u64::MAX as f64 {
        Some(v as u64)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_engine_expectations() {
        let input = InputParams::default();
        assert_eq!(input.get("backend"), Some("CUDA"));
        assert_eq!(input.get(KEY_LASTCONF_FILE), Some("last_conf.dat"));
        assert_eq!(input.steps().unwrap(), 1_000_000_000);
        assert!(!input.contains(KEY_TOPOLOGY));
    }

    #[test]
    fn parse_count_accepts_scientific_notation() {
        assert_eq!(parse_count("0"), Some(0));
        assert_eq!(parse_count("4e7"), Some(40_000_000));
        assert_eq!(parse_count("2.5e3"), Some(2500));
        assert_eq!(parse_count("1.5"), None);
        assert_eq!(parse_count("-3"), None);
        assert_eq!(parse_count("lots"), None);
    }

    #[test]
    fn plain_text_round_trip() {
        let mut input = InputParams::empty();
        input.set("steps", "100");
        input.set("T", "20C");
        let text = input.to_plain_text();
        assert_eq!(text, "T = 20C\nsteps = 100\n");
        assert_eq!(InputParams::from_plain_text(&text).unwrap(), input);
    }

    #[test]
    fn plain_text_rejects_garbage() {
        assert!(InputParams::from_plain_text("steps 100").is_err());
        let parsed = InputParams::from_plain_text("# comment\n\nsteps=5\n").unwrap();
        assert_eq!(parsed.get("steps"), Some("5"));
    }

    #[test]
    fn save_writes_both_encodings() {
        let dir = tempfile::tempdir().unwrap();
        let input = InputParams::default();
        input.save(dir.path()).unwrap();

        assert!(dir.path().join(INPUT_FILE).exists());
        assert_eq!(InputParams::load(dir.path()).unwrap(), input);

        let plain = std::fs::read_to_string(dir.path().join(INPUT_FILE)).unwrap();
        assert!(plain.contains("backend = CUDA\n"));
    }

    #[test]
    fn modify_merges_and_persists() {
        let dir = tempfile::tempdir().unwrap();
        InputParams::default().save(dir.path()).unwrap();

        let updated = InputParams::modify(dir.path(), [("steps", "1e6"), ("dt", "0.002")]).unwrap();
        assert_eq!(updated.steps().unwrap(), 1_000_000);

        let reloaded = InputParams::load(dir.path()).unwrap();
        assert_eq!(reloaded.get("dt"), Some("0.002"));
        assert_eq!(reloaded.get("backend"), Some("CUDA"));
    }

    #[test]
    fn load_missing_input_is_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            InputParams::load(dir.path()),
            Err(CoreError::MissingFile { .. })
        ));
    }
}
