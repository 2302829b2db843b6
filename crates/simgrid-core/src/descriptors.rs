//! External force and observable descriptors.
//!
//! Both live in a bundle as JSON objects mapping an entry name
//! (`force_0`, `output_0`, ...) to a typed descriptor. Appending a
//! descriptor that is already present is a no-op.

use std::collections::BTreeMap;
use std::path::Path;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{CoreError, CoreResult};

pub const FORCES_FILE: &str = "forces.json";
pub const OBSERVABLES_FILE: &str = "observables.json";

pub type Vec3 = [f64; 3];

/// An external force applied by the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Force {
    /// Harmonic spring between the centres of mass of two particle sets.
    Com {
        com_list: String,
        ref_list: String,
        stiff: f64,
        r0: f64,
        #[serde(rename = "PBC")]
        pbc: u8,
        rate: f64,
    },
    /// Spring pulling `particle` towards `ref_particle`.
    MutualTrap {
        particle: i64,
        ref_particle: i64,
        stiff: f64,
        r0: f64,
        #[serde(rename = "PBC")]
        pbc: u8,
    },
    /// Linearly growing force along a direction.
    #[serde(rename = "string")]
    Linear {
        particle: i64,
        f0: f64,
        rate: f64,
        dir: Vec3,
    },
    /// Moving harmonic trap.
    Trap {
        particle: i64,
        pos0: Vec3,
        stiff: f64,
        rate: f64,
        dir: Vec3,
    },
    /// Harmonic trap rotating about an axis.
    Twist {
        particle: i64,
        stiff: f64,
        rate: f64,
        base: f64,
        pos0: Vec3,
        center: Vec3,
        axis: Vec3,
        mask: Vec3,
    },
    /// Plane keeping particles on one side; `particle = -1` is the whole system.
    RepulsionPlane {
        particle: i64,
        stiff: f64,
        dir: Vec3,
        position: f64,
    },
    /// Sphere with radius `r0 + rate * t` enclosing the particles.
    Sphere {
        particle: i64,
        center: Vec3,
        stiff: f64,
        r0: f64,
        rate: f64,
    },
}

/// One column of an observable output file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ObservableColumn {
    Distance {
        particle_1: String,
        particle_2: String,
    },
}

/// A quantity the engine samples into its own output file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observable {
    /// Output file name, relative to the bundle.
    pub name: String,
    /// Sampling interval in steps.
    pub print_every: u64,
    pub cols: Vec<ObservableColumn>,
}

impl Observable {
    pub fn distance(
        name: impl Into<String>,
        print_every: u64,
        particle_1: impl Into<String>,
        particle_2: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            print_every,
            cols: vec![ObservableColumn::Distance {
                particle_1: particle_1.into(),
                particle_2: particle_2.into(),
            }],
        }
    }
}

/// Read a descriptor file; a missing file is an empty map.
pub fn load_descriptors<T: DeserializeOwned>(path: &Path) -> CoreResult<BTreeMap<String, T>> {
    if !path.exists() {
        return Ok(BTreeMap::new());
    }
    let content = std::fs::read_to_string(path).map_err(|e| CoreError::io(path, e))?;
    Ok(serde_json::from_str(&content)?)
}

/// Append `item` under `<prefix>_<n>`.
///
/// Returns the new entry name, or `None` if an equal descriptor already exists.
pub fn append_descriptor<T>(path: &Path, prefix: &str, item: &T) -> CoreResult<Option<String>>
where
    T: Serialize + DeserializeOwned + PartialEq + Clone,
{
    let mut entries: BTreeMap<String, T> = load_descriptors(path)?;
    if entries.values().any(|existing| existing == item) {
        debug!(path = %path.display(), "descriptor already present, skipping");
        return Ok(None);
    }

    let mut n = entries.len();
    let mut name = format!("{prefix}_{n}");
    while entries.contains_key(&name) {
        n += 1;
        name = format!("{prefix}_{n}");
    }

    entries.insert(name.clone(), item.clone());

    let json = serde_json::to_string_pretty(&entries)?;
    std::fs::write(path, json).map_err(|e| CoreError::io(path, e))?;
    Ok(Some(name))
}
