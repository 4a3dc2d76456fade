//! Configuration for the offline stage, the greedy sampler and reduced meshes.
//!
//! All settings are plain structs with `Default` impls; they also derive
//! serde traits so a run can be described in a JSON file:
//!
//! ```json
//! { "n_max": 6, "output_folder": "thermal_block", "greedy": { "rng_seed": 7 } }
//! ```

use crate::rom_error::RomError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Settings for [`crate::algs::greedy::GreedySampler`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GreedyConfig {
    /// Seed of the `SmallRng` used to break exact ties.
    pub rng_seed: u64,
    /// Evaluate the training set with rayon.
    pub parallel: bool,
}

impl Default for GreedyConfig {
    fn default() -> Self {
        Self {
            rng_seed: 42,
            parallel: true,
        }
    }
}

/// Settings for [`crate::reduction::offline::OfflineStage`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OfflineConfig {
    /// Maximum reduced dimension (stopping criterion).
    pub n_max: usize,
    /// Root folder for basis, snapshots and post-processing files.
    pub output_folder: PathBuf,
    /// File label of the persisted basis.
    pub basis_label: String,
    /// Relative X-norm below which a Gram-Schmidt residual is degenerate.
    pub degeneracy_tolerance: f64,
    /// Save every truth snapshot under `snapshots/`.
    pub save_snapshots: bool,
    pub greedy: GreedyConfig,
}

impl Default for OfflineConfig {
    fn default() -> Self {
        Self {
            n_max: 10,
            output_folder: PathBuf::from("reduced_basis_output"),
            basis_label: "basis".to_string(),
            degeneracy_tolerance: 1e-8,
            save_snapshots: true,
            greedy: GreedyConfig::default(),
        }
    }
}

impl OfflineConfig {
    /// Load a configuration from a JSON file; missing fields take defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, RomError> {
        let bytes = fs::read(path.as_ref())?;
        let config: Self = serde_json::from_slice(&bytes)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the offline stage cannot run with.
    pub fn validate(&self) -> Result<(), RomError> {
        if self.n_max == 0 {
            return Err(RomError::Configuration("n_max must be positive".into()));
        }
        if !(self.degeneracy_tolerance > 0.0 && self.degeneracy_tolerance < 1.0) {
            return Err(RomError::Configuration(format!(
                "degeneracy_tolerance must lie in (0, 1), got {}",
                self.degeneracy_tolerance
            )));
        }
        if self.basis_label.is_empty() {
            return Err(RomError::Configuration("basis_label must not be empty".into()));
        }
        Ok(())
    }

    pub fn basis_folder(&self) -> PathBuf {
        self.output_folder.join("basis")
    }

    pub fn snapshots_folder(&self) -> PathBuf {
        self.output_folder.join("snapshots")
    }

    pub fn post_processing_folder(&self) -> PathBuf {
        self.output_folder.join("post_processing")
    }
}

/// When the reduced function spaces are rebuilt after an append.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum RebuildPolicy {
    /// Recompute from scratch on the full accumulated cell set every call.
    #[default]
    Always,
    /// Skip the rebuild when the append added no new cell.
    OnNewCells,
}

/// Settings for [`crate::algs::reduced_mesh::ReducedMesh`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReducedMeshConfig {
    pub rebuild_policy: RebuildPolicy,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_takes_defaults() {
        let cfg: OfflineConfig =
            serde_json::from_str(r#"{ "n_max": 4, "greedy": { "rng_seed": 7 } }"#).unwrap();
        assert_eq!(cfg.n_max, 4);
        assert_eq!(cfg.greedy.rng_seed, 7);
        assert!(cfg.greedy.parallel);
        assert_eq!(cfg.basis_label, "basis");
        cfg.validate().unwrap();
    }

    #[test]
    fn zero_n_max_is_rejected() {
        let cfg = OfflineConfig {
            n_max: 0,
            ..Default::default()
        };
        assert!(matches!(cfg.validate(), Err(RomError::Configuration(_))));
    }

    #[test]
    fn degeneracy_tolerance_must_be_positive() {
        for tolerance in [0.0, -1e-8, 1.0, f64::NAN] {
            let cfg = OfflineConfig {
                degeneracy_tolerance: tolerance,
                ..Default::default()
            };
            assert!(matches!(cfg.validate(), Err(RomError::Configuration(_))));
        }
    }

    #[test]
    fn folders_hang_off_output_folder() {
        let cfg = OfflineConfig {
            output_folder: PathBuf::from("run"),
            ..Default::default()
        };
        assert_eq!(cfg.basis_folder(), PathBuf::from("run/basis"));
        assert_eq!(cfg.post_processing_folder(), PathBuf::from("run/post_processing"));
    }
}
