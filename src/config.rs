//! Configuration for sketch building, index construction, and storage.
//!
//! Permutation count and seed are process-wide in spirit but passed around
//! explicitly, so several configurations can coexist (tests build with small
//! `num_perm` next to the default).

use crate::error::{Result, SketchError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default number of MinHash permutations.
pub const DEFAULT_NUM_PERM: usize = 128;

/// Default master seed from which permutation seeds are derived.
pub const DEFAULT_SEED: u64 = 1;

/// Version of the seed derivation scheme in [`SketchConfig::permutation_seeds`].
///
/// Changing the derivation (or `num_perm`/`seed`) invalidates every persisted
/// signature; bump this and rebuild.
pub const SEED_SCHEME_VERSION: u32 = 1;

/// Default [`ServiceConfig::matrix_cache_size`].
pub const DEFAULT_MATRIX_CACHE_SIZE: usize = 8;

/// Environment variable overriding [`ServiceConfig::store_root`].
pub const STORE_ROOT_ENV: &str = "COLSKETCH_STORE_ROOT";

/// MinHash parameters shared by every signature that is ever compared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SketchConfig {
    /// Number of permutations (signature length).
    pub num_perm: usize,
    /// Master seed for permutation seeds.
    pub seed: u64,
}

impl Default for SketchConfig {
    fn default() -> Self {
        Self {
            num_perm: DEFAULT_NUM_PERM,
            seed: DEFAULT_SEED,
        }
    }
}

impl SketchConfig {
    /// Config with `num_perm` permutations and the default seed.
    pub fn with_num_perm(num_perm: usize) -> Self {
        Self {
            num_perm,
            ..Self::default()
        }
    }

    /// Derive the per-permutation seeds.
    pub fn permutation_seeds(&self) -> Vec<u64> {
        let mut seeds = Vec::with_capacity(self.num_perm);
        let mut rng_state = self.seed;
        for _ in 0..self.num_perm {
            // Knuth MMIX LCG
            rng_state = rng_state
                .wrapping_mul(6364136223846793005)
                .wrapping_add(1442695040888963407);
            seeds.push(rng_state);
        }
        seeds
    }

    pub fn validate(&self) -> Result<()> {
        if self.num_perm == 0 {
            return Err(SketchError::Validation("num_perm must be >= 1".into()));
        }
        Ok(())
    }
}

/// LSH forest shape: `trees` bands of `num_perm / trees` rows each.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForestParams {
    /// Number of prefix trees (bands).
    pub trees: usize,
}

impl Default for ForestParams {
    fn default() -> Self {
        Self { trees: 8 }
    }
}

impl ForestParams {
    /// Rows per tree for a given permutation count.
    pub fn rows(&self, num_perm: usize) -> Result<usize> {
        if self.trees == 0 || self.trees > num_perm || num_perm % self.trees != 0 {
            return Err(SketchError::Validation(format!(
                "forest trees ({}) must divide num_perm ({num_perm})",
                self.trees
            )));
        }
        Ok(num_perm / self.trees)
    }
}

/// Check that a similarity threshold lies strictly inside (0, 1).
pub fn validate_threshold(threshold: f64) -> Result<()> {
    if !(threshold > 0.0 && threshold < 1.0) {
        return Err(SketchError::Validation(format!(
            "threshold must be in (0, 1), got {threshold}"
        )));
    }
    Ok(())
}

/// Top-level configuration for [`crate::service::SimilarityService`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Directory holding sketch files and index artifacts.
    pub store_root: PathBuf,
    pub sketch: SketchConfig,
    pub forest: ForestParams,
    /// Threshold used when callers do not name one.
    pub default_threshold: f64,
    /// Maximum number of catalog columns per batch.
    pub catalog_limit: Option<usize>,
    /// Similarity matrices kept in memory; 0 disables the memory cache.
    pub matrix_cache_size: usize,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            store_root: PathBuf::from("results"),
            sketch: SketchConfig::default(),
            forest: ForestParams::default(),
            default_threshold: 0.5,
            catalog_limit: None,
            matrix_cache_size: DEFAULT_MATRIX_CACHE_SIZE,
        }
    }
}

impl ServiceConfig {
    /// Parse from TOML; missing fields take defaults.
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let config: Self = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a TOML file.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }

    /// Apply `COLSKETCH_STORE_ROOT` if set.
    #[must_use]
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(root) = std::env::var(STORE_ROOT_ENV) {
            if !root.is_empty() {
                self.store_root = PathBuf::from(root);
            }
        }
        self
    }

    pub fn validate(&self) -> Result<()> {
        self.sketch.validate()?;
        self.forest.rows(self.sketch.num_perm)?;
        validate_threshold(self.default_threshold)
    }
}
