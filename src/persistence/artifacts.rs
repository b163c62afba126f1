//! Persisted index and matrix artifacts.
//!
//! Built structures are cached next to the sketches so a restart can reload
//! rather than rebuild. Names:
//!
//! - `forest.idx`
//! - `lsh_<threshold>.idx` (one per threshold)
//! - `matrix_<snapshot>.mat`
//!
//! Each artifact records the [`SketchConfig`] it was built under. A load
//! under a different configuration reports no artifact, since signatures
//! from different permutation seeds are not comparable.

use crate::config::SketchConfig;
use crate::error::Result;
use crate::hash::{ForestIndex, ThresholdIndex};
use crate::matrix::{SimilarityMatrix, SnapshotId};
use crate::persistence::blob_store::BlobStore;
use crate::persistence::format::{decode_artifact, encode_artifact};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use tracing::debug;

/// Blob suffix for cached similarity matrices.
pub const MATRIX_SUFFIX: &str = ".mat";

pub fn forest_artifact() -> String {
    "forest.idx".to_string()
}

pub fn threshold_artifact(threshold: f64) -> String {
    format!("lsh_{threshold}.idx")
}

pub fn matrix_artifact(snapshot: SnapshotId) -> String {
    format!("matrix_{}{MATRIX_SUFFIX}", snapshot.to_hex())
}

/// A structure that can be cached as an artifact.
pub trait Artifact: Serialize + DeserializeOwned {
    /// Reject decoded values that are internally inconsistent.
    fn verify(&self) -> Result<()>;
}

impl Artifact for ForestIndex {
    fn verify(&self) -> Result<()> {
        ForestIndex::verify(self)
    }
}

impl Artifact for ThresholdIndex {
    fn verify(&self) -> Result<()> {
        ThresholdIndex::verify(self)
    }
}

impl Artifact for SimilarityMatrix {
    fn verify(&self) -> Result<()> {
        SimilarityMatrix::verify(self)
    }
}

/// Typed load/save over a [`BlobStore`], bound to one sketch configuration.
#[derive(Clone)]
pub struct ArtifactStore {
    backend: Arc<dyn BlobStore>,
    sketch: SketchConfig,
}

impl ArtifactStore {
    pub fn new(backend: Arc<dyn BlobStore>, sketch: SketchConfig) -> Self {
        Self { backend, sketch }
    }

    /// Encode and publish `value` under `name` (atomic per backend contract).
    pub fn save<T: Artifact>(&self, name: &str, value: &T) -> Result<()> {
        let bytes = encode_artifact(&(self.sketch, value))?;
        self.backend.put(name, &bytes)
    }

    /// `Ok(None)` when no artifact exists or it was built under another
    /// sketch configuration. Undecodable or inconsistent bytes are errors.
    pub fn load<T: Artifact>(&self, name: &str) -> Result<Option<T>> {
        let Some(bytes) = self.backend.get(name)? else {
            return Ok(None);
        };
        let (sketch, value): (SketchConfig, T) = decode_artifact(&bytes)?;
        if sketch != self.sketch {
            debug!(artifact = name, ?sketch, "artifact built under another sketch config");
            return Ok(None);
        }
        value.verify()?;
        Ok(Some(value))
    }

    pub fn remove(&self, name: &str) -> Result<()> {
        self.backend.delete(name)
    }

    /// Names of all stored matrix artifacts.
    pub fn matrices(&self) -> Result<Vec<String>> {
        self.backend.list(MATRIX_SUFFIX)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::ColumnKey;
    use crate::config::ForestParams;
    use crate::error::SketchError;
    use crate::hash::MinHashSignature;
    use crate::persistence::blob_store::MemoryBlobStore;

    fn forest() -> (ForestIndex, MinHashSignature, ColumnKey) {
        let sig = MinHashSignature::from_values((0..16).collect());
        let key = ColumnKey::new("t", "c").unwrap();
        let forest =
            ForestIndex::build(vec![(key.clone(), sig.clone())], 16, ForestParams { trees: 4 })
                .unwrap();
        (forest, sig, key)
    }

    #[test]
    fn test_names() {
        assert_eq!(threshold_artifact(0.5), "lsh_0.5.idx");
        assert_eq!(threshold_artifact(0.75), "lsh_0.75.idx");
        assert!(matrix_artifact(SnapshotId(1)).starts_with("matrix_0000"));
        assert!(matrix_artifact(SnapshotId(1)).ends_with(MATRIX_SUFFIX));
    }

    #[test]
    fn test_forest_survives_reload() {
        let store = ArtifactStore::new(Arc::new(MemoryBlobStore::new()), SketchConfig::default());
        let (forest, sig, key) = forest();

        store.save(&forest_artifact(), &forest).unwrap();
        let loaded: ForestIndex = store.load(&forest_artifact()).unwrap().unwrap();
        assert_eq!(loaded.query(&sig, 1).unwrap(), vec![key]);

        store.remove(&forest_artifact()).unwrap();
        assert!(store.load::<ForestIndex>(&forest_artifact()).unwrap().is_none());
    }

    #[test]
    fn test_other_seed_is_not_reused() {
        let backend: Arc<dyn BlobStore> = Arc::new(MemoryBlobStore::new());
        let writer = ArtifactStore::new(Arc::clone(&backend), SketchConfig::default());
        let reader = ArtifactStore::new(
            backend,
            SketchConfig {
                seed: 99,
                ..SketchConfig::default()
            },
        );
        let (forest, _, _) = forest();

        writer.save(&forest_artifact(), &forest).unwrap();
        assert!(writer.load::<ForestIndex>(&forest_artifact()).unwrap().is_some());
        assert!(reader.load::<ForestIndex>(&forest_artifact()).unwrap().is_none());
    }

    /// Same wire layout as [`SimilarityMatrix`], without its invariants.
    #[derive(Serialize)]
    struct LooseMatrix {
        snapshot: u64,
        keys: Vec<ColumnKey>,
        positions: std::collections::HashMap<ColumnKey, usize>,
        values: Vec<f64>,
    }

    #[test]
    fn test_inconsistent_artifact_is_format_error() {
        let backend: Arc<dyn BlobStore> = Arc::new(MemoryBlobStore::new());
        let store = ArtifactStore::new(Arc::clone(&backend), SketchConfig::default());

        let key = ColumnKey::new("t", "c").unwrap();
        let loose = LooseMatrix {
            snapshot: 1,
            keys: vec![key.clone()],
            positions: [(key, 0)].into_iter().collect(),
            values: vec![1.0, 0.5, 0.5],
        };
        let bytes = encode_artifact(&(SketchConfig::default(), &loose)).unwrap();
        backend.put("m.mat", &bytes).unwrap();

        assert_eq!(store.matrices().unwrap(), vec!["m.mat".to_string()]);
        assert!(matches!(
            store.load::<SimilarityMatrix>("m.mat"),
            Err(SketchError::Format(_))
        ));
    }
}
