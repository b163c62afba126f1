//! The externally visible surface: `top_k`, `similar_to`, `pairwise_matrix`.
//!
//! A [`SimilarityService`] ties the pieces together:
//!
//! ```text
//! ValueSource ──> tokenize ──> MinHasher ──> SketchStore
//!                                               │
//!                      ┌────────────────────────┼─────────────────────┐
//!                      v                        v                     v
//!                 ForestIndex            ThresholdIndex        SimilarityMatrix
//! ```
//!
//! Sketch refresh is parallel across columns and reports failures per column.
//! Index builds read sketches only, write their artifact, and then publish the
//! new structure by swapping an `Arc`; queries clone the `Arc` and run without
//! locks or I/O.

use crate::catalog::{ColumnCatalog, ColumnInfo, ColumnKey, ColumnType, ValueSource};
use crate::config::{validate_threshold, ServiceConfig};
use crate::error::{Result, SketchError};
use crate::hash::{tokenize, ForestIndex, MinHasher, Scored, ThresholdIndex};
use crate::matrix::{SimilarityMatrix, SnapshotId};
use crate::persistence::artifacts::{
    forest_artifact, matrix_artifact, threshold_artifact, Artifact,
};
use crate::persistence::{ArtifactStore, BlobStore, FileBlobStore, PutOutcome, SketchStore};
use rayon::prelude::*;
use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, info, instrument, warn};

/// Outcome of a sketch refresh batch.
#[derive(Debug, Default)]
pub struct BatchReport {
    pub written: Vec<ColumnKey>,
    pub skipped: Vec<ColumnKey>,
    pub failed: Vec<(ColumnKey, SketchError)>,
}

impl BatchReport {
    /// True when no column failed.
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Sketch cache plus published indexes.
pub struct SimilarityService {
    config: ServiceConfig,
    hasher: MinHasher,
    sketches: SketchStore,
    artifacts: ArtifactStore,
    source: Arc<dyn ValueSource>,
    catalog: Arc<dyn ColumnCatalog>,
    forest: RwLock<Option<Arc<ForestIndex>>>,
    /// Keyed by `threshold.to_bits()`.
    thresholds: RwLock<HashMap<u64, Arc<ThresholdIndex>>>,
    /// Most recent first, at most `matrix_cache_size` entries.
    matrices: RwLock<VecDeque<(SnapshotId, Arc<SimilarityMatrix>)>>,
}

impl std::fmt::Debug for SimilarityService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimilarityService")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    match lock.read() {
        Ok(guard) => guard,
        Err(poisoned) => {
            warn!("service lock was poisoned, recovering");
            poisoned.into_inner()
        }
    }
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    match lock.write() {
        Ok(guard) => guard,
        Err(poisoned) => {
            warn!("service lock was poisoned, recovering");
            poisoned.into_inner()
        }
    }
}

impl SimilarityService {
    /// Service over an explicit storage backend.
    pub fn new(
        config: ServiceConfig,
        backend: Arc<dyn BlobStore>,
        source: Arc<dyn ValueSource>,
        catalog: Arc<dyn ColumnCatalog>,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            hasher: MinHasher::new(config.sketch)?,
            sketches: SketchStore::new(Arc::clone(&backend)),
            artifacts: ArtifactStore::new(backend, config.sketch),
            source,
            catalog,
            config,
            forest: RwLock::new(None),
            thresholds: RwLock::new(HashMap::new()),
            matrices: RwLock::new(VecDeque::new()),
        })
    }

    /// Service storing files under `config.store_root`.
    pub fn open(
        config: ServiceConfig,
        source: Arc<dyn ValueSource>,
        catalog: Arc<dyn ColumnCatalog>,
    ) -> Result<Self> {
        let backend = Arc::new(FileBlobStore::new(&config.store_root)?);
        Self::new(config, backend, source, catalog)
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    pub fn sketches(&self) -> &SketchStore {
        &self.sketches
    }

    pub fn hasher(&self) -> &MinHasher {
        &self.hasher
    }

    /// String columns from the catalog, capped by `catalog_limit`.
    pub fn string_columns(&self) -> Result<Vec<ColumnInfo>> {
        self.catalog
            .list_columns(Some(&ColumnType::String), self.config.catalog_limit)
    }

    // -------------------------------------------------------------------------
    // Sketch building
    // -------------------------------------------------------------------------

    /// Fetch, tokenize, sketch and store one column.
    ///
    /// Without `overwrite`, a column that already has a sketch is skipped
    /// before any value fetch happens.
    #[instrument(skip(self, info), fields(column = %info.key))]
    pub fn sketch_column(&self, info: &ColumnInfo, overwrite: bool) -> Result<PutOutcome> {
        if !info.column_type.is_tokenizable() {
            return Err(SketchError::Validation(format!(
                "column {} has type {:?}; only string columns can be sketched",
                info.key, info.column_type
            )));
        }
        if !overwrite && self.sketches.contains(&info.key)? {
            debug!("sketch cached");
            return Ok(PutOutcome::Skipped);
        }

        let values = self
            .source
            .fetch_distinct_values(&info.key)
            .map_err(|e| match e {
                SketchError::Build { .. } => e,
                other => SketchError::Build {
                    column: info.key.to_string(),
                    reason: other.to_string(),
                },
            })?;
        let tokens = tokenize(values);
        if tokens.is_empty() {
            warn!("column has no tokens; storing empty-set sketch");
        }
        let signature = self.hasher.signature(&tokens);
        self.sketches.put(&info.key, &signature, overwrite)
    }

    /// Sketch every column in parallel; failures are collected, not fatal.
    #[instrument(skip(self, columns), fields(columns = columns.len()))]
    pub fn refresh_sketches(&self, columns: &[ColumnInfo], overwrite: bool) -> BatchReport {
        let outcomes: Vec<(ColumnKey, Result<PutOutcome>)> = columns
            .par_iter()
            .map(|info| (info.key.clone(), self.sketch_column(info, overwrite)))
            .collect();

        let mut report = BatchReport::default();
        for (key, outcome) in outcomes {
            match outcome {
                Ok(PutOutcome::Written) => report.written.push(key),
                Ok(PutOutcome::Skipped) => report.skipped.push(key),
                Err(e) => {
                    warn!(column = %key, error = %e, "sketch build failed");
                    report.failed.push((key, e));
                }
            }
        }
        info!(
            written = report.written.len(),
            skipped = report.skipped.len(),
            failed = report.failed.len(),
            "sketch refresh finished"
        );
        report
    }

    // -------------------------------------------------------------------------
    // Index builds
    // -------------------------------------------------------------------------

    /// Build (or reload) the forest over `columns` and publish it.
    #[instrument(skip(self, columns), fields(columns = columns.len()))]
    pub fn build_forest(&self, columns: &[ColumnKey], overwrite: bool) -> Result<Arc<ForestIndex>> {
        let name = forest_artifact();
        let num_perm = self.config.sketch.num_perm;

        let cached = if overwrite {
            None
        } else {
            self.load_cached::<ForestIndex>(&name)?.filter(|forest| {
                forest.num_perm() == num_perm
                    && forest.params().bands == self.config.forest.trees
                    && forest.keys() == columns
            })
        };

        let forest = match cached {
            Some(forest) => {
                debug!("forest loaded from artifact");
                forest
            }
            None => {
                let records = self.sketches.get_many(columns, num_perm)?;
                let forest = ForestIndex::build(records, num_perm, self.config.forest)?;
                self.artifacts.save(&name, &forest)?;
                info!(entries = forest.len(), "forest index built");
                forest
            }
        };

        let forest = Arc::new(forest);
        *write(&self.forest) = Some(Arc::clone(&forest));
        Ok(forest)
    }

    /// Build (or reload) the threshold index for `threshold` and publish it.
    #[instrument(skip(self, columns), fields(columns = columns.len()))]
    pub fn build_threshold_index(
        &self,
        columns: &[ColumnKey],
        threshold: f64,
        overwrite: bool,
    ) -> Result<Arc<ThresholdIndex>> {
        validate_threshold(threshold)?;
        let name = threshold_artifact(threshold);
        let num_perm = self.config.sketch.num_perm;

        let cached = if overwrite {
            None
        } else {
            self.load_cached::<ThresholdIndex>(&name)?.filter(|index| {
                index.num_perm() == num_perm
                    && index.ensure_threshold(threshold).is_ok()
                    && index.len() == columns.len()
                    && columns.iter().all(|key| index.signature_of(key).is_some())
            })
        };

        let index = match cached {
            Some(index) => {
                debug!("threshold index loaded from artifact");
                index
            }
            None => {
                let records = self.sketches.get_many(columns, num_perm)?;
                let index = ThresholdIndex::build(records, num_perm, threshold)?;
                self.artifacts.save(&name, &index)?;
                info!(
                    entries = index.len(),
                    bands = index.params().bands,
                    rows = index.params().rows,
                    "threshold index built"
                );
                index
            }
        };

        let index = Arc::new(index);
        write(&self.thresholds).insert(threshold.to_bits(), Arc::clone(&index));
        Ok(index)
    }

    /// Load an artifact, treating undecodable or inconsistent bytes as absent.
    fn load_cached<T: Artifact>(&self, name: &str) -> Result<Option<T>> {
        match self.artifacts.load::<T>(name) {
            Ok(found) => Ok(found),
            Err(e @ (SketchError::Format(_) | SketchError::Serialization(_))) => {
                warn!(artifact = name, error = %e, "discarding unreadable artifact");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    // -------------------------------------------------------------------------
    // Queries
    // -------------------------------------------------------------------------

    /// The published forest, or `NotFound`.
    pub fn forest(&self) -> Result<Arc<ForestIndex>> {
        read(&self.forest)
            .clone()
            .ok_or_else(|| SketchError::NotFound("forest index has not been built".into()))
    }

    /// The published threshold index for `threshold`, or `NotFound`.
    pub fn threshold_index(&self, threshold: f64) -> Result<Arc<ThresholdIndex>> {
        validate_threshold(threshold)?;
        read(&self.thresholds)
            .get(&threshold.to_bits())
            .cloned()
            .ok_or_else(|| {
                SketchError::NotFound(format!("no threshold index built for {threshold}"))
            })
    }

    /// Top-`k` columns most similar to `column` (the column itself included).
    pub fn top_k(&self, column: &ColumnKey, k: usize) -> Result<Vec<Scored>> {
        let forest = self.forest()?;
        let probe = forest
            .signature_of(column)
            .ok_or_else(|| SketchError::NotFound(format!("{column} is not in the forest index")))?;
        forest.query_scored(probe, k)
    }

    /// Candidate columns likely above `threshold` in similarity to `column`.
    pub fn similar_to(&self, column: &ColumnKey, threshold: f64) -> Result<BTreeSet<ColumnKey>> {
        let index = self.threshold_index(threshold)?;
        let probe = index.signature_of(column).ok_or_else(|| {
            SketchError::NotFound(format!("{column} is not in the threshold index"))
        })?;
        index.query_for(probe, threshold)
    }

    /// Like [`SimilarityService::similar_to`], re-scored and filtered to `>= threshold`.
    pub fn similar_to_verified(&self, column: &ColumnKey, threshold: f64) -> Result<Vec<Scored>> {
        let index = self.threshold_index(threshold)?;
        let probe = index.signature_of(column).ok_or_else(|| {
            SketchError::NotFound(format!("{column} is not in the threshold index"))
        })?;
        index.query_verified(probe)
    }

    /// Pairwise matrix over `columns`, cached by snapshot.
    #[instrument(skip(self, columns), fields(columns = columns.len()))]
    pub fn pairwise_matrix(&self, columns: &[ColumnKey]) -> Result<Arc<SimilarityMatrix>> {
        let records = self
            .sketches
            .get_many(columns, self.config.sketch.num_perm)?;
        let snapshot = SnapshotId::of(&records);

        let cached = read(&self.matrices)
            .iter()
            .find(|(id, _)| *id == snapshot)
            .map(|(_, matrix)| Arc::clone(matrix));
        if let Some(matrix) = cached {
            debug!("matrix served from memory");
            return Ok(matrix);
        }

        let name = matrix_artifact(snapshot);
        let matrix = match self
            .load_cached::<SimilarityMatrix>(&name)?
            .filter(|m| m.snapshot() == snapshot)
        {
            Some(matrix) => {
                debug!("matrix loaded from artifact");
                matrix
            }
            None => {
                let matrix = SimilarityMatrix::compute(&records)?;
                self.artifacts.save(&name, &matrix)?;
                info!(size = matrix.len(), "similarity matrix computed");
                matrix
            }
        };

        let matrix = Arc::new(matrix);
        self.remember_matrix(snapshot, Arc::clone(&matrix));
        Ok(matrix)
    }

    fn remember_matrix(&self, snapshot: SnapshotId, matrix: Arc<SimilarityMatrix>) {
        let capacity = self.config.matrix_cache_size;
        if capacity == 0 {
            return;
        }
        let mut matrices = write(&self.matrices);
        matrices.retain(|(id, _)| *id != snapshot);
        matrices.push_front((snapshot, matrix));
        matrices.truncate(capacity);
    }

    /// Drop every in-memory matrix; artifacts on storage are kept.
    pub fn evict_matrices(&self) {
        write(&self.matrices).clear();
    }

    /// Delete cached matrices, in memory and on storage, except `keep`.
    ///
    /// Returns the number of artifacts removed.
    #[instrument(skip(self, keep), fields(keep = keep.len()))]
    pub fn prune_matrices(&self, keep: &[SnapshotId]) -> Result<usize> {
        let keep_names: HashSet<String> = keep.iter().map(|&id| matrix_artifact(id)).collect();
        write(&self.matrices).retain(|(id, _)| keep.contains(id));

        let mut removed = 0;
        for name in self.artifacts.matrices()? {
            if !keep_names.contains(&name) {
                self.artifacts.remove(&name)?;
                removed += 1;
            }
        }
        info!(removed, "matrix artifacts pruned");
        Ok(removed)
    }
}
