//! Persistent sketch cache keyed by column.
//!
//! Each column's signature lives in its own blob named
//! `<table>.<column>.sketch` (see [`crate::catalog::ColumnKey::storage_name`]).
//! Writers to the same key are serialized by a per-key lock; readers and
//! writers to other keys proceed in parallel.

use crate::catalog::ColumnKey;
use crate::error::{Result, SketchError};
use crate::hash::MinHashSignature;
use crate::persistence::blob_store::BlobStore;
use crate::persistence::format::{decode_signature, encode_signature};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, instrument};

/// Blob name suffix for sketch files.
pub const SKETCH_SUFFIX: &str = ".sketch";

/// A stored signature and the permutation count it was built with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SketchRecord {
    pub key: ColumnKey,
    pub num_perm: usize,
    pub signature: MinHashSignature,
}

/// What [`SketchStore::put`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PutOutcome {
    Written,
    /// A record existed and overwrite was not requested.
    Skipped,
}

/// Column-keyed sketch persistence over any [`BlobStore`].
pub struct SketchStore {
    backend: Arc<dyn BlobStore>,
    write_locks: Mutex<HashMap<ColumnKey, Arc<Mutex<()>>>>,
}

impl std::fmt::Debug for SketchStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SketchStore").finish_non_exhaustive()
    }
}

impl SketchStore {
    pub fn new(backend: Arc<dyn BlobStore>) -> Self {
        Self {
            backend,
            write_locks: Mutex::new(HashMap::new()),
        }
    }

    /// Blob name holding `key`'s sketch.
    pub fn location(key: &ColumnKey) -> String {
        format!("{}{SKETCH_SUFFIX}", key.storage_name())
    }

    /// Persist `signature` for `key`.
    ///
    /// With `overwrite == false` an existing record is left untouched and the
    /// call reports [`PutOutcome::Skipped`]. That check is made by the backend
    /// at publish time, so it also holds against other processes sharing a
    /// [`crate::persistence::FileBlobStore`] root.
    #[instrument(skip(self, key, signature), fields(column = %key))]
    pub fn put(
        &self,
        key: &ColumnKey,
        signature: &MinHashSignature,
        overwrite: bool,
    ) -> Result<PutOutcome> {
        if signature.num_perm() == 0 {
            return Err(SketchError::Validation(
                "cannot store an empty signature".into(),
            ));
        }
        let name = Self::location(key);
        let bytes = encode_signature(signature);
        self.with_write_lock(key, || {
            if overwrite {
                self.backend.put(&name, &bytes)?;
            } else if !self.backend.put_if_absent(&name, &bytes)? {
                debug!("sketch exists, skipping");
                return Ok(PutOutcome::Skipped);
            }
            debug!(num_perm = signature.num_perm(), "sketch written");
            Ok(PutOutcome::Written)
        })
    }

    /// Load `key`'s record, or `NotFound`.
    pub fn get(&self, key: &ColumnKey) -> Result<SketchRecord> {
        let bytes = self
            .backend
            .get(&Self::location(key))?
            .ok_or_else(|| SketchError::NotFound(format!("no sketch stored for {key}")))?;
        let signature = decode_signature(&bytes)?;
        Ok(SketchRecord {
            key: key.clone(),
            num_perm: signature.num_perm(),
            signature,
        })
    }

    /// Load `key`'s record and require `num_perm` permutations.
    pub fn get_checked(&self, key: &ColumnKey, num_perm: usize) -> Result<SketchRecord> {
        let record = self.get(key)?;
        if record.num_perm != num_perm {
            return Err(SketchError::PermutationMismatch {
                expected: num_perm,
                actual: record.num_perm,
            });
        }
        Ok(record)
    }

    /// Load records for `keys` in order; the first failure aborts.
    pub fn get_many(
        &self,
        keys: &[ColumnKey],
        num_perm: usize,
    ) -> Result<Vec<(ColumnKey, MinHashSignature)>> {
        keys.iter()
            .map(|key| {
                self.get_checked(key, num_perm)
                    .map(|record| (record.key, record.signature))
            })
            .collect()
    }

    pub fn contains(&self, key: &ColumnKey) -> Result<bool> {
        self.backend.exists(&Self::location(key))
    }

    pub fn delete(&self, key: &ColumnKey) -> Result<()> {
        self.with_write_lock(key, || self.backend.delete(&Self::location(key)))
    }

    /// Number of stored sketch blobs.
    pub fn count(&self) -> Result<usize> {
        Ok(self.backend.list(SKETCH_SUFFIX)?.len())
    }

    /// Run `f` holding `key`'s write lock.
    ///
    /// Lock entries live only while some writer holds them, so the table
    /// stays as small as the number of keys being written concurrently.
    fn with_write_lock<T>(&self, key: &ColumnKey, f: impl FnOnce() -> Result<T>) -> Result<T> {
        let lock = Arc::clone(self.locks().entry(key.clone()).or_default());
        let result = {
            let _guard = match lock.lock() {
                Ok(guard) => guard,
                Err(poisoned) => {
                    tracing::warn!("sketch write lock was poisoned, recovering");
                    poisoned.into_inner()
                }
            };
            f()
        };

        let mut locks = self.locks();
        // One reference in the table, one here: nobody else is waiting.
        if Arc::strong_count(&lock) == 2 {
            locks.remove(key);
        }
        result
    }

    fn locks(&self) -> MutexGuard<'_, HashMap<ColumnKey, Arc<Mutex<()>>>> {
        match self.write_locks.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    #[cfg(test)]
    fn lock_table_len(&self) -> usize {
        self.locks().len()
    }
}
