//! LSH forest for ranked top-k retrieval.
//!
//! The signature is split into `trees` bands of `rows` values. Each tree keeps
//! its entries sorted by band, which makes every prefix of a band a bucket:
//! entries sharing the probe's first `r` band values form one contiguous run.
//! A query starts at the full band (`r = rows`, the finest buckets) and
//! shortens the prefix until it has gathered `k` candidates, then ranks the
//! candidates by estimated Jaccard.
//!
//! # References
//!
//! - Bawa, Condie & Ganesan (2005). "LSH Forest: Self-tuning indexes for
//!   similarity search"

use crate::catalog::ColumnKey;
use crate::config::ForestParams;
use crate::error::{Result, SketchError};
use crate::hash::bands::BandParams;
use crate::hash::minhash::{agreement, MinHashSignature};
use crate::hash::{check_entries, Scored};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::collections::{HashMap, HashSet};

type BandPrefix = SmallVec<[u64; 16]>;

/// Immutable LSH forest over column signatures.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForestIndex {
    num_perm: usize,
    params: BandParams,
    keys: Vec<ColumnKey>,
    signatures: Vec<MinHashSignature>,
    positions: HashMap<ColumnKey, u32>,
    /// Per tree: `(band, entry id)` sorted by band, then id.
    trees: Vec<Vec<(BandPrefix, u32)>>,
}

impl ForestIndex {
    /// Build a forest from `(key, signature)` records.
    ///
    /// Every signature must have `num_perm` values and every key must be
    /// unique; any violation fails the whole build.
    pub fn build<I>(records: I, num_perm: usize, forest: ForestParams) -> Result<Self>
    where
        I: IntoIterator<Item = (ColumnKey, MinHashSignature)>,
    {
        let rows = forest.rows(num_perm)?;
        let params = BandParams {
            bands: forest.trees,
            rows,
        };

        let mut keys = Vec::new();
        let mut signatures = Vec::new();
        let mut positions = HashMap::new();
        for (key, signature) in records {
            if signature.num_perm() != num_perm {
                return Err(SketchError::PermutationMismatch {
                    expected: num_perm,
                    actual: signature.num_perm(),
                });
            }
            let id = u32::try_from(keys.len())
                .map_err(|_| SketchError::Validation("too many entries for forest".into()))?;
            if positions.insert(key.clone(), id).is_some() {
                return Err(SketchError::Validation(format!("duplicate key {key}")));
            }
            keys.push(key);
            signatures.push(signature);
        }

        let trees = (0..params.bands)
            .into_par_iter()
            .map(|tree| {
                let mut entries: Vec<(BandPrefix, u32)> = signatures
                    .iter()
                    .enumerate()
                    .map(|(id, sig)| {
                        (
                            BandPrefix::from_slice(params.band(sig.values(), tree)),
                            id as u32,
                        )
                    })
                    .collect();
                entries.sort_unstable();
                entries
            })
            .collect();

        Ok(Self {
            num_perm,
            params,
            keys,
            signatures,
            positions,
            trees,
        })
    }

    /// Top-`k` keys most similar to `probe`, best first.
    pub fn query(&self, probe: &MinHashSignature, k: usize) -> Result<Vec<ColumnKey>> {
        Ok(self
            .query_scored(probe, k)?
            .into_iter()
            .map(|scored| scored.key)
            .collect())
    }

    /// Top-`k` with estimated similarities; ties broken by key order.
    ///
    /// Returns fewer than `k` results only when the index holds fewer than
    /// `k` entries.
    pub fn query_scored(&self, probe: &MinHashSignature, k: usize) -> Result<Vec<Scored>> {
        if probe.num_perm() != self.num_perm {
            return Err(SketchError::PermutationMismatch {
                expected: self.num_perm,
                actual: probe.num_perm(),
            });
        }
        if k == 0 || self.keys.is_empty() {
            return Ok(Vec::new());
        }

        let mut candidates: HashSet<u32> = HashSet::new();
        for prefix_len in (1..=self.params.rows).rev() {
            for (tree, entries) in self.trees.iter().enumerate() {
                let prefix = &self.params.band(probe.values(), tree)[..prefix_len];
                candidates.extend(prefix_run(entries, prefix).iter().map(|(_, id)| *id));
            }
            if candidates.len() >= k {
                break;
            }
        }
        if candidates.len() < k {
            // Sparse neighbourhood: rank everything so the caller still gets k.
            candidates.extend(0..self.keys.len() as u32);
        }

        let mut scored: Vec<Scored> = candidates
            .into_iter()
            .map(|id| Scored {
                key: self.keys[id as usize].clone(),
                similarity: agreement(probe.values(), self.signatures[id as usize].values()),
            })
            .collect();
        scored.sort_by(Scored::ranking);
        scored.truncate(k);
        Ok(scored)
    }

    /// Stored signature of an indexed column.
    pub fn signature_of(&self, key: &ColumnKey) -> Option<&MinHashSignature> {
        self.positions
            .get(key)
            .map(|&id| &self.signatures[id as usize])
    }

    pub fn contains(&self, key: &ColumnKey) -> bool {
        self.positions.contains_key(key)
    }

    pub fn keys(&self) -> &[ColumnKey] {
        &self.keys
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn num_perm(&self) -> usize {
        self.num_perm
    }

    pub fn params(&self) -> BandParams {
        self.params
    }

    /// Check internal consistency, as needed after decoding from storage.
    ///
    /// Every id must name an entry, every band must have `rows` values and
    /// every tree must be sorted; otherwise queries could index out of range
    /// or miss runs. Violations are `Format` errors.
    pub fn verify(&self) -> Result<()> {
        let corrupt = |detail: String| SketchError::Format(format!("forest index: {detail}"));
        let BandParams { bands, rows } = self.params;
        if bands == 0 || rows == 0 || bands.checked_mul(rows) != Some(self.num_perm) {
            return Err(corrupt(format!(
                "{bands} trees x {rows} rows does not cover {} permutations",
                self.num_perm
            )));
        }
        if self.trees.len() != bands {
            return Err(corrupt(format!("{} trees, expected {bands}", self.trees.len())));
        }
        check_entries(
            "forest index",
            &self.keys,
            &self.signatures,
            &self.positions,
            self.num_perm,
        )?;

        let n = self.keys.len();
        for (tree, entries) in self.trees.iter().enumerate() {
            if entries.len() != n {
                return Err(corrupt(format!("tree {tree} has {} entries", entries.len())));
            }
            if entries.iter().any(|(band, id)| band.len() != rows || *id as usize >= n) {
                return Err(corrupt(format!("tree {tree} has a malformed entry")));
            }
            if entries.windows(2).any(|w| w[0] > w[1]) {
                return Err(corrupt(format!("tree {tree} is not sorted")));
            }
        }
        Ok(())
    }
}

/// Contiguous run of entries whose band starts with `prefix`.
fn prefix_run<'a>(entries: &'a [(BandPrefix, u32)], prefix: &[u64]) -> &'a [(BandPrefix, u32)] {
    let n = prefix.len();
    let start = entries.partition_point(|(band, _)| &band[..n] < prefix);
    let end = entries.partition_point(|(band, _)| &band[..n] <= prefix);
    &entries[start..end]
}
