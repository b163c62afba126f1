//! Banded MinHash LSH tuned for a single similarity threshold.
//!
//! `(bands, rows)` are chosen so the collision curve `1 - (1 - s^r)^b` is
//! close to a step at the threshold. Queries return every key sharing a band
//! bucket with the probe; that candidate set may include keys below the
//! threshold and can miss a few above it. [`ThresholdIndex::query_verified`]
//! re-scores candidates and filters explicitly.

use crate::catalog::ColumnKey;
use crate::config::validate_threshold;
use crate::error::{Result, SketchError};
use crate::hash::bands::{hash_band, optimal_params, BandParams};
use crate::hash::minhash::{agreement, MinHashSignature};
use crate::hash::{check_entries, Scored};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, HashSet};

/// Relative weights of false positives and false negatives when tuning bands.
pub const DEFAULT_WEIGHTS: (f64, f64) = (0.5, 0.5);

/// Immutable banded LSH index for one threshold.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThresholdIndex {
    threshold: f64,
    num_perm: usize,
    params: BandParams,
    keys: Vec<ColumnKey>,
    signatures: Vec<MinHashSignature>,
    positions: HashMap<ColumnKey, u32>,
    /// band idx -> (band hash -> entry ids)
    buckets: Vec<HashMap<u64, Vec<u32>>>,
}

impl ThresholdIndex {
    /// Build with the default false-positive/false-negative weighting.
    pub fn build<I>(records: I, num_perm: usize, threshold: f64) -> Result<Self>
    where
        I: IntoIterator<Item = (ColumnKey, MinHashSignature)>,
    {
        validate_threshold(threshold)?;
        if num_perm == 0 {
            return Err(SketchError::Validation("num_perm must be >= 1".into()));
        }
        let (fp, fn_) = DEFAULT_WEIGHTS;
        let params = optimal_params(threshold, num_perm, fp, fn_);
        Self::build_with_params(records, num_perm, threshold, params)
    }

    /// Build with explicit banding (`bands * rows <= num_perm`).
    pub fn build_with_params<I>(
        records: I,
        num_perm: usize,
        threshold: f64,
        params: BandParams,
    ) -> Result<Self>
    where
        I: IntoIterator<Item = (ColumnKey, MinHashSignature)>,
    {
        validate_threshold(threshold)?;
        if !params.fits(num_perm) {
            return Err(SketchError::Validation(format!(
                "bands ({}) x rows ({}) must be in 1..={num_perm}",
                params.bands, params.rows
            )));
        }

        let mut index = Self {
            threshold,
            num_perm,
            params,
            keys: Vec::new(),
            signatures: Vec::new(),
            positions: HashMap::new(),
            buckets: (0..params.bands).map(|_| HashMap::new()).collect(),
        };

        for (key, signature) in records {
            if signature.num_perm() != num_perm {
                return Err(SketchError::PermutationMismatch {
                    expected: num_perm,
                    actual: signature.num_perm(),
                });
            }
            let id = u32::try_from(index.keys.len())
                .map_err(|_| SketchError::Validation("too many entries for index".into()))?;
            if index.positions.insert(key.clone(), id).is_some() {
                return Err(SketchError::Validation(format!("duplicate key {key}")));
            }
            for (band_idx, bucket) in index.buckets.iter_mut().enumerate() {
                let band_hash = hash_band(params.band(signature.values(), band_idx));
                bucket.entry(band_hash).or_default().push(id);
            }
            index.keys.push(key);
            index.signatures.push(signature);
        }

        Ok(index)
    }

    /// Candidate keys sharing at least one band bucket with `probe`.
    pub fn query(&self, probe: &MinHashSignature) -> Result<BTreeSet<ColumnKey>> {
        Ok(self
            .candidate_ids(probe)?
            .into_iter()
            .map(|id| self.keys[id as usize].clone())
            .collect())
    }

    /// Query on behalf of a caller that expects `threshold`.
    ///
    /// Band parameters are threshold-specific, so a mismatch is an error
    /// rather than a silently wrong answer.
    pub fn query_for(
        &self,
        probe: &MinHashSignature,
        threshold: f64,
    ) -> Result<BTreeSet<ColumnKey>> {
        self.ensure_threshold(threshold)?;
        self.query(probe)
    }

    /// Candidates re-scored against `probe`, keeping those `>= threshold`.
    pub fn query_verified(&self, probe: &MinHashSignature) -> Result<Vec<Scored>> {
        let mut scored: Vec<Scored> = self
            .candidate_ids(probe)?
            .into_iter()
            .map(|id| Scored {
                key: self.keys[id as usize].clone(),
                similarity: agreement(probe.values(), self.signatures[id as usize].values()),
            })
            .filter(|s| s.similarity >= self.threshold)
            .collect();
        scored.sort_by(Scored::ranking);
        Ok(scored)
    }

    pub fn ensure_threshold(&self, threshold: f64) -> Result<()> {
        if (self.threshold - threshold).abs() > f64::EPSILON {
            return Err(SketchError::Validation(format!(
                "index built for threshold {} cannot answer threshold {threshold}",
                self.threshold
            )));
        }
        Ok(())
    }

    fn candidate_ids(&self, probe: &MinHashSignature) -> Result<HashSet<u32>> {
        if probe.num_perm() != self.num_perm {
            return Err(SketchError::PermutationMismatch {
                expected: self.num_perm,
                actual: probe.num_perm(),
            });
        }
        let mut candidates = HashSet::new();
        for (band_idx, bucket) in self.buckets.iter().enumerate() {
            let band_hash = hash_band(self.params.band(probe.values(), band_idx));
            if let Some(ids) = bucket.get(&band_hash) {
                candidates.extend(ids.iter().copied());
            }
        }
        Ok(candidates)
    }

    /// Stored signature of an indexed column.
    pub fn signature_of(&self, key: &ColumnKey) -> Option<&MinHashSignature> {
        self.positions
            .get(key)
            .map(|&id| &self.signatures[id as usize])
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn params(&self) -> BandParams {
        self.params
    }

    pub fn num_perm(&self) -> usize {
        self.num_perm
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Check internal consistency, as needed after decoding from storage.
    ///
    /// Violations are `Format` errors.
    pub fn verify(&self) -> Result<()> {
        let corrupt =
            |detail: String| SketchError::Format(format!("threshold index: {detail}"));
        validate_threshold(self.threshold).map_err(|e| corrupt(e.to_string()))?;
        if !self.params.fits(self.num_perm) {
            return Err(corrupt(format!(
                "{} bands x {} rows exceed {} permutations",
                self.params.bands, self.params.rows, self.num_perm
            )));
        }
        if self.buckets.len() != self.params.bands {
            return Err(corrupt(format!(
                "{} bucket tables, expected {}",
                self.buckets.len(),
                self.params.bands
            )));
        }
        check_entries(
            "threshold index",
            &self.keys,
            &self.signatures,
            &self.positions,
            self.num_perm,
        )?;

        let n = self.keys.len();
        let dangling = self
            .buckets
            .iter()
            .flat_map(|bucket| bucket.values().flatten())
            .any(|&id| id as usize >= n);
        if dangling {
            return Err(corrupt("bucket refers to a missing entry".into()));
        }
        Ok(())
    }
}
