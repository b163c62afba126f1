//! Pairwise similarity matrix over a fixed, ordered column set.
//!
//! Used for inspection and validation, not for serving queries: it costs
//! `O(n² · P)` to compute. A [`SnapshotId`] fingerprints the exact inputs
//! (keys, order, and signature contents) so the result can be cached.

use crate::catalog::ColumnKey;
use crate::error::{Result, SketchError};
use crate::hash::minhash::{agreement, MinHashSignature};
use crate::hash::Scored;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use xxhash_rust::xxh3::Xxh3;

/// Fingerprint of an ordered `(key, signature)` list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SnapshotId(pub u64);

impl SnapshotId {
    pub fn of(records: &[(ColumnKey, MinHashSignature)]) -> Self {
        let mut hasher = Xxh3::new();
        for (key, signature) in records {
            hasher.update(key.table().as_bytes());
            hasher.update(&[0]);
            hasher.update(key.column().as_bytes());
            hasher.update(&[0]);
            for v in signature.values() {
                hasher.update(&v.to_le_bytes());
            }
        }
        Self(hasher.digest())
    }

    pub fn to_hex(self) -> String {
        hex::encode(self.0.to_be_bytes())
    }
}

/// Symmetric `n × n` matrix of estimated Jaccard similarities.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimilarityMatrix {
    snapshot: SnapshotId,
    keys: Vec<ColumnKey>,
    positions: HashMap<ColumnKey, usize>,
    /// Row-major, `n * n`.
    values: Vec<f64>,
}

impl SimilarityMatrix {
    /// Compute every pair, including the diagonal.
    pub fn compute(records: &[(ColumnKey, MinHashSignature)]) -> Result<Self> {
        let n = records.len();
        let mut positions = HashMap::with_capacity(n);
        for (i, (key, signature)) in records.iter().enumerate() {
            if let Some((_, first)) = records.first() {
                first.check_compatible(signature)?;
            }
            if positions.insert(key.clone(), i).is_some() {
                return Err(SketchError::Validation(format!("duplicate key {key}")));
            }
        }

        // Upper triangle per row in parallel, mirrored afterwards.
        let upper: Vec<Vec<f64>> = (0..n)
            .into_par_iter()
            .map(|i| {
                let a = records[i].1.values();
                (i..n)
                    .map(|j| agreement(a, records[j].1.values()))
                    .collect()
            })
            .collect();

        let mut values = vec![0.0; n * n];
        for (i, row) in upper.iter().enumerate() {
            for (offset, &sim) in row.iter().enumerate() {
                let j = i + offset;
                values[i * n + j] = sim;
                values[j * n + i] = sim;
            }
        }
        for i in 0..n {
            values[i * n + i] = 1.0;
        }

        Ok(Self {
            snapshot: SnapshotId::of(records),
            keys: records.iter().map(|(k, _)| k.clone()).collect(),
            positions,
            values,
        })
    }

    /// Similarity between two columns of this matrix.
    pub fn get(&self, a: &ColumnKey, b: &ColumnKey) -> Result<f64> {
        let i = self.position(a)?;
        let j = self.position(b)?;
        Ok(self.values[i * self.len() + j])
    }

    /// Row for `key`, aligned with [`SimilarityMatrix::keys`].
    pub fn row(&self, key: &ColumnKey) -> Result<&[f64]> {
        let n = self.len();
        let i = self.position(key)?;
        Ok(&self.values[i * n..(i + 1) * n])
    }

    /// The `k` highest entries of `key`'s row (the column itself included).
    pub fn top_k(&self, key: &ColumnKey, k: usize) -> Result<Vec<Scored>> {
        let mut scored = self.scored_row(key)?;
        scored.sort_by(Scored::ranking);
        scored.truncate(k);
        Ok(scored)
    }

    /// Columns whose similarity to `key` is strictly greater than `threshold`.
    pub fn above_threshold(&self, key: &ColumnKey, threshold: f64) -> Result<Vec<Scored>> {
        let mut scored: Vec<Scored> = self
            .scored_row(key)?
            .into_iter()
            .filter(|s| s.similarity > threshold)
            .collect();
        scored.sort_by(Scored::ranking);
        Ok(scored)
    }

    fn scored_row(&self, key: &ColumnKey) -> Result<Vec<Scored>> {
        Ok(self
            .row(key)?
            .iter()
            .zip(&self.keys)
            .map(|(&similarity, key)| Scored {
                key: key.clone(),
                similarity,
            })
            .collect())
    }

    fn position(&self, key: &ColumnKey) -> Result<usize> {
        self.positions
            .get(key)
            .copied()
            .ok_or_else(|| SketchError::NotFound(format!("{key} is not in the similarity matrix")))
    }

    pub fn keys(&self) -> &[ColumnKey] {
        &self.keys
    }

    pub fn snapshot(&self) -> SnapshotId {
        self.snapshot
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Check that the value table and key positions agree, as needed after
    /// decoding from storage. Violations are `Format` errors.
    pub fn verify(&self) -> Result<()> {
        let n = self.keys.len();
        if n.checked_mul(n) != Some(self.values.len()) {
            return Err(SketchError::Format(format!(
                "similarity matrix: {} values for {n} keys",
                self.values.len()
            )));
        }
        let positions_match = self.positions.len() == n
            && self
                .positions
                .iter()
                .all(|(key, &i)| self.keys.get(i) == Some(key));
        if !positions_match {
            return Err(SketchError::Format(
                "similarity matrix: key positions do not match keys".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(c: &str) -> ColumnKey {
        ColumnKey::new("t", c).unwrap()
    }

    fn sig(values: &[u64]) -> MinHashSignature {
        MinHashSignature::from_values(values.to_vec())
    }

    fn sample() -> Vec<(ColumnKey, MinHashSignature)> {
        vec![
            (key("a"), sig(&[1, 2, 3, 4])),
            (key("b"), sig(&[1, 2, 9, 9])),
            (key("c"), sig(&[5, 6, 7, 8])),
        ]
    }

    #[test]
    fn test_symmetric_with_unit_diagonal() {
        let m = SimilarityMatrix::compute(&sample()).unwrap();
        assert_eq!(m.len(), 3);
        for a in m.keys() {
            assert_eq!(m.get(a, a).unwrap(), 1.0);
            for b in m.keys() {
                assert_eq!(m.get(a, b).unwrap(), m.get(b, a).unwrap());
            }
        }
        assert_eq!(m.get(&key("a"), &key("b")).unwrap(), 0.5);
        assert_eq!(m.get(&key("a"), &key("c")).unwrap(), 0.0);
    }

    #[test]
    fn test_lookups() {
        let m = SimilarityMatrix::compute(&sample()).unwrap();
        let top = m.top_k(&key("a"), 2).unwrap();
        assert_eq!(top[0].key, key("a"));
        assert_eq!(top[1].key, key("b"));

        let above = m.above_threshold(&key("b"), 0.5).unwrap();
        assert_eq!(above.len(), 1); // strictly greater: only b itself

        assert!(m.get(&key("a"), &key("zz")).unwrap_err().is_not_found());
    }

    #[test]
    fn test_snapshot_tracks_content_and_order() {
        let records = sample();
        let mut reordered = records.clone();
        reordered.swap(0, 1);
        let mut changed = records.clone();
        changed[2].1 = sig(&[5, 6, 7, 0]);

        let id = SnapshotId::of(&records);
        assert_eq!(id, SnapshotId::of(&sample()));
        assert_ne!(id, SnapshotId::of(&reordered));
        assert_ne!(id, SnapshotId::of(&changed));
        assert_eq!(id.to_hex().len(), 16);
    }

    #[test]
    fn test_rejects_mismatch_and_duplicates() {
        let mut records = sample();
        records.push((key("d"), sig(&[1, 2])));
        assert!(SimilarityMatrix::compute(&records).unwrap_err().is_validation());

        let dup = vec![(key("a"), sig(&[1])), (key("a"), sig(&[1]))];
        assert!(SimilarityMatrix::compute(&dup).unwrap_err().is_validation());
    }

    #[test]
    fn test_verify() {
        let m = SimilarityMatrix::compute(&sample()).unwrap();
        m.verify().unwrap();

        let mut truncated = m.clone();
        truncated.values.pop();
        assert!(matches!(truncated.verify(), Err(SketchError::Format(_))));

        let mut shifted = m;
        shifted.positions.insert(key("c"), 7);
        assert!(matches!(shifted.verify(), Err(SketchError::Format(_))));
    }

    #[test]
    fn test_empty() {
        let m = SimilarityMatrix::compute(&[]).unwrap();
        assert!(m.is_empty());
    }
}
