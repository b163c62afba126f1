//! MinHash for Jaccard similarity estimation.
//!
//! MinHash provides locality-sensitive hashing for set similarity,
//! estimating the Jaccard coefficient J(A,B) = |A ∩ B| / |A ∪ B|.
//!
//! ## Algorithm
//!
//! For each hash function h_i:
//! - MinHash_i(S) = min_{x ∈ S} h_i(x)
//!
//! The probability that MinHash values match equals Jaccard similarity:
//! P[MinHash_i(A) = MinHash_i(B)] = J(A,B)
//!
//! Each h_i is seeded XXH3 over the token's UTF-8 bytes. Seeds come from
//! [`SketchConfig::permutation_seeds`], so signatures built by different
//! processes are comparable as long as their configs are equal.
//!
//! ## Empty sets
//!
//! An empty set leaves every position at `u64::MAX`. Two empty sets therefore
//! estimate 1.0, and an empty set against a non-empty one estimates 0.0.
//! [`MinHashSignature::is_empty_set`] lets callers special-case them.
//!
//! ## References
//!
//! - Broder (1997). "On the resemblance and containment of documents"
//! - Broder et al. (2000). "Min-wise independent permutations"

use crate::config::SketchConfig;
use crate::error::{Result, SketchError};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use xxhash_rust::xxh3::xxh3_64_with_seed;

/// MinHash signature generator.
#[derive(Debug, Clone)]
pub struct MinHasher {
    config: SketchConfig,
    /// Seeds for hash functions.
    seeds: Vec<u64>,
}

impl MinHasher {
    /// Create a generator for `config`.
    pub fn new(config: SketchConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            seeds: config.permutation_seeds(),
            config,
        })
    }

    /// Compute the signature of a token set.
    pub fn signature<S: AsRef<str>>(&self, tokens: &HashSet<S>) -> MinHashSignature {
        self.signature_from_iter(tokens.iter())
    }

    /// Compute a signature from any token iterator (duplicates are harmless).
    pub fn signature_from_iter<S, I>(&self, tokens: I) -> MinHashSignature
    where
        S: AsRef<str>,
        I: IntoIterator<Item = S>,
    {
        let mut mins = vec![u64::MAX; self.config.num_perm];

        for token in tokens {
            let bytes = token.as_ref().as_bytes();
            for (min, &seed) in mins.iter_mut().zip(&self.seeds) {
                let hash = xxh3_64_with_seed(bytes, seed);
                if hash < *min {
                    *min = hash;
                }
            }
        }

        MinHashSignature { values: mins }
    }

    /// Number of permutations.
    pub fn num_perm(&self) -> usize {
        self.config.num_perm
    }

    pub fn config(&self) -> &SketchConfig {
        &self.config
    }
}

/// A MinHash signature (fingerprint) of a set.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MinHashSignature {
    /// The minimum hash values for each permutation.
    values: Vec<u64>,
}

impl MinHashSignature {
    /// Wrap raw per-permutation minima.
    pub fn from_values(values: Vec<u64>) -> Self {
        Self { values }
    }

    pub fn values(&self) -> &[u64] {
        &self.values
    }

    /// Permutation count this signature was built with.
    pub fn num_perm(&self) -> usize {
        self.values.len()
    }

    /// Fail unless `other` was built with the same permutation count.
    pub fn check_compatible(&self, other: &MinHashSignature) -> Result<()> {
        if self.values.len() != other.values.len() {
            return Err(SketchError::PermutationMismatch {
                expected: self.values.len(),
                actual: other.values.len(),
            });
        }
        Ok(())
    }

    /// Estimate Jaccard similarity: fraction of agreeing positions.
    ///
    /// Returns a value in [0, 1] where 1 means identical sets.
    pub fn jaccard(&self, other: &MinHashSignature) -> Result<f64> {
        self.check_compatible(other)?;
        Ok(agreement(&self.values, &other.values))
    }

    /// Check if estimated similarity reaches `threshold`.
    pub fn is_similar(&self, other: &MinHashSignature, threshold: f64) -> Result<bool> {
        Ok(self.jaccard(other)? >= threshold)
    }

    /// Number of positions where hash values differ.
    pub fn hamming_distance(&self, other: &MinHashSignature) -> Result<usize> {
        self.check_compatible(other)?;
        Ok(self
            .values
            .iter()
            .zip(&other.values)
            .filter(|(a, b)| a != b)
            .count())
    }

    /// Signature of the union of both underlying sets (element-wise minimum).
    pub fn merge(&self, other: &MinHashSignature) -> Result<MinHashSignature> {
        self.check_compatible(other)?;
        let values = self
            .values
            .iter()
            .zip(&other.values)
            .map(|(&a, &b)| a.min(b))
            .collect();
        Ok(MinHashSignature { values })
    }

    /// True when built from an empty token set.
    pub fn is_empty_set(&self) -> bool {
        self.values.iter().all(|&v| v == u64::MAX)
    }
}

/// Fraction of equal positions. Callers guarantee equal lengths.
pub(crate) fn agreement(a: &[u64], b: &[u64]) -> f64 {
    if a.is_empty() {
        return 0.0;
    }
    let matches = a.iter().zip(b).filter(|(x, y)| x == y).count();
    matches as f64 / a.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hasher(num_perm: usize) -> MinHasher {
        MinHasher::new(SketchConfig::with_num_perm(num_perm)).unwrap()
    }

    fn set(items: &[&str]) -> HashSet<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_minhash_identical_sets() {
        let mh = hasher(128);
        let s = set(&["a", "b", "c"]);

        let sig1 = mh.signature(&s);
        let sig2 = mh.signature(&s);

        assert_eq!(sig1.num_perm(), 128);
        assert_eq!(sig1.jaccard(&sig2).unwrap(), 1.0);
    }

    #[test]
    fn test_minhash_disjoint_sets() {
        let mh = hasher(128);
        let sig1 = mh.signature(&set(&["a", "b", "c"]));
        let sig2 = mh.signature(&set(&["x", "y", "z"]));

        assert!(sig1.jaccard(&sig2).unwrap() < 0.1);
    }

    #[test]
    fn test_minhash_overlap_scenario() {
        // True Jaccard = 2/4
        let mh = hasher(128);
        let sig1 = mh.signature(&set(&["a", "b", "c"]));
        let sig2 = mh.signature(&set(&["a", "b", "d"]));

        let estimated = sig1.jaccard(&sig2).unwrap();
        assert!((estimated - 0.5).abs() <= 0.15, "estimate {estimated}");
    }

    #[test]
    fn test_minhash_similar_sets() {
        let mh = hasher(256);
        let set1: HashSet<String> = (0..100).map(|i| i.to_string()).collect();
        let set2: HashSet<String> = (50..150).map(|i| i.to_string()).collect();

        // Actual Jaccard = 50/150
        let estimated = mh.signature(&set1).jaccard(&mh.signature(&set2)).unwrap();
        assert!((estimated - 0.333).abs() < 0.1);
    }

    #[test]
    fn test_empty_set_convention() {
        let mh = hasher(32);
        let empty = mh.signature(&HashSet::<String>::new());
        let other = mh.signature(&set(&["a"]));

        assert!(empty.is_empty_set());
        assert!(!other.is_empty_set());
        assert_eq!(empty.jaccard(&empty.clone()).unwrap(), 1.0);
        assert_eq!(empty.jaccard(&other).unwrap(), 0.0);
    }

    #[test]
    fn test_permutation_mismatch() {
        let a = hasher(64).signature(&set(&["a"]));
        let b = hasher(128).signature(&set(&["a"]));

        let err = a.jaccard(&b).unwrap_err();
        assert!(matches!(
            err,
            SketchError::PermutationMismatch {
                expected: 64,
                actual: 128
            }
        ));
    }

    #[test]
    fn test_signature_merge() {
        let mh = hasher(64);
        let sig1 = mh.signature(&set(&["a", "b"]));
        let sig2 = mh.signature(&set(&["c", "d"]));
        let sig_union = mh.signature(&set(&["a", "b", "c", "d"]));

        assert_eq!(sig1.merge(&sig2).unwrap(), sig_union);
    }

    #[test]
    fn test_from_iter_matches_set() {
        let mh = hasher(32);
        let from_iter = mh.signature_from_iter(["b", "a", "b"]);
        assert_eq!(from_iter, mh.signature(&set(&["a", "b"])));
        assert_eq!(mh.signature(&set(&["a", "b"])).hamming_distance(&from_iter).unwrap(), 0);
    }

    #[test]
    fn test_zero_permutations_rejected() {
        assert!(MinHasher::new(SketchConfig::with_num_perm(0)).is_err());
    }
}
