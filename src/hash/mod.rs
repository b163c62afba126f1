//! Set sketches and the LSH indexes built on them.
//!
//! ## MinHash: Jaccard Similarity for Sets
//!
//! **Key insight** (Broder 1997): For a random permutation π of the universe,
//!
//! ```text
//! P[min(π(A)) = min(π(B))] = |A ∩ B| / |A ∪ B| = Jaccard(A, B)
//! ```
//!
//! **Algorithm**:
//! 1. Tokenize a column's values into a set
//! 2. Apply P seeded hash functions (simulating permutations)
//! 3. Signature = [min h₁(S), min h₂(S), ..., min h_P(S)]
//! 4. Jaccard ≈ (# matching positions) / P
//!
//! **Amplification with bands**: Divide signature into b bands of r rows.
//! Hash each band. Similar items collide in *any* band with high probability.
//! Two strategies use this:
//!
//! | Index | Question | Banding |
//! |-------|----------|---------|
//! | [`ForestIndex`] | top-k most similar | fixed `trees`, variable prefix depth |
//! | [`ThresholdIndex`] | all above `t` | `(b, r)` tuned to `t` |
//!
//! ```rust
//! use colsketch::catalog::ColumnKey;
//! use colsketch::config::{ForestParams, SketchConfig};
//! use colsketch::hash::{tokenize, ForestIndex, MinHasher};
//!
//! let mh = MinHasher::new(SketchConfig::default()).unwrap();
//! let a = mh.signature(&tokenize([Some("the quick brown fox")]));
//! let b = mh.signature(&tokenize([Some("the quick brown dog")]));
//!
//! let forest = ForestIndex::build(
//!     vec![
//!         (ColumnKey::new("docs", "a").unwrap(), a.clone()),
//!         (ColumnKey::new("docs", "b").unwrap(), b),
//!     ],
//!     128,
//!     ForestParams::default(),
//! )
//! .unwrap();
//!
//! let top = forest.query(&a, 1).unwrap();
//! assert_eq!(top[0].column(), "a");
//! ```
//!
//! ## References
//!
//! - Broder (1997). "On the resemblance and containment of documents." (MinHash)
//! - Indyk & Motwani (1998). "Approximate nearest neighbors: towards removing
//!   the curse of dimensionality." (LSH theory)
//! - Leskovec, Rajaraman & Ullman. "Mining of Massive Datasets", ch. 3 (banding)

pub mod bands;
pub mod forest;
pub mod minhash;
pub mod threshold;
mod tokenize;

pub use bands::BandParams;
pub use forest::ForestIndex;
pub use minhash::{MinHashSignature, MinHasher};
pub use threshold::ThresholdIndex;
pub use tokenize::{tokenize, TokenSet};

use crate::catalog::ColumnKey;
use crate::error::{Result, SketchError};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashMap;

/// A column with its estimated similarity to some probe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scored {
    pub key: ColumnKey,
    pub similarity: f64,
}

impl Scored {
    /// Descending similarity, then ascending key.
    pub fn ranking(a: &Scored, b: &Scored) -> Ordering {
        b.similarity
            .total_cmp(&a.similarity)
            .then_with(|| a.key.cmp(&b.key))
    }
}

/// Consistency of the entry tables shared by both indexes.
///
/// Decoded artifacts are checked with this before any query indexes into
/// them; `what` names the structure in the error.
pub(crate) fn check_entries(
    what: &str,
    keys: &[ColumnKey],
    signatures: &[MinHashSignature],
    positions: &HashMap<ColumnKey, u32>,
    num_perm: usize,
) -> Result<()> {
    let corrupt = |detail: String| SketchError::Format(format!("{what}: {detail}"));
    if signatures.len() != keys.len() || positions.len() != keys.len() {
        return Err(corrupt(format!(
            "{} keys, {} signatures, {} positions",
            keys.len(),
            signatures.len(),
            positions.len()
        )));
    }
    if let Some(bad) = signatures.iter().find(|s| s.num_perm() != num_perm) {
        return Err(corrupt(format!(
            "signature with {} values, expected {num_perm}",
            bad.num_perm()
        )));
    }
    for (key, &id) in positions {
        if keys.get(id as usize) != Some(key) {
            return Err(corrupt(format!("position of {key} does not match its entry")));
        }
    }
    Ok(())
}
