//! Property-based tests for colsketch.
//!
//! These tests verify invariants that should hold regardless of input:
//! - Identical sets estimate exactly 1.0
//! - Estimates are symmetric and lie in [0, 1]
//! - The sketch file encoding is lossless
//! - The similarity matrix is symmetric with a unit diagonal
//! - A forest query with an indexed signature returns it first

use colsketch::config::{ForestParams, SketchConfig};
use colsketch::persistence::format::{decode_signature, encode_signature};
use colsketch::{ColumnKey, ForestIndex, MinHashSignature, MinHasher, SimilarityMatrix};
use proptest::prelude::*;
use std::collections::HashSet;

fn hasher(num_perm: usize) -> MinHasher {
    MinHasher::new(SketchConfig::with_num_perm(num_perm)).unwrap()
}

prop_compose! {
    fn arb_tokens()(tokens in prop::collection::hash_set("[a-z]{1,6}", 1..40)) -> HashSet<String> {
        tokens
    }
}

prop_compose! {
    fn arb_signature(num_perm: usize)(values in prop::collection::vec(any::<u64>(), num_perm)) -> MinHashSignature {
        MinHashSignature::from_values(values)
    }
}

mod estimate_props {
    use super::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn identical_sets_estimate_one(tokens in arb_tokens()) {
            let mh = hasher(64);
            let a = mh.signature(&tokens);
            let b = mh.signature(&tokens.clone());
            prop_assert_eq!(a.jaccard(&b).unwrap(), 1.0);
        }

        #[test]
        fn estimate_symmetric_and_bounded(a in arb_tokens(), b in arb_tokens()) {
            let mh = hasher(64);
            let (sa, sb) = (mh.signature(&a), mh.signature(&b));
            let ab = sa.jaccard(&sb).unwrap();
            let ba = sb.jaccard(&sa).unwrap();
            prop_assert_eq!(ab, ba);
            prop_assert!((0.0..=1.0).contains(&ab));
        }

        #[test]
        fn disjoint_sets_estimate_near_zero(tokens in arb_tokens()) {
            // Prefixing guarantees disjointness.
            let left: HashSet<String> = tokens.iter().map(|t| format!("l{t}")).collect();
            let right: HashSet<String> = tokens.iter().map(|t| format!("r{t}")).collect();
            let mh = hasher(128);
            let estimate = mh.signature(&left).jaccard(&mh.signature(&right)).unwrap();
            // 3 / sqrt(P) is a generous sampling bound.
            prop_assert!(estimate <= 3.0 / (128f64).sqrt(), "estimate {}", estimate);
        }
    }
}

mod storage_props {
    use super::*;

    proptest! {
        #[test]
        fn sketch_encoding_is_lossless(sig in arb_signature(128)) {
            let bytes = encode_signature(&sig);
            prop_assert_eq!(bytes.len(), 8 * 128);
            let back = decode_signature(&bytes).unwrap();
            prop_assert_eq!(encode_signature(&back), bytes);
            prop_assert_eq!(back, sig);
        }
    }
}

mod index_props {
    use super::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn matrix_symmetric_unit_diagonal(sets in prop::collection::vec(arb_tokens(), 1..8)) {
            let mh = hasher(32);
            let records: Vec<_> = sets
                .iter()
                .enumerate()
                .map(|(i, s)| (ColumnKey::new("t", format!("c{i}")).unwrap(), mh.signature(s)))
                .collect();
            let m = SimilarityMatrix::compute(&records).unwrap();
            for (a, _) in &records {
                prop_assert_eq!(m.get(a, a).unwrap(), 1.0);
                for (b, _) in &records {
                    prop_assert_eq!(m.get(a, b).unwrap(), m.get(b, a).unwrap());
                }
            }
        }

        #[test]
        fn forest_returns_exact_match_first(
            sets in prop::collection::vec(arb_tokens(), 1..12),
            pick in any::<prop::sample::Index>(),
            k in 1usize..6,
        ) {
            let mh = hasher(64);
            let records: Vec<_> = sets
                .iter()
                .enumerate()
                .map(|(i, s)| (ColumnKey::new("t", format!("c{i:02}")).unwrap(), mh.signature(s)))
                .collect();
            let probe_idx = pick.index(records.len());
            let probe = records[probe_idx].1.clone();
            let forest = ForestIndex::build(records.clone(), 64, ForestParams { trees: 8 }).unwrap();

            let results = forest.query_scored(&probe, k).unwrap();
            prop_assert!(results.len() <= k);
            prop_assert_eq!(results.len(), k.min(records.len()));
            prop_assert_eq!(results[0].similarity, 1.0);
            // Equal token sets give equal signatures; any of them may rank first.
            prop_assert_eq!(forest.signature_of(&results[0].key).unwrap(), &probe);
        }
    }
}
