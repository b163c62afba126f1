//! colsketch: approximate set similarity between named columns.
//!
//! Each column is reduced to a set of lower-cased tokens and then to a
//! fixed-size MinHash signature. Signatures are cached on disk, one file per
//! column, and feed three read-side structures:
//!
//! - [`hash::ForestIndex`]: ranked top-k retrieval (LSH forest)
//! - [`hash::ThresholdIndex`]: everything likely above a similarity cutoff
//!   (banded LSH tuned to that cutoff)
//! - [`matrix::SimilarityMatrix`]: all pairs, for inspection
//!
//! [`service::SimilarityService`] wires these to a value source and a column
//! catalog and exposes `top_k`, `similar_to`, and `pairwise_matrix`.
//!
//! # Critical Nuances
//!
//! ## Estimates, not exact answers
//!
//! Query paths only ever compare signatures. The estimate of Jaccard `J` from
//! `P` permutations has standard deviation `sqrt(J(1-J)/P)`: about 0.044 at
//! `J = 0.5, P = 128`.
//!
//! ## Signatures are only comparable under one configuration
//!
//! Permutation count and seed live in [`config::SketchConfig`]. Changing
//! either invalidates every stored sketch; the on-disk format carries no
//! header to detect it, so the store root should be rebuilt.
//!
//! ## Threshold indexes are single-purpose
//!
//! Band/row parameters are chosen for one threshold. Asking a 0.7 index for
//! 0.5 answers is rejected rather than silently wrong.

pub mod catalog;
pub mod config;
pub mod error;
pub mod hash;
pub mod matrix;
pub mod persistence;
pub mod service;

pub use catalog::{ColumnCatalog, ColumnInfo, ColumnKey, ColumnType, ValueSource};
pub use config::{ForestParams, ServiceConfig, SketchConfig};
pub use error::{Result, SketchError};
pub use hash::{tokenize, ForestIndex, MinHashSignature, MinHasher, Scored, ThresholdIndex};
pub use matrix::SimilarityMatrix;
pub use persistence::{BlobStore, FileBlobStore, MemoryBlobStore, SketchStore};
pub use service::{BatchReport, SimilarityService};
