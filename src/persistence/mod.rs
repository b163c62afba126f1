//! Persistence for sketches and built artifacts.
//!
//! - [`blob_store`]: swappable byte backends (filesystem, memory)
//! - [`format`]: the fixed-width sketch encoding and the artifact envelope
//! - [`sketch_store`]: one signature per column, single writer per key
//! - [`artifacts`]: cached forest/threshold indexes and similarity matrices
//!
//! Index builders only ever read sketches from here; query paths never touch
//! storage.

pub mod artifacts;
pub mod blob_store;
pub mod format;
pub mod sketch_store;

pub use artifacts::ArtifactStore;
pub use blob_store::{BlobStore, FileBlobStore, MemoryBlobStore};
pub use sketch_store::{PutOutcome, SketchRecord, SketchStore};
