// src/lib.rs
//
// Crate root — public re-exports.

//! Blocked random-access streaming sampler for large out-of-core
//! row datasets.
//!
//! Turns random per-row access into efficient chunked reads: rows are
//! fetched in `block_size` groups, `fetch_factor` blocks are merged into
//! a super-block and (in Train mode) shuffled across block boundaries,
//! then sliced into `batch_size` batches.  Prefetch workers overlap the
//! backend's fetch latency with consumption, each owning a disjoint
//! slice of the pass.
//!
//! The backing store is abstracted behind the [`BlockDataset`]
//! capability; lazy backend payloads are materialized through an
//! injected [`FetchTransform`], and batches converted for the consumer
//! through a [`BatchTransform`].

pub mod dataset;
pub mod emitter;
pub mod error;
pub mod fetcher;
pub mod loader;
pub mod options;
pub mod plan;
pub mod sampler;
pub mod transform;

mod prefetch;

// Re-export the key types at this level:
pub use dataset::{BlockDataset, InMemoryDataset};
pub use emitter::BatchEmitter;
pub use error::{ConfigError, LoaderError};
pub use fetcher::BlockFetcher;
pub use loader::{BlockLoader, Pass};
pub use options::LoaderOptions;
pub use plan::{IndexPlan, Mode};
pub use sampler::SuperBlockBuilder;
pub use transform::{
    BatchFn, BatchTransform, FetchFn, FetchTransform, IdentityBatch, IdentityFetch,
};
