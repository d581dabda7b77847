// src/options.rs
//
//! Constructor-time configuration for [`crate::BlockLoader`].
//!
//! Builder helpers are provided so callers can write a fluent style:
//!
//! let opts = LoaderOptions::default()
//!     .with_batch_size(128)
//!     .block_size(4096)
//!     .fetch_factor(4)
//!     .seed(42)
//!     .num_workers(2)
//!     .queue_depth(8);
//!
//! All fields are immutable for the loader's lifetime; only `subset` and
//! `set_mode` on the loader itself are pass-scoped.

use crate::error::ConfigError;

#[derive(Debug, Clone)]
pub struct LoaderOptions {
    /// Rows per emitted batch.
    pub batch_size: usize,

    /// Rows fetched per backend call.  Tunes the I/O-granularity vs
    /// shuffle-granularity trade-off.
    pub block_size: usize,

    /// Number of blocks merged into one super-block before cross-block
    /// shuffling.  Larger values trade memory and look-ahead depth for
    /// better training-order randomness.
    pub fetch_factor: usize,

    /// Base RNG seed for Train-mode shuffles.  Each pass derives its own
    /// seed from this plus an epoch counter.
    pub seed: u64,

    /// Parallel fetch workers, each owning a disjoint slice of the pass.
    /// `0` means "auto" (number of CPUs).  Use `1` when exact global
    /// batch order must be reproducible.
    pub num_workers: usize,

    /// Bound of each worker's ready-batch queue.  `0` means "auto",
    /// resolved as `fetch_factor + 1` — the conventional ratio between
    /// consumer look-ahead and the merge window; set it explicitly to
    /// decouple the two.
    pub queue_depth: usize,
}

impl Default for LoaderOptions {
    fn default() -> Self {
        Self {
            batch_size: 32,
            block_size: 256,
            fetch_factor: 4,
            seed: 0,
            num_workers: 1,
            queue_depth: 0,
        }
    }
}

impl LoaderOptions {
    /// Builder-style helper: change the batch size.
    pub fn with_batch_size(mut self, size: usize) -> Self {
        self.batch_size = size;
        self
    }

    /// Set the number of rows per backend fetch.
    pub fn block_size(mut self, size: usize) -> Self {
        self.block_size = size;
        self
    }

    /// Set the number of blocks merged before shuffling.
    pub fn fetch_factor(mut self, n: usize) -> Self {
        self.fetch_factor = n;
        self
    }

    /// Set the base shuffle seed.
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Set the number of fetch workers.  `0` means "auto".
    pub fn num_workers(mut self, n: usize) -> Self {
        self.num_workers = n;
        self
    }

    /// Set the per-worker ready-batch queue bound.  `0` means "auto".
    pub fn queue_depth(mut self, n: usize) -> Self {
        self.queue_depth = n;
        self
    }

    /// Fatal validation, run once at loader construction.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.batch_size == 0 {
            return Err(ConfigError::ZeroBatchSize);
        }
        if self.block_size == 0 {
            return Err(ConfigError::ZeroBlockSize);
        }
        if self.fetch_factor == 0 {
            return Err(ConfigError::ZeroFetchFactor);
        }
        Ok(())
    }

    pub(crate) fn resolved_workers(&self) -> usize {
        if self.num_workers == 0 {
            num_cpus::get().max(1)
        } else {
            self.num_workers
        }
    }

    pub(crate) fn resolved_queue_depth(&self) -> usize {
        if self.queue_depth == 0 {
            self.fetch_factor + 1
        } else {
            self.queue_depth
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_sizes_are_rejected() {
        assert!(LoaderOptions::default().with_batch_size(0).validate().is_err());
        assert!(LoaderOptions::default().block_size(0).validate().is_err());
        assert!(LoaderOptions::default().fetch_factor(0).validate().is_err());
        assert!(LoaderOptions::default().validate().is_ok());
    }

    #[test]
    fn auto_queue_depth_tracks_fetch_factor() {
        let opts = LoaderOptions::default().fetch_factor(3);
        assert_eq!(opts.resolved_queue_depth(), 4);
        let opts = opts.queue_depth(16);
        assert_eq!(opts.resolved_queue_depth(), 16);
    }
}
