// src/error.rs
//
//! Error taxonomy for the loader.
//!
//! Three families: configuration problems (fatal at the call that made
//! them), backend fetch failures, and user-transform failures.  Fetch and
//! transform errors are surfaced to the consumer at the batch boundary
//! that required the failing work; the loader never retries either —
//! retry policy belongs to the backend or the caller.

use anyhow::Error as AnyError;
use thiserror::Error;

/// Configuration-time failures. Always fatal for the call that raised them.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("batch_size must be at least 1")]
    ZeroBatchSize,

    #[error("block_size must be at least 1")]
    ZeroBlockSize,

    #[error("fetch_factor must be at least 1")]
    ZeroFetchFactor,

    #[error("subset index {index} out of range for dataset of length {len}")]
    SubsetIndexOutOfRange { index: usize, len: usize },

    #[error("cannot reconfigure while a pass is in progress")]
    PassInProgress,
}

/// Item-level error type carried through a pass.
#[derive(Error, Debug)]
pub enum LoaderError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The dataset handle signalled an I/O or lookup failure.  The pass
    /// that hit it is failed for that execution context and must be
    /// restarted by the caller; batches already delivered stay valid.
    #[error("block fetch failed: {0}")]
    Fetch(#[source] AnyError),

    /// A fetch- or batch-transform callable failed.
    #[error("transform failed: {0}")]
    Transform(#[source] AnyError),
}

impl LoaderError {
    /// Wrap a backend error as a fetch failure.
    pub fn fetch<E: Into<AnyError>>(err: E) -> Self {
        LoaderError::Fetch(err.into())
    }

    /// Wrap a user-callable error as a transform failure.
    pub fn transform<E: Into<AnyError>>(err: E) -> Self {
        LoaderError::Transform(err.into())
    }
}

// Mapping from string to error, for backends that only have a message.
impl From<String> for LoaderError {
    fn from(s: String) -> Self {
        LoaderError::Fetch(AnyError::msg(s))
    }
}

impl From<&str> for LoaderError {
    fn from(s: &str) -> Self {
        LoaderError::Fetch(AnyError::msg(s.to_string()))
    }
}
