// src/dataset.rs
//
//! Dataset capability for blocked random access.
//!
//! The loader never owns the backing store; it borrows an implementation
//! of [`BlockDataset`] behind an `Arc` for the duration of its passes.
//! Several loader instances may share one handle — the capability is
//! read-only, so no synchronization is needed between them.

use async_trait::async_trait;

use crate::error::LoaderError;

/// A row-oriented collection readable in indexed blocks.
///
/// One `fetch` call retrieves an ordered group of rows as a single
/// backend unit (`Raw`).  Backends where random per-row access is
/// expensive (file-backed matrices, lazy collections, remote stores)
/// implement this by turning the index list into one chunked read.
///
/// `Raw` may be a cheap lazy proxy; the loader materializes it through
/// the fetch-transform immediately after retrieval, before the block
/// crosses any worker or super-block boundary.
#[async_trait]
pub trait BlockDataset: Send + Sync + 'static {
    /// Payload produced by one backend fetch, opaque until materialized.
    type Raw: Send + 'static;

    /// Total number of rows.
    fn len(&self) -> usize;

    /// Convenience helper.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Retrieve the given rows, in the given order, as one unit.
    ///
    /// This is the designated blocking suspension point of the pipeline;
    /// it may perform I/O.  Backend failures surface as
    /// [`LoaderError::Fetch`] and are not retried by the loader.
    async fn fetch(&self, indices: &[usize]) -> Result<Self::Raw, LoaderError>;
}

/// A `BlockDataset` over an in-memory `Vec` of rows.
///
/// Mainly useful for tests and small data, and as a reference for what a
/// backend adapter has to provide.
#[derive(Debug, Clone)]
pub struct InMemoryDataset<R> {
    rows: Vec<R>,
}

impl<R> InMemoryDataset<R> {
    pub fn new(rows: Vec<R>) -> Self {
        Self { rows }
    }
}

#[async_trait]
impl<R> BlockDataset for InMemoryDataset<R>
where
    R: Clone + Send + Sync + 'static,
{
    type Raw = Vec<R>;

    fn len(&self) -> usize {
        self.rows.len()
    }

    async fn fetch(&self, indices: &[usize]) -> Result<Self::Raw, LoaderError> {
        indices
            .iter()
            .map(|&i| {
                self.rows
                    .get(i)
                    .cloned()
                    .ok_or_else(|| LoaderError::fetch(anyhow::anyhow!("row {i} out of range")))
            })
            .collect()
    }
}
