// src/fetcher.rs
//
//! Block retrieval: one backend fetch plus immediate materialization.

use std::sync::Arc;

use log::trace;

use crate::dataset::BlockDataset;
use crate::error::LoaderError;
use crate::transform::FetchTransform;

/// Fetches one block's indices from the dataset handle and applies the
/// fetch-transform before the result crosses any boundary.
///
/// The `fetch` await inside [`BlockFetcher::fetch_block`] is the
/// pipeline's only I/O suspension point.
pub struct BlockFetcher<D, FT> {
    dataset: Arc<D>,
    transform: Arc<FT>,
}

impl<D, FT> BlockFetcher<D, FT>
where
    D: BlockDataset,
    FT: FetchTransform<D::Raw>,
{
    pub fn new(dataset: Arc<D>, transform: Arc<FT>) -> Self {
        Self { dataset, transform }
    }

    /// Retrieve and materialize one block.
    ///
    /// Backend failures propagate as [`LoaderError::Fetch`], transform
    /// failures as [`LoaderError::Transform`]; neither is retried here.
    pub async fn fetch_block(&self, indices: &[usize]) -> Result<Vec<FT::Row>, LoaderError> {
        trace!("fetching block of {} rows", indices.len());
        let raw = self.dataset.fetch(indices).await?;
        self.transform.materialize(raw)
    }
}

// Manual Clone: only the Arcs are cloned, D and FT need not be Clone.
impl<D, FT> Clone for BlockFetcher<D, FT> {
    fn clone(&self) -> Self {
        Self {
            dataset: Arc::clone(&self.dataset),
            transform: Arc::clone(&self.transform),
        }
    }
}
