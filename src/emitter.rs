// src/emitter.rs
//
//! Batch slicing and collation.
//!
//! A [`BatchEmitter`] cuts a super-block into consecutive runs of
//! `batch_size` rows (the last possibly shorter, never dropped) and
//! applies the batch-transform to each run.  A transform failure aborts
//! that batch's emission and surfaces immediately; earlier batches from
//! the same super-block are unaffected.

use std::sync::Arc;

use crate::error::LoaderError;
use crate::transform::BatchTransform;

pub struct BatchEmitter<BT> {
    batch_size: usize,
    transform: Arc<BT>,
}

impl<BT> BatchEmitter<BT> {
    pub fn new(batch_size: usize, transform: Arc<BT>) -> Self {
        debug_assert!(batch_size >= 1);
        Self {
            batch_size,
            transform,
        }
    }

    /// Lazily slice `pool` into collated batches.
    pub fn emit<R>(&self, pool: Vec<R>) -> Batches<R, BT>
    where
        BT: BatchTransform<R>,
        R: Send + 'static,
    {
        Batches {
            rows: pool.into_iter(),
            batch_size: self.batch_size,
            transform: Arc::clone(&self.transform),
        }
    }
}

impl<BT> Clone for BatchEmitter<BT> {
    fn clone(&self) -> Self {
        Self {
            batch_size: self.batch_size,
            transform: Arc::clone(&self.transform),
        }
    }
}

/// Iterator over the collated batches of one super-block.
pub struct Batches<R, BT> {
    rows: std::vec::IntoIter<R>,
    batch_size: usize,
    transform: Arc<BT>,
}

impl<R, BT> Iterator for Batches<R, BT>
where
    BT: BatchTransform<R>,
    R: Send + 'static,
{
    type Item = Result<BT::Batch, LoaderError>;

    fn next(&mut self) -> Option<Self::Item> {
        let chunk: Vec<R> = self.rows.by_ref().take(self.batch_size).collect();
        if chunk.is_empty() {
            None
        } else {
            Some(self.transform.collate(chunk))
        }
    }
}
