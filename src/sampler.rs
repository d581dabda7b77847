// src/sampler.rs
//
//! Super-block assembly and shuffling policy.
//!
//! A [`SuperBlockBuilder`] accumulates exactly `fetch_factor` materialized
//! blocks into one pool, then hands the pool over for batch emission.
//! In Train mode the pool's rows are permuted before hand-off — this is
//! the only place rows cross block boundaries, so `fetch_factor` directly
//! controls the randomness/throughput trade-off.  In Eval mode rows keep
//! their fetch order.
//!
//! The RNG is seeded once per pass (per worker), so a repeated pass with
//! the same seed and worker count reproduces identical batch contents.

use rand_chacha::ChaCha20Rng;
use rand_chacha::rand_core::{RngCore, SeedableRng};

use crate::plan::Mode;

/// Manual Fisher–Yates over any slice, driven by ChaCha20.
///
/// Kept version-skew-free by depending only on `rand_core` via
/// `rand_chacha`.
pub(crate) fn fisher_yates<T>(items: &mut [T], rng: &mut ChaCha20Rng) {
    for i in (1..items.len()).rev() {
        let j = (rng.next_u32() as usize) % (i + 1);
        items.swap(i, j);
    }
}

/// Accumulates blocks into super-blocks and applies the mode's shuffle.
pub struct SuperBlockBuilder<R> {
    fetch_factor: usize,
    mode: Mode,
    rng: ChaCha20Rng,
    pool: Vec<R>,
    blocks_in_pool: usize,
}

impl<R> SuperBlockBuilder<R> {
    pub fn new(fetch_factor: usize, mode: Mode, seed: u64) -> Self {
        debug_assert!(fetch_factor >= 1);
        Self {
            fetch_factor,
            mode,
            rng: ChaCha20Rng::seed_from_u64(seed),
            pool: Vec::new(),
            blocks_in_pool: 0,
        }
    }

    /// Add one materialized block.  Returns the completed super-block
    /// once `fetch_factor` blocks have been pooled, `None` otherwise.
    pub fn push(&mut self, rows: Vec<R>) -> Option<Vec<R>> {
        self.pool.extend(rows);
        self.blocks_in_pool += 1;
        if self.blocks_in_pool == self.fetch_factor {
            Some(self.take_pool())
        } else {
            None
        }
    }

    /// Flush the trailing partial super-block, if any.
    ///
    /// The final super-block of a pass may hold fewer than `fetch_factor`
    /// blocks; it is still emitted complete, never dropped or padded.
    pub fn finish(&mut self) -> Option<Vec<R>> {
        if self.pool.is_empty() {
            None
        } else {
            Some(self.take_pool())
        }
    }

    fn take_pool(&mut self) -> Vec<R> {
        self.blocks_in_pool = 0;
        let mut pool = std::mem::take(&mut self.pool);
        if self.mode == Mode::Train {
            fisher_yates(&mut pool, &mut self.rng);
        }
        pool
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drain(builder: &mut SuperBlockBuilder<usize>, blocks: Vec<Vec<usize>>) -> Vec<Vec<usize>> {
        let mut pools = Vec::new();
        for b in blocks {
            if let Some(p) = builder.push(b) {
                pools.push(p);
            }
        }
        if let Some(p) = builder.finish() {
            pools.push(p);
        }
        pools
    }

    #[test]
    fn eval_preserves_fetch_order() {
        let mut b = SuperBlockBuilder::new(2, Mode::Eval, 0);
        let pools = drain(&mut b, vec![vec![0, 1], vec![2, 3], vec![4]]);
        assert_eq!(pools, vec![vec![0, 1, 2, 3], vec![4]]);
    }

    #[test]
    fn train_shuffle_is_deterministic() {
        let blocks: Vec<Vec<usize>> = (0..4).map(|i| (i * 10..i * 10 + 10).collect()).collect();
        let mut a = SuperBlockBuilder::new(2, Mode::Train, 42);
        let mut b = SuperBlockBuilder::new(2, Mode::Train, 42);
        let pa = drain(&mut a, blocks.clone());
        let pb = drain(&mut b, blocks.clone());
        assert_eq!(pa, pb); // same seed -> same pools
        assert_ne!(pa[0], (0..20).collect::<Vec<_>>()); // not the identity
        // contents are preserved per pool
        let mut sorted = pa[0].clone();
        sorted.sort_unstable();
        assert_eq!(sorted, (0..20).collect::<Vec<_>>());
    }

    #[test]
    fn short_final_pool_is_emitted() {
        let mut b = SuperBlockBuilder::new(3, Mode::Train, 1);
        let pools = drain(&mut b, vec![vec![0, 1], vec![2, 3], vec![4, 5], vec![6]]);
        assert_eq!(pools.len(), 2);
        assert_eq!(pools[1].len(), 1); // trailing pool with fewer than fetch_factor blocks
    }
}
