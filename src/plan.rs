// src/plan.rs
//
//! Per-pass index planning.
//!
//! An [`IndexPlan`] decides, for one pass over the active subset, which
//! row indices are visited and in what order, partitioned into blocks of
//! `block_size` contiguous subset positions.  Train mode shuffles the
//! *block order* only — within-block order is preserved so that rows
//! fetched together stay physically nearby in the backing store — while
//! Eval mode is the identity, guaranteeing deterministic, repeatable
//! iteration.
//!
//! Plans are rebuilt once per pass; rebuilding in Train mode draws a
//! fresh permutation from the pass seed, rebuilding in Eval mode yields
//! the same order every time.

use rand_chacha::ChaCha20Rng;
use rand_chacha::rand_core::SeedableRng;

use crate::sampler::fisher_yates;

/// Iteration behavior for a pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Shuffle block order and rows within each super-block.
    Train,
    /// Preserve subset order exactly; no shuffling at any level.
    Eval,
}

impl Default for Mode {
    fn default() -> Self {
        Mode::Eval
    }
}

/// The ordered block sequence for one pass.
#[derive(Debug, Clone)]
pub struct IndexPlan {
    blocks: Vec<Vec<usize>>,
}

impl IndexPlan {
    /// Build the plan for one pass.
    ///
    /// `subset` is the ordered sequence of eligible row indices.  Blocks
    /// partition it into `ceil(len / block_size)` groups, the last
    /// possibly short.  `seed` is only consulted in Train mode.
    pub fn build(subset: &[usize], block_size: usize, mode: Mode, seed: u64) -> Self {
        debug_assert!(block_size >= 1);
        let mut blocks: Vec<Vec<usize>> = subset
            .chunks(block_size)
            .map(|chunk| chunk.to_vec())
            .collect();

        if mode == Mode::Train {
            let mut rng = ChaCha20Rng::seed_from_u64(seed);
            fisher_yates(&mut blocks, &mut rng);
        }

        Self { blocks }
    }

    pub fn num_blocks(&self) -> usize {
        self.blocks.len()
    }

    pub fn num_rows(&self) -> usize {
        self.blocks.iter().map(|b| b.len()).sum()
    }

    pub fn blocks(&self) -> &[Vec<usize>] {
        &self.blocks
    }

    /// Split the block sequence into at most `workers` disjoint,
    /// contiguous partitions.  No two partitions share a block; workers
    /// beyond the block count get nothing and are not represented.
    pub fn partition(self, workers: usize) -> Vec<Vec<Vec<usize>>> {
        let n = self.blocks.len();
        if n == 0 {
            return Vec::new();
        }
        let workers = workers.clamp(1, n);
        let per = n.div_ceil(workers);

        let mut parts = Vec::with_capacity(workers);
        let mut blocks = self.blocks.into_iter();
        loop {
            let part: Vec<Vec<usize>> = blocks.by_ref().take(per).collect();
            if part.is_empty() {
                break;
            }
            parts.push(part);
        }
        parts
    }

    /// Exact number of batches this plan will emit.
    ///
    /// Mirrors the emission arithmetic: each partition groups its blocks
    /// into runs of `fetch_factor` (the super-blocks, last possibly
    /// short), and each super-block yields `ceil(rows / batch_size)`
    /// batches.
    pub fn count_batches(&self, workers: usize, fetch_factor: usize, batch_size: usize) -> usize {
        debug_assert!(fetch_factor >= 1 && batch_size >= 1);
        let n = self.blocks.len();
        if n == 0 {
            return 0;
        }
        let workers = workers.clamp(1, n);
        let per = n.div_ceil(workers);

        self.blocks
            .chunks(per)
            .flat_map(|part| part.chunks(fetch_factor))
            .map(|group| {
                let rows: usize = group.iter().map(|b| b.len()).sum();
                rows.div_ceil(batch_size)
            })
            .sum()
    }
}

/// SplitMix64 finalizer, used to derive per-pass and per-worker seeds
/// from the configured seed without correlated RNG streams.
pub(crate) fn mix_seed(seed: u64, salt: u64) -> u64 {
    let mut z = seed ^ salt.wrapping_mul(0x9E37_79B9_7F4A_7C15);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

// Keeps worker row-shuffle streams in a different seed domain than the
// epoch-derived pass seeds: without it, `mix_seed(seed, epoch)` for a
// later pass can equal `mix_seed(pass_seed, worker + 1)` for an earlier
// one, correlating a block permutation with a row shuffle.
const WORKER_STREAM_SALT: u64 = 0xA076_1D64_78BD_642F;

/// RNG seed for one worker's row shuffles within a pass.
pub(crate) fn worker_seed(pass_seed: u64, worker_id: usize) -> u64 {
    mix_seed(pass_seed ^ WORKER_STREAM_SALT, worker_id as u64 + 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flat(plan: &IndexPlan) -> Vec<usize> {
        plan.blocks().iter().flatten().copied().collect()
    }

    #[test]
    fn eval_is_identity() {
        let subset: Vec<usize> = (0..25).collect();
        let plan = IndexPlan::build(&subset, 4, Mode::Eval, 7);
        assert_eq!(plan.num_blocks(), 7); // 6 full + 1 short
        assert_eq!(plan.blocks()[6], vec![24]);
        assert_eq!(flat(&plan), subset);
    }

    #[test]
    fn train_shuffles_blocks_not_rows() {
        let subset: Vec<usize> = (0..100).collect();
        let plan = IndexPlan::build(&subset, 10, Mode::Train, 42);
        assert_eq!(plan.num_blocks(), 10);
        // every block is still a contiguous ascending run
        for block in plan.blocks() {
            let start = block[0];
            assert_eq!(*block, (start..start + block.len()).collect::<Vec<_>>());
        }
        assert_ne!(flat(&plan), subset);
        // same seed reproduces the permutation
        let again = IndexPlan::build(&subset, 10, Mode::Train, 42);
        assert_eq!(flat(&plan), flat(&again));
        // a different seed gives a different one
        let other = IndexPlan::build(&subset, 10, Mode::Train, 43);
        assert_ne!(flat(&plan), flat(&other));
    }

    #[test]
    fn partition_is_disjoint_and_complete() {
        let subset: Vec<usize> = (0..95).collect();
        let plan = IndexPlan::build(&subset, 10, Mode::Eval, 0);
        let parts = plan.partition(4);
        assert_eq!(parts.len(), 4);
        let total: usize = parts.iter().flatten().map(|b| b.len()).sum();
        assert_eq!(total, 95);
        // more workers than blocks: one block each
        let plan = IndexPlan::build(&subset[..20], 10, Mode::Eval, 0);
        let parts = plan.partition(8);
        assert_eq!(parts.len(), 2);
    }

    #[test]
    fn worker_seeds_do_not_collide_with_pass_seeds() {
        let base = 42u64;
        // pass seeds: the base seed for epoch 0, mixed for later epochs
        let pass_seeds: Vec<u64> = std::iter::once(base)
            .chain((1..=16).map(|epoch| mix_seed(base, epoch)))
            .collect();
        for &ps in &pass_seeds {
            for w in 0..16 {
                let ws = worker_seed(ps, w);
                assert!(
                    !pass_seeds.contains(&ws),
                    "worker {w} of pass seed {ps:#x} reuses a pass seed stream"
                );
            }
        }
    }

    #[test]
    fn batch_count_matches_uneven_sizes() {
        // 23 rows, blocks of 4 -> [4,4,4,4,4,3]; fetch_factor 2 ->
        // super-blocks of [8,8,7]; batch 5 -> 2+2+2 batches.
        let subset: Vec<usize> = (0..23).collect();
        let plan = IndexPlan::build(&subset, 4, Mode::Eval, 0);
        assert_eq!(plan.count_batches(1, 2, 5), 6);
        // round-number case: 100 rows / 10 / 2 / 5 -> 20
        let subset: Vec<usize> = (0..100).collect();
        let plan = IndexPlan::build(&subset, 10, Mode::Eval, 0);
        assert_eq!(plan.count_batches(1, 2, 5), 20);
    }
}
