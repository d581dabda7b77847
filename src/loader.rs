// src/loader.rs
//
//! High-level loader tying planning, fetching, shuffling, batching and
//! prefetching together.
//!
//! ```ignore
//! # use blockloader::{BlockLoader, InMemoryDataset, LoaderOptions, Mode};
//! # async fn demo() -> anyhow::Result<()> {
//! let ds = InMemoryDataset::new((0..100_000u32).collect());
//! let mut loader = BlockLoader::new(ds, LoaderOptions::default()
//!     .with_batch_size(64)
//!     .block_size(1024)
//!     .fetch_factor(4)
//!     .seed(42))?;
//! loader.set_mode(Mode::Train)?;
//!
//! let mut pass = loader.pass()?;
//! while let Some(batch) = pass.next_batch().await {
//!     let rows = batch?;
//!     // training step ...
//! }
//! # Ok(()) }
//! ```

use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_stream::try_stream;
use futures_core::stream::Stream;
use futures_util::stream as futstream;
use log::debug;
use tokio_util::sync::CancellationToken;

use crate::dataset::BlockDataset;
use crate::emitter::BatchEmitter;
use crate::error::{ConfigError, LoaderError};
use crate::fetcher::BlockFetcher;
use crate::options::LoaderOptions;
use crate::plan::{IndexPlan, Mode, mix_seed};
use crate::prefetch::{BatchReceiver, spawn_workers};
use crate::transform::{BatchTransform, FetchTransform, IdentityBatch, IdentityFetch};

/// Blocked, prefetching, mode-aware sampler over a [`BlockDataset`].
///
/// Configuration is fixed at construction; `subset` and `set_mode` are
/// pass-scoped and rejected while a pass is in progress.  Each call to
/// [`BlockLoader::pass`] re-plans: Train mode draws a fresh block
/// permutation per pass, Eval mode reproduces subset order exactly.
pub struct BlockLoader<D, FT = IdentityFetch, BT = IdentityBatch>
where
    D: BlockDataset,
    FT: FetchTransform<D::Raw>,
    BT: BatchTransform<FT::Row>,
{
    dataset: Arc<D>,
    fetch_tf: Arc<FT>,
    batch_tf: Arc<BT>,
    opts: LoaderOptions,
    subset: Option<Vec<usize>>,
    mode: Mode,
    epoch: u64,
    iterating: Arc<AtomicBool>,
}

impl<D> BlockLoader<D>
where
    D: BlockDataset,
    IdentityFetch: FetchTransform<D::Raw>,
{
    /// Create a loader with identity transforms.
    ///
    /// Fails with a [`ConfigError`] if any size knob is zero.
    pub fn new(dataset: D, opts: LoaderOptions) -> Result<Self, ConfigError> {
        opts.validate()?;
        Ok(Self {
            dataset: Arc::new(dataset),
            fetch_tf: Arc::new(IdentityFetch),
            batch_tf: Arc::new(IdentityBatch),
            opts,
            subset: None,
            mode: Mode::default(),
            epoch: 0,
            iterating: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Create a loader over an already-shared dataset handle.
    ///
    /// Several loaders may share one handle (e.g. a train and an eval
    /// instance over the same collection); the capability is read-only.
    pub fn with_shared(dataset: Arc<D>, opts: LoaderOptions) -> Result<Self, ConfigError> {
        opts.validate()?;
        Ok(Self {
            dataset,
            fetch_tf: Arc::new(IdentityFetch),
            batch_tf: Arc::new(IdentityBatch),
            opts,
            subset: None,
            mode: Mode::default(),
            epoch: 0,
            iterating: Arc::new(AtomicBool::new(false)),
        })
    }
}

impl<D, FT, BT> BlockLoader<D, FT, BT>
where
    D: BlockDataset,
    FT: FetchTransform<D::Raw>,
    BT: BatchTransform<FT::Row>,
{
    /// Create a loader with explicit transforms.
    ///
    /// Required when the dataset's raw payload is a lazy proxy rather
    /// than a materialized row vector.
    pub fn with_transforms(
        dataset: D,
        opts: LoaderOptions,
        fetch_tf: FT,
        batch_tf: BT,
    ) -> Result<Self, ConfigError> {
        opts.validate()?;
        Ok(Self {
            dataset: Arc::new(dataset),
            fetch_tf: Arc::new(fetch_tf),
            batch_tf: Arc::new(batch_tf),
            opts,
            subset: None,
            mode: Mode::default(),
            epoch: 0,
            iterating: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Replace the fetch-transform (raw payload → materialized rows).
    pub fn with_fetch_transform<FT2>(self, transform: FT2) -> BlockLoader<D, FT2, BT>
    where
        FT2: FetchTransform<D::Raw>,
        BT: BatchTransform<FT2::Row>,
    {
        BlockLoader {
            dataset: self.dataset,
            fetch_tf: Arc::new(transform),
            batch_tf: self.batch_tf,
            opts: self.opts,
            subset: self.subset,
            mode: self.mode,
            epoch: self.epoch,
            iterating: self.iterating,
        }
    }

    /// Replace the batch-transform (row slice → consumer batch).
    pub fn with_batch_transform<BT2>(self, transform: BT2) -> BlockLoader<D, FT, BT2>
    where
        BT2: BatchTransform<FT::Row>,
    {
        BlockLoader {
            dataset: self.dataset,
            fetch_tf: self.fetch_tf,
            batch_tf: Arc::new(transform),
            opts: self.opts,
            subset: self.subset,
            mode: self.mode,
            epoch: self.epoch,
            iterating: self.iterating,
        }
    }

    /// Restrict visitation to the given ordered index sequence.
    ///
    /// Duplicates are allowed and not deduplicated.  Rejected while a
    /// pass is in progress.
    pub fn subset(&mut self, indices: Vec<usize>) -> Result<(), ConfigError> {
        self.ensure_not_iterating()?;
        let len = self.dataset.len();
        if let Some(&bad) = indices.iter().find(|&&i| i >= len) {
            return Err(ConfigError::SubsetIndexOutOfRange { index: bad, len });
        }
        self.subset = Some(indices);
        Ok(())
    }

    /// Select shuffling behavior for subsequent passes.  Rejected while
    /// a pass is in progress.
    pub fn set_mode(&mut self, mode: Mode) -> Result<(), ConfigError> {
        self.ensure_not_iterating()?;
        self.mode = mode;
        Ok(())
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Rows visited per pass (subset length, or the full dataset).
    pub fn num_rows(&self) -> usize {
        self.subset
            .as_ref()
            .map(|s| s.len())
            .unwrap_or_else(|| self.dataset.len())
    }

    /// Exact number of batches the next pass will emit.
    ///
    /// Computed from the same plan the pass would build, so it accounts
    /// for short blocks landing mid-sequence under Train shuffling.
    pub fn num_batches(&self) -> usize {
        let plan = self.build_plan();
        plan.count_batches(
            self.opts.resolved_workers(),
            self.opts.fetch_factor,
            self.opts.batch_size,
        )
    }

    /// Start a pass, spawning the prefetch workers.
    ///
    /// Must be called from within a tokio runtime.  Only one pass may be
    /// in flight per loader; dropping the returned [`Pass`] (or draining
    /// it) ends the pass and re-enables reconfiguration.
    pub fn pass(&mut self) -> Result<Pass<BT::Batch>, ConfigError> {
        self.ensure_not_iterating()?;

        let plan = self.build_plan();
        let num_batches = plan.count_batches(
            self.opts.resolved_workers(),
            self.opts.fetch_factor,
            self.opts.batch_size,
        );
        let pass_seed = self.next_pass_seed();
        debug!(
            "pass {}: mode {:?}, {} rows, {} blocks, {} batches",
            self.epoch,
            self.mode,
            plan.num_rows(),
            plan.num_blocks(),
            num_batches,
        );

        let partitions = plan.partition(self.opts.resolved_workers());
        let token = CancellationToken::new();
        let receivers = spawn_workers(
            BlockFetcher::new(Arc::clone(&self.dataset), Arc::clone(&self.fetch_tf)),
            BatchEmitter::new(self.opts.batch_size, Arc::clone(&self.batch_tf)),
            partitions,
            self.mode,
            self.opts.fetch_factor,
            pass_seed,
            self.opts.resolved_queue_depth(),
            token.clone(),
        );

        self.epoch += 1;
        self.iterating.store(true, Ordering::Release);

        Ok(Pass {
            receivers,
            rr: 0,
            num_batches,
            token,
            iterating: Arc::clone(&self.iterating),
            finished: false,
        })
    }

    /// One-shot convenience: consume the loader and stream one pass's
    /// batches.
    pub fn stream(
        mut self,
    ) -> Pin<Box<dyn Stream<Item = Result<BT::Batch, LoaderError>> + Send + 'static>> {
        Box::pin(try_stream! {
            let mut pass = self.pass().map_err(LoaderError::from)?;
            while let Some(item) = pass.next_batch().await {
                let batch = item?;
                yield batch;
            }
        })
    }

    fn ensure_not_iterating(&self) -> Result<(), ConfigError> {
        if self.iterating.load(Ordering::Acquire) {
            Err(ConfigError::PassInProgress)
        } else {
            Ok(())
        }
    }

    fn build_plan(&self) -> IndexPlan {
        let owned;
        let subset: &[usize] = match &self.subset {
            Some(s) => s,
            None => {
                owned = (0..self.dataset.len()).collect::<Vec<_>>();
                &owned
            }
        };
        IndexPlan::build(subset, self.opts.block_size, self.mode, self.next_pass_seed())
    }

    // Epoch 0 uses the configured seed directly, so two fresh loaders
    // with equal seeds reproduce byte-identical first passes.
    fn next_pass_seed(&self) -> u64 {
        if self.epoch == 0 {
            self.opts.seed
        } else {
            mix_seed(self.opts.seed, self.epoch)
        }
    }
}

impl<D, FT, BT> std::fmt::Debug for BlockLoader<D, FT, BT>
where
    D: BlockDataset,
    FT: FetchTransform<D::Raw>,
    BT: BatchTransform<FT::Row>,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlockLoader")
            .field("batch_size", &self.opts.batch_size)
            .field("block_size", &self.opts.block_size)
            .field("fetch_factor", &self.opts.fetch_factor)
            .field("mode", &self.mode)
            .field("num_rows", &self.num_rows())
            .finish()
    }
}

/// Handle for one in-flight pass.
///
/// Pull batches with [`Pass::next_batch`]; `None` marks exhaustion.
/// Worker queues are drained round-robin, so global batch order across
/// workers is not guaranteed — pin `num_workers` to 1 when exact order
/// reproducibility matters.  Dropping the handle cancels all in-flight
/// fetch work.
pub struct Pass<B> {
    receivers: Vec<BatchReceiver<B>>,
    rr: usize,
    num_batches: usize,
    token: CancellationToken,
    iterating: Arc<AtomicBool>,
    finished: bool,
}

impl<B> Pass<B> {
    /// Exact number of batches this pass emits when it completes
    /// without error.
    pub fn num_batches(&self) -> usize {
        self.num_batches
    }

    /// Next batch, or `None` once every worker is exhausted.
    ///
    /// A `Some(Err(_))` reports a fetch or transform failure at exactly
    /// the batch boundary that required the failing block; batches
    /// already delivered remain valid.
    pub async fn next_batch(&mut self) -> Option<Result<B, LoaderError>> {
        while !self.receivers.is_empty() {
            if self.rr >= self.receivers.len() {
                self.rr = 0;
            }
            match self.receivers[self.rr].recv().await {
                Some(item) => {
                    self.rr += 1;
                    return Some(item);
                }
                None => {
                    // this worker is done; drop its queue and move on
                    self.receivers.remove(self.rr);
                }
            }
        }
        self.finish();
        None
    }

    /// Adapt the pull interface into an async stream.
    pub fn into_stream(
        self,
    ) -> Pin<Box<dyn Stream<Item = Result<B, LoaderError>> + Send + 'static>>
    where
        B: Send + 'static,
    {
        Box::pin(futstream::unfold(self, |mut pass| async move {
            pass.next_batch().await.map(|item| (item, pass))
        }))
    }

    fn finish(&mut self) {
        if !self.finished {
            self.finished = true;
            self.token.cancel();
            self.iterating.store(false, Ordering::Release);
        }
    }
}

impl<B> Drop for Pass<B> {
    fn drop(&mut self) {
        self.finish();
    }
}
