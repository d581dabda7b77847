// src/prefetch.rs
//
//! Prefetching worker scheduler.
//!
//! One tokio task per worker runs the fetch → accumulate → shuffle →
//! emit pipeline over its own disjoint partition of the pass's block
//! sequence, pushing ready batches into a bounded single-producer queue.
//! The bound gives backpressure: a producer stalls once its queue is
//! full, so look-ahead memory stays capped at
//! `queue_depth * num_workers` batches plus one super-block per worker.
//!
//! On a fetch or transform failure the worker forwards the error through
//! its queue and stops; other workers are unaffected.  Cancelling the
//! shared token makes every worker abandon further fetches promptly and
//! drop any buffered rows; a partial batch is never delivered.

use log::{debug, trace};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::dataset::BlockDataset;
use crate::emitter::BatchEmitter;
use crate::error::LoaderError;
use crate::fetcher::BlockFetcher;
use crate::plan::{Mode, worker_seed};
use crate::sampler::SuperBlockBuilder;
use crate::transform::{BatchTransform, FetchTransform};

pub(crate) type BatchReceiver<B> = mpsc::Receiver<Result<B, LoaderError>>;

/// Spawn one producer task per partition and return their queues, in
/// partition order.
pub(crate) fn spawn_workers<D, FT, BT>(
    fetcher: BlockFetcher<D, FT>,
    emitter: BatchEmitter<BT>,
    partitions: Vec<Vec<Vec<usize>>>,
    mode: Mode,
    fetch_factor: usize,
    pass_seed: u64,
    queue_depth: usize,
    token: CancellationToken,
) -> Vec<BatchReceiver<BT::Batch>>
where
    D: BlockDataset,
    FT: FetchTransform<D::Raw>,
    BT: BatchTransform<FT::Row>,
{
    let mut receivers = Vec::with_capacity(partitions.len());

    for (worker_id, blocks) in partitions.into_iter().enumerate() {
        let (tx, rx) = mpsc::channel(queue_depth.max(1));
        let fetcher = fetcher.clone();
        let emitter = emitter.clone();
        let token = token.clone();
        // Per-worker RNG stream, salted into a domain disjoint from the
        // epoch-derived pass seeds.
        let seed = worker_seed(pass_seed, worker_id);

        tokio::spawn(async move {
            run_worker(
                worker_id,
                fetcher,
                emitter,
                blocks,
                mode,
                fetch_factor,
                seed,
                tx,
                token,
            )
            .await;
        });

        receivers.push(rx);
    }

    receivers
}

async fn run_worker<D, FT, BT>(
    worker_id: usize,
    fetcher: BlockFetcher<D, FT>,
    emitter: BatchEmitter<BT>,
    blocks: Vec<Vec<usize>>,
    mode: Mode,
    fetch_factor: usize,
    seed: u64,
    tx: mpsc::Sender<Result<BT::Batch, LoaderError>>,
    token: CancellationToken,
) where
    D: BlockDataset,
    FT: FetchTransform<D::Raw>,
    BT: BatchTransform<FT::Row>,
{
    let mut builder = SuperBlockBuilder::new(fetch_factor, mode, seed);
    debug!("worker {worker_id}: {} blocks assigned", blocks.len());

    for block in blocks {
        // Racing the fetch against the token drops an in-flight fetch
        // the moment the pass is torn down instead of letting it run out.
        let rows = tokio::select! {
            biased;
            _ = token.cancelled() => {
                trace!("worker {worker_id}: cancelled");
                return;
            }
            fetched = fetcher.fetch_block(&block) => match fetched {
                Ok(rows) => rows,
                Err(e) => {
                    let _ = tx.send(Err(e)).await;
                    return;
                }
            },
        };
        if let Some(pool) = builder.push(rows) {
            if !flush_pool(&emitter, pool, &tx, &token).await {
                return;
            }
        }
    }

    // Trailing partial super-block.
    if let Some(pool) = builder.finish() {
        if !flush_pool(&emitter, pool, &tx, &token).await {
            return;
        }
    }

    debug!("worker {worker_id}: exhausted");
}

/// Emit one super-block's batches into the queue.  Returns `false` when
/// the worker should stop (error forwarded, consumer gone, or cancelled).
async fn flush_pool<R, BT>(
    emitter: &BatchEmitter<BT>,
    pool: Vec<R>,
    tx: &mpsc::Sender<Result<BT::Batch, LoaderError>>,
    token: &CancellationToken,
) -> bool
where
    BT: BatchTransform<R>,
    R: Send + 'static,
{
    for batch in emitter.emit(pool) {
        if token.is_cancelled() {
            return false;
        }
        match batch {
            Ok(b) => {
                if tx.send(Ok(b)).await.is_err() {
                    return false; // receiver dropped
                }
            }
            Err(e) => {
                let _ = tx.send(Err(e)).await;
                return false;
            }
        }
    }
    true
}
