use super::worker::{ShardWorker, WorkerSettings};
use super::{QueryProvenance, QueryResult, RankingEngine};
use crate::datasets::Query;
use crate::error::PoolError;
use futures::future::join_all;
use indicatif::{ProgressBar, ProgressStyle};
use std::num::NonZeroUsize;
use std::ops::Range;
use std::thread;
use std::time::Duration;
use tracing::{debug, info, warn};

const DEFAULT_TOPK: usize = 100;
const DEFAULT_SLOW_QUERY_THRESHOLD: Duration = Duration::from_secs(5);
const PROGRESS_TEMPLATE: &str =
    "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} queries ({eta})";

/// Fixed set of shard workers, each owning a ranking engine built once at
/// construction. Serves one batch at a time: [`RankerPool::feed_data`] stages
/// it, [`RankerPool::run`] executes it.
pub struct RankerPool<E> {
    workers: Vec<ShardWorker<E>>,
    expected_workers: usize,
    topk: usize,
    slow_query_threshold: Duration,
    show_progress: bool,
}

impl<E: RankingEngine> RankerPool<E> {
    /// Builds `min(worker_count, available parallelism)` workers, calling
    /// `factory` once per worker index. Fails if any engine fails to build.
    pub fn new<F>(worker_count: usize, factory: F) -> Result<Self, PoolError>
    where
        F: FnMut(usize) -> anyhow::Result<E>,
    {
        let available = thread::available_parallelism()
            .map(NonZeroUsize::get)
            .unwrap_or(1);
        Self::with_capacity_limit(worker_count, available, factory)
    }

    fn with_capacity_limit<F>(
        worker_count: usize,
        limit: usize,
        mut factory: F,
    ) -> Result<Self, PoolError>
    where
        F: FnMut(usize) -> anyhow::Result<E>,
    {
        if worker_count == 0 {
            return Err(PoolError::InvalidWorkerCount);
        }

        let num_workers = worker_count.min(limit.max(1));
        if num_workers < worker_count {
            info!(
                "Capping ranker workers at {} (requested {})",
                num_workers, worker_count
            );
        }

        info!("Initializing {} ranking engines", num_workers);
        let mut workers = Vec::with_capacity(num_workers);
        for index in 0..num_workers {
            let engine = factory(index).map_err(|e| PoolError::EngineInit {
                worker: index,
                reason: format!("{:#}", e),
            })?;
            workers.push(ShardWorker::new(index, engine));
            debug!("Ranking engine {} ready", index);
        }

        Ok(Self {
            workers,
            expected_workers: num_workers,
            topk: DEFAULT_TOPK,
            slow_query_threshold: DEFAULT_SLOW_QUERY_THRESHOLD,
            show_progress: false,
        })
    }

    pub fn with_progress(mut self, show_progress: bool) -> Self {
        self.show_progress = show_progress;
        self
    }

    pub fn with_slow_query_threshold(mut self, threshold: Duration) -> Self {
        self.slow_query_threshold = threshold;
        self
    }

    pub fn worker_count(&self) -> usize {
        self.expected_workers
    }

    /// Number of queries staged for the next [`RankerPool::run`].
    pub fn staged_len(&self) -> usize {
        self.workers.iter().map(ShardWorker::shard_len).sum()
    }

    /// Splits `queries` into contiguous, balanced shards, one per worker.
    /// Replaces any batch staged earlier. Nothing is executed here.
    pub fn feed_data(&mut self, queries: Vec<Query>, topk: usize) {
        self.topk = topk;
        let ranges = partition(queries.len(), self.workers.len());
        let mut remaining = queries.into_iter();

        for (worker, range) in self.workers.iter_mut().zip(ranges) {
            let shard: Vec<Query> = remaining.by_ref().take(range.len()).collect();
            debug!(
                worker = worker.index(),
                start = range.start,
                end = range.end,
                "Assigned shard"
            );
            worker.assign(shard);
        }
    }

    /// Runs every staged shard on its own blocking thread and waits for all of
    /// them. Per-worker outputs are merged in worker order, so the result is
    /// independent of completion order.
    pub async fn run(&mut self) -> Result<QueryResult, PoolError> {
        if self.workers.len() != self.expected_workers {
            return Err(PoolError::Degraded {
                available: self.workers.len(),
                expected: self.expected_workers,
            });
        }

        let settings = WorkerSettings {
            topk: self.topk,
            slow_query_threshold: self.slow_query_threshold,
        };
        let progress = self.progress_bar();

        let handles: Vec<_> = std::mem::take(&mut self.workers)
            .into_iter()
            .map(|mut worker| {
                let settings = settings.clone();
                let progress = if worker.index() == 0 {
                    progress.clone()
                } else {
                    ProgressBar::hidden()
                };
                tokio::task::spawn_blocking(move || {
                    let ranked = worker.process(&settings, &progress);
                    (worker, ranked)
                })
            })
            .collect();

        let joined = join_all(handles).await;
        progress.finish_and_clear();

        let mut result = QueryResult::default();
        let mut lost = Vec::new();
        for outcome in joined {
            match outcome {
                Ok((worker, ranked)) => {
                    debug!(worker = worker.index(), results = ranked.len(), "Worker finished");
                    for entry in ranked {
                        result.insert(QueryProvenance::from(entry));
                    }
                    self.workers.push(worker);
                }
                Err(e) => lost.push(e.to_string()),
            }
        }

        if !lost.is_empty() {
            warn!("{} ranking workers did not return", lost.len());
            return Err(PoolError::WorkerLost {
                lost: lost.len(),
                total: self.expected_workers,
                reason: lost.join("; "),
            });
        }

        Ok(result)
    }

    // Progress follows worker 0 only.
    fn progress_bar(&self) -> ProgressBar {
        let first_shard = self.workers.first().map_or(0, ShardWorker::shard_len);
        if !self.show_progress || first_shard == 0 {
            return ProgressBar::hidden();
        }

        let progress_bar = ProgressBar::new(first_shard as u64);
        if let Ok(style) = ProgressStyle::default_bar().template(PROGRESS_TEMPLATE) {
            progress_bar.set_style(style.progress_chars("#>-"));
        }
        progress_bar
    }
}

/// Contiguous block split of `len` items into `shards` ranges. The first
/// `len % shards` ranges hold one extra item.
pub fn partition(len: usize, shards: usize) -> Vec<Range<usize>> {
    if shards == 0 {
        return Vec::new();
    }

    let base = len / shards;
    let extra = len % shards;
    let mut start = 0;

    (0..shards)
        .map(|shard| {
            let size = base + usize::from(shard < extra);
            let range = start..start + size;
            start += size;
            range
        })
        .collect()
}
