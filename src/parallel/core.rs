use anyhow::{Context, Result};
use crossbeam::channel::{Receiver, Sender, bounded};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Hand-managed worker threads pulling from a bounded channel
pub struct ParallelExecutor {
    max_workers: usize,
    buffer_size: usize,
}

/// Context for worker threads to avoid too many function parameters
struct WorkerContext<'a, T, R, F, P> {
    worker_id: usize,
    work_rx: Receiver<(usize, T)>,
    result_tx: Sender<(usize, R)>,
    progress_counter: &'a AtomicUsize,
    total_items: usize,
    processor: &'a F,
    progress_reporter: Option<&'a P>,
}

impl ParallelExecutor {
    pub fn new(max_workers: usize) -> Self {
        let max_workers = max_workers.max(1);
        Self {
            max_workers,
            buffer_size: max_workers * 2,
        }
    }

    /// Execute work items on worker threads, returning results in input order
    pub fn execute<T, R, F, P>(
        &self,
        work_items: Vec<T>,
        processor: F,
        progress_reporter: Option<P>,
    ) -> Result<Vec<R>>
    where
        T: Send,
        R: Send,
        F: Fn(T, usize) -> R + Sync,
        P: Fn(usize, usize, usize) + Sync, // (current, total, worker_id)
    {
        if work_items.is_empty() {
            return Ok(Vec::new());
        }

        let actual_workers = std::cmp::min(self.max_workers, work_items.len());
        let (work_tx, work_rx) = bounded::<(usize, T)>(self.buffer_size);
        let (result_tx, result_rx) = bounded::<(usize, R)>(self.buffer_size);

        let progress_counter = AtomicUsize::new(0);
        let total_items = work_items.len();

        let mut indexed = crossbeam::thread::scope(|s| {
            for worker_id in 0..actual_workers {
                let ctx = WorkerContext {
                    worker_id,
                    work_rx: work_rx.clone(),
                    result_tx: result_tx.clone(),
                    progress_counter: &progress_counter,
                    total_items,
                    processor: &processor,
                    progress_reporter: progress_reporter.as_ref(),
                };
                s.spawn(move |_| Self::worker_thread(ctx));
            }

            // Producer thread: send work to workers
            s.spawn(move |_| {
                for indexed_item in work_items.into_iter().enumerate() {
                    if work_tx.send(indexed_item).is_err() {
                        break; // Workers dropped
                    }
                }
            });

            // Drop our copies so the channels close once workers finish
            drop(work_rx);
            drop(result_tx);

            Self::collect_results(result_rx, total_items)
        })
        .map_err(|_| anyhow::anyhow!("Thread panic occurred during parallel execution"))?;

        indexed.sort_by_key(|(index, _)| *index);
        Ok(indexed.into_iter().map(|(_, result)| result).collect())
    }

    fn worker_thread<T, R, F, P>(ctx: WorkerContext<'_, T, R, F, P>)
    where
        F: Fn(T, usize) -> R,
        P: Fn(usize, usize, usize),
    {
        while let Ok((index, work_item)) = ctx.work_rx.recv() {
            let result = (ctx.processor)(work_item, ctx.worker_id);

            if ctx.result_tx.send((index, result)).is_err() {
                break; // Receiver dropped
            }

            let current = ctx.progress_counter.fetch_add(1, Ordering::Relaxed) + 1;
            if let Some(reporter) = ctx.progress_reporter {
                reporter(current, ctx.total_items, ctx.worker_id);
            }
        }
    }

    fn collect_results<R>(result_rx: Receiver<(usize, R)>, total_items: usize) -> Vec<(usize, R)> {
        let mut results = Vec::with_capacity(total_items);
        while let Ok(result) = result_rx.recv() {
            results.push(result);
            if results.len() >= total_items {
                break;
            }
        }
        results
    }
}

/// Sequential execution strategy, the baseline every other strategy is compared to
pub struct SequentialExecutor;

impl SequentialExecutor {
    pub fn execute<T, R, F, P>(work_items: Vec<T>, processor: F, progress_reporter: Option<P>) -> Vec<R>
    where
        F: Fn(T, usize) -> R,
        P: Fn(usize, usize, usize),
    {
        let total_items = work_items.len();
        let mut results = Vec::with_capacity(total_items);

        for (index, work_item) in work_items.into_iter().enumerate() {
            results.push(processor(work_item, 0)); // Sequential uses worker_id 0

            if let Some(reporter) = &progress_reporter {
                reporter(index + 1, total_items, 0);
            }
        }

        results
    }
}

/// Executor pool backed by a dedicated rayon thread pool
pub struct PoolExecutor {
    pool: rayon::ThreadPool,
}

impl PoolExecutor {
    pub fn new(workers: usize) -> Result<Self> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers.max(1))
            .thread_name(|index| format!("syncbench-pool-{index}"))
            .build()
            .context("Failed to build executor pool")?;
        Ok(Self { pool })
    }

    pub fn execute<T, R, F, P>(&self, work_items: Vec<T>, processor: F, progress_reporter: Option<P>) -> Vec<R>
    where
        T: Send,
        R: Send,
        F: Fn(T, usize) -> R + Sync + Send,
        P: Fn(usize, usize, usize) + Sync + Send,
    {
        let total_items = work_items.len();
        let progress_counter = AtomicUsize::new(0);

        self.pool.install(|| {
            work_items
                .into_par_iter()
                .map(|work_item| {
                    let worker_id = rayon::current_thread_index().unwrap_or(0);
                    let result = processor(work_item, worker_id);
                    let current = progress_counter.fetch_add(1, Ordering::Relaxed) + 1;
                    if let Some(reporter) = &progress_reporter {
                        reporter(current, total_items, worker_id);
                    }
                    result
                })
                .collect()
        })
    }
}

/// How an experiment distributes its work items
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum ExecutionStrategy {
    Sequential,
    Threads { workers: usize },
    Pool { workers: usize },
}

impl ExecutionStrategy {
    pub fn workers(&self) -> usize {
        match self {
            ExecutionStrategy::Sequential => 1,
            ExecutionStrategy::Threads { workers } | ExecutionStrategy::Pool { workers } => *workers,
        }
    }

    /// Run `processor` over every item; results come back in input order.
    ///
    /// The processor receives the item and the index of the worker running it.
    pub fn execute<T, R, F, P>(
        &self,
        work_items: Vec<T>,
        processor: F,
        progress_reporter: Option<P>,
    ) -> Result<Vec<R>>
    where
        T: Send,
        R: Send,
        F: Fn(T, usize) -> R + Send + Sync,
        P: Fn(usize, usize, usize) + Send + Sync,
    {
        match self {
            ExecutionStrategy::Sequential => Ok(SequentialExecutor::execute(
                work_items,
                processor,
                progress_reporter,
            )),
            ExecutionStrategy::Threads { workers } => {
                ParallelExecutor::new(*workers).execute(work_items, processor, progress_reporter)
            }
            ExecutionStrategy::Pool { workers } => {
                Ok(PoolExecutor::new(*workers)?.execute(work_items, processor, progress_reporter))
            }
        }
    }
}

impl fmt::Display for ExecutionStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutionStrategy::Sequential => f.write_str("sequential"),
            ExecutionStrategy::Threads { workers } => write!(f, "threads x{workers}"),
            ExecutionStrategy::Pool { workers } => write!(f, "pool x{workers}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Mutex;

    const NO_PROGRESS: Option<fn(usize, usize, usize)> = None;

    #[test]
    fn test_sequential_executor() {
        let results = SequentialExecutor::execute(vec![1, 2, 3, 4, 5], |x, _worker_id| x * 2, NO_PROGRESS);
        assert_eq!(results, vec![2, 4, 6, 8, 10]);
    }

    #[test]
    fn test_parallel_executor_keeps_input_order() {
        let executor = ParallelExecutor::new(3);
        let results = executor
            .execute((0..50).collect(), |x: u64, _worker_id| x * x, NO_PROGRESS)
            .unwrap();
        assert_eq!(results, (0..50).map(|x| x * x).collect::<Vec<_>>());
    }

    #[test]
    fn test_parallel_executor_uses_several_workers() {
        let seen = Mutex::new(HashSet::new());
        let executor = ParallelExecutor::new(4);
        executor
            .execute(
                (0..40).collect::<Vec<u32>>(),
                |_, worker_id| {
                    seen.lock().unwrap().insert(worker_id);
                    std::thread::sleep(std::time::Duration::from_millis(2));
                },
                NO_PROGRESS,
            )
            .unwrap();
        let seen = seen.into_inner().unwrap();
        assert!(seen.len() > 1);
        assert!(seen.iter().all(|id| *id < 4));
    }

    #[test]
    fn test_empty_input() {
        let strategy = ExecutionStrategy::Threads { workers: 4 };
        let results: Vec<u8> = strategy.execute(Vec::<u8>::new(), |x, _| x, NO_PROGRESS).unwrap();
        assert!(results.is_empty());
    }

    #[test]
    fn test_every_strategy_agrees() {
        let strategies = [
            ExecutionStrategy::Sequential,
            ExecutionStrategy::Threads { workers: 2 },
            ExecutionStrategy::Pool { workers: 2 },
        ];
        for strategy in strategies {
            let results = strategy
                .execute(vec![1, 2, 3], |x, _worker_id| x * 3, NO_PROGRESS)
                .unwrap();
            assert_eq!(results, vec![3, 6, 9], "{strategy}");
        }
    }

    #[test]
    fn test_progress_reaches_total() {
        let last = AtomicUsize::new(0);
        let reporter = |current: usize, total: usize, _worker: usize| {
            assert_eq!(total, 10);
            last.fetch_max(current, Ordering::Relaxed);
        };
        ExecutionStrategy::Pool { workers: 3 }
            .execute((0..10).collect::<Vec<_>>(), |x, _| x, Some(reporter))
            .unwrap();
        assert_eq!(last.load(Ordering::Relaxed), 10);
    }

    #[test]
    fn test_strategy_serde_shape() {
        let json = serde_json::to_string(&ExecutionStrategy::Pool { workers: 4 }).unwrap();
        assert_eq!(json, r#"{"strategy":"pool","workers":4}"#);
    }
}
