use crate::config::Settings;
use anyhow::Result;
use crossbeam::channel::{Receiver, Sender, bounded};
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Cooperative stop signal. Checked between dispatches and before a worker
/// picks up a queued item; items already running always finish.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// How a run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Completion {
    /// Items whose results reached the collector
    pub completed: usize,
    pub cancelled: bool,
}

/// Producer-consumer pool over a bounded crossbeam channel.
///
/// The producer runs on the calling thread, so the input iterator is pulled
/// lazily and never has to cross a thread boundary. Results are handed to
/// the collector in completion order, which is arbitrary.
pub struct ParallelExecutor {
    max_workers: usize,
    buffer_size: usize,
}

impl ParallelExecutor {
    pub fn new(max_workers: usize) -> Self {
        let max_workers = max_workers.max(1);
        Self {
            max_workers,
            buffer_size: max_workers * 2,
        }
    }

    pub fn workers(&self) -> usize {
        self.max_workers
    }

    pub fn execute<T, R, I, F, C>(
        &self,
        work_items: I,
        cancel: &CancelToken,
        processor: F,
        collector: C,
    ) -> Result<Completion>
    where
        I: IntoIterator<Item = T>,
        T: Send,
        R: Send,
        F: Fn(T, usize) -> R + Sync, // (item, worker_id)
        C: FnMut(R) + Send,
    {
        let (work_tx, work_rx): (Sender<T>, Receiver<T>) = bounded(self.buffer_size);
        let (result_tx, result_rx): (Sender<R>, Receiver<R>) = bounded(self.buffer_size);
        let processor = &processor;

        crossbeam::thread::scope(|s| -> Result<Completion> {
            for worker_id in 0..self.max_workers {
                let work_rx = work_rx.clone();
                let result_tx = result_tx.clone();
                let cancel = cancel.clone();

                s.spawn(move |_| {
                    while let Ok(work_item) = work_rx.recv() {
                        if cancel.is_cancelled() {
                            continue; // drain without processing
                        }
                        if result_tx.send(processor(work_item, worker_id)).is_err() {
                            break; // Collector dropped
                        }
                    }
                });
            }

            // Drop our copies so the channels close when workers finish
            drop(work_rx);
            drop(result_tx);

            let collector = s.spawn(move |_| collect_results(result_rx, collector));

            let mut cancelled = false;
            for work_item in work_items {
                if cancel.is_cancelled() {
                    cancelled = true;
                    break;
                }
                if work_tx.send(work_item).is_err() {
                    break; // Workers dropped
                }
            }
            drop(work_tx);

            let completed = collector
                .join()
                .map_err(|_| anyhow::anyhow!("Result collector panicked"))?;

            Ok(Completion {
                completed,
                cancelled: cancelled || cancel.is_cancelled(),
            })
        })
        .map_err(|_| anyhow::anyhow!("Thread panic occurred during parallel execution"))?
    }
}

fn collect_results<R, C: FnMut(R)>(result_rx: Receiver<R>, mut collector: C) -> usize {
    let mut items_processed = 0;
    while let Ok(result) = result_rx.recv() {
        collector(result);
        items_processed += 1;
    }
    items_processed
}

/// Runs items one at a time, in input order, on the calling thread
pub struct SequentialExecutor;

impl SequentialExecutor {
    pub fn execute<T, R, I, F, C>(
        work_items: I,
        cancel: &CancelToken,
        mut processor: F,
        mut collector: C,
    ) -> Completion
    where
        I: IntoIterator<Item = T>,
        F: FnMut(T, usize) -> R,
        C: FnMut(R),
    {
        let mut completion = Completion::default();
        for work_item in work_items {
            if cancel.is_cancelled() {
                completion.cancelled = true;
                break;
            }
            collector(processor(work_item, 0)); // Sequential uses worker_id 0
            completion.completed += 1;
        }
        completion
    }
}

/// Execution mode for a run, chosen once from the settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionMode {
    Sequential,
    ThreadPool { workers: usize },
    ProcessPool { workers: usize },
}

impl ExecutionMode {
    /// ```text
    /// enable_parallel  advanced_memory  ->  mode
    /// false            any                  Sequential
    /// true             false                ThreadPool
    /// true             true                 ProcessPool
    /// ```
    pub fn select(settings: &Settings) -> Self {
        if !settings.enable_parallel {
            return ExecutionMode::Sequential;
        }
        let workers = Self::calculate_optimal_workers(settings.workers, settings.thread_percentage);
        if settings.enable_advanced_memory_management {
            ExecutionMode::ProcessPool { workers }
        } else {
            ExecutionMode::ThreadPool { workers }
        }
    }

    pub fn workers(&self) -> usize {
        match self {
            ExecutionMode::Sequential => 1,
            ExecutionMode::ThreadPool { workers } | ExecutionMode::ProcessPool { workers } => {
                *workers
            }
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ExecutionMode::Sequential => "sequential",
            ExecutionMode::ThreadPool { .. } => "thread-pool",
            ExecutionMode::ProcessPool { .. } => "process-pool",
        }
    }

    /// Worker count from configuration and available cores.
    ///
    /// An explicit `workers_config` wins; 0 means `cores * thread_percentage / 100`,
    /// never less than one.
    pub fn calculate_optimal_workers(workers_config: usize, thread_percentage: u8) -> usize {
        if workers_config > 0 {
            return workers_config;
        }
        let available_cores = num_cpus::get();
        std::cmp::max(1, (available_cores * thread_percentage as usize) / 100)
    }
}

impl fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutionMode::Sequential => f.write_str(self.name()),
            _ => write!(f, "{} ({} workers)", self.name(), self.workers()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_sequential_executor() {
        let mut results = Vec::new();
        let completion = SequentialExecutor::execute(
            vec![1, 2, 3, 4, 5],
            &CancelToken::new(),
            |x, _worker_id| x * 2,
            |r| results.push(r),
        );
        assert_eq!(results, vec![2, 4, 6, 8, 10]);
        assert_eq!(completion.completed, 5);
        assert!(!completion.cancelled);
    }

    #[test]
    fn test_parallel_executor() {
        let executor = ParallelExecutor::new(2);
        let mut results = Vec::new();
        let completion = executor
            .execute(
                vec![1, 2, 3, 4, 5],
                &CancelToken::new(),
                |x, _worker_id| x * 2,
                |r| results.push(r),
            )
            .unwrap();

        // Results may be in different order due to parallel execution
        results.sort();
        assert_eq!(results, vec![2, 4, 6, 8, 10]);
        assert_eq!(completion.completed, 5);
    }

    #[test]
    fn test_parallel_executor_empty_input() {
        let executor = ParallelExecutor::new(4);
        let completion = executor
            .execute(
                Vec::<u32>::new(),
                &CancelToken::new(),
                |x, _| x,
                |_| panic!("nothing to collect"),
            )
            .unwrap();
        assert_eq!(completion, Completion::default());
    }

    #[test]
    fn test_parallel_executor_pulls_lazily_from_non_send_iterator() {
        // Rc is !Send; the producer must stay on the calling thread
        let source = std::rc::Rc::new((0..50).collect::<Vec<u32>>());
        let items = (0..50).map(|i| source[i]);
        let total = AtomicUsize::new(0);

        ParallelExecutor::new(3)
            .execute(items, &CancelToken::new(), |x, _| x, |r| {
                total.fetch_add(r as usize, Ordering::Relaxed);
            })
            .unwrap();

        assert_eq!(total.load(Ordering::Relaxed), (0..50).sum::<usize>());
    }

    #[test]
    fn test_worker_ids_stay_in_range() {
        let executor = ParallelExecutor::new(3);
        let mut seen = Vec::new();
        executor
            .execute(0..30, &CancelToken::new(), |_, worker_id| worker_id, |id| seen.push(id))
            .unwrap();
        assert!(seen.iter().all(|id| *id < 3));
    }

    #[test]
    fn test_cancel_stops_sequential_dispatch() {
        let cancel = CancelToken::new();
        let mut results = Vec::new();
        let completion = SequentialExecutor::execute(
            1..=10,
            &cancel,
            |x, _| {
                if x == 3 {
                    cancel.cancel();
                }
                x
            },
            |r| results.push(r),
        );
        // The item in flight finishes, nothing after it starts
        assert_eq!(results, vec![1, 2, 3]);
        assert!(completion.cancelled);
    }

    #[test]
    fn test_cancel_stops_parallel_dispatch() {
        let cancel = CancelToken::new();
        let completion = ParallelExecutor::new(2)
            .execute(
                0..10_000,
                &cancel,
                |x, _| {
                    if x == 10 {
                        cancel.cancel();
                    }
                    x
                },
                |_| {},
            )
            .unwrap();
        assert!(completion.cancelled);
        assert!(completion.completed < 10_000);
    }

    #[test]
    fn test_mode_selection() {
        let sequential = Settings::default();
        assert_eq!(ExecutionMode::select(&sequential), ExecutionMode::Sequential);

        let threads = Settings {
            enable_parallel: true,
            workers: 3,
            ..Settings::default()
        };
        assert_eq!(
            ExecutionMode::select(&threads),
            ExecutionMode::ThreadPool { workers: 3 }
        );

        let processes = Settings {
            enable_advanced_memory_management: true,
            ..threads
        };
        assert_eq!(
            ExecutionMode::select(&processes),
            ExecutionMode::ProcessPool { workers: 3 }
        );

        // Advanced memory management alone does not enable parallelism
        let advanced_only = Settings {
            enable_advanced_memory_management: true,
            ..Settings::default()
        };
        assert_eq!(ExecutionMode::select(&advanced_only), ExecutionMode::Sequential);
    }

    #[test]
    fn test_calculate_optimal_workers() {
        assert_eq!(ExecutionMode::calculate_optimal_workers(6, 75), 6);
        assert!(ExecutionMode::calculate_optimal_workers(0, 75) >= 1);
        assert!(ExecutionMode::calculate_optimal_workers(0, 1) >= 1);
        assert!(ExecutionMode::calculate_optimal_workers(0, 100) <= num_cpus::get());
    }

    #[test]
    fn test_mode_display() {
        assert_eq!(ExecutionMode::Sequential.to_string(), "sequential");
        assert_eq!(
            ExecutionMode::ThreadPool { workers: 4 }.to_string(),
            "thread-pool (4 workers)"
        );
    }
}
