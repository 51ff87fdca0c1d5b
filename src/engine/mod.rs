//! Batch engine
//!
//! `Engine::run` selects an `ExecutionMode` once, wires the renderer into the
//! memory feedback loop, pushes every discovered task through the chosen
//! executor and folds results into a `RunSummary`.

pub mod types;

pub use types::{Failure, ImageTask, RunSummary, TaskOutcome, TaskResult};

use crate::config::Settings;
use crate::error::WatermarkError;
use crate::memory::MemoryManager;
use crate::parallel::{
    CancelToken, Completion, ExecutionMode, ParallelExecutor, ProcessPool, SequentialExecutor,
};
use crate::watermark::{WatermarkRenderer, WatermarkTask};
use anyhow::Result;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

/// Called on the collector thread for every finished task
pub type ProgressHook = Arc<dyn Fn(&TaskResult) + Send + Sync>;

pub struct Engine {
    settings: Settings,
    worker_program: Option<PathBuf>,
    progress: Option<ProgressHook>,
    cancel: CancelToken,
}

impl Engine {
    /// `settings` are expected to be validated already
    pub fn new(settings: Settings) -> Self {
        Self {
            settings,
            worker_program: None,
            progress: None,
            cancel: CancelToken::new(),
        }
    }

    /// Executable started for process-pool workers (run as `<program> worker`)
    pub fn with_worker_program(mut self, program: impl Into<PathBuf>) -> Self {
        self.worker_program = Some(program.into());
        self
    }

    pub fn with_progress(mut self, hook: ProgressHook) -> Self {
        self.progress = Some(hook);
        self
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn mode(&self) -> ExecutionMode {
        ExecutionMode::select(&self.settings)
    }

    /// Watermark every task. Per-image failures are recorded in the summary;
    /// only a watermark that cannot be loaded (or a missing worker program in
    /// process-pool mode) fails the run.
    pub fn run<I>(&self, tasks: I) -> Result<RunSummary>
    where
        I: IntoIterator<Item = ImageTask>,
    {
        let started = Instant::now();
        let mode = self.mode();
        tracing::info!("Execution mode: {}", mode);

        let mut summary = RunSummary {
            mode: mode.name().to_string(),
            workers: mode.workers(),
            ..RunSummary::default()
        };

        let completion = match mode {
            ExecutionMode::Sequential | ExecutionMode::ThreadPool { .. } => {
                self.run_in_process(mode, tasks, &mut summary)?
            }
            ExecutionMode::ProcessPool { workers } => {
                self.run_process_pool(workers, tasks, &mut summary)?
            }
        };

        summary.cancelled = completion.cancelled;
        summary.elapsed = started.elapsed();

        if summary.discovered == 0 && !summary.cancelled {
            tracing::warn!(
                "No images found in {}",
                self.settings.input_folder.display()
            );
        }
        if summary.cancelled {
            tracing::warn!(
                "Run cancelled after {} of the discovered images",
                completion.completed
            );
        }
        tracing::info!(
            "Processed {} images ({} failed) in {:.2?}",
            summary.discovered,
            summary.failed,
            summary.elapsed
        );

        Ok(summary)
    }

    fn run_in_process<I>(
        &self,
        mode: ExecutionMode,
        tasks: I,
        summary: &mut RunSummary,
    ) -> Result<Completion>
    where
        I: IntoIterator<Item = ImageTask>,
    {
        let renderer = Arc::new(WatermarkRenderer::load(&self.settings)?);
        let memory = MemoryManager::start(&self.settings, renderer.clone());
        let pipeline = WatermarkTask::for_settings(renderer, &self.settings);
        let coordinator = memory.coordinator();

        let process = |task: ImageTask, _worker_id: usize| {
            let result = pipeline.execute(&task);
            coordinator.on_item_completed();
            result
        };
        let progress = self.progress.as_ref();
        let collect = |result: TaskResult| record(summary, progress, result);

        let completion = match mode {
            ExecutionMode::ThreadPool { workers } => {
                ParallelExecutor::new(workers).execute(tasks, &self.cancel, process, collect)?
            }
            _ => SequentialExecutor::execute(tasks, &self.cancel, process, collect),
        };

        if let Some(reading) = memory.latest_reading() {
            tracing::debug!("Resident memory at end of run: {} MB", reading.resident_mb);
        }
        summary.reclamation_passes = memory.finish();
        Ok(completion)
    }

    fn run_process_pool<I>(
        &self,
        workers: usize,
        tasks: I,
        summary: &mut RunSummary,
    ) -> Result<Completion>
    where
        I: IntoIterator<Item = ImageTask>,
    {
        let program = self.worker_program.clone().ok_or_else(|| {
            WatermarkError::config("process-pool mode needs a worker executable")
        })?;
        // Fail before spawning anything if the mark is unusable
        WatermarkRenderer::load(&self.settings)?;

        let pool = ProcessPool::new(program, &self.settings, workers)?;
        let progress = self.progress.as_ref();
        let mut passes = 0;

        let completion = ParallelExecutor::new(workers).execute(
            tasks,
            &self.cancel,
            |task: ImageTask, worker_id| pool.execute(&task, worker_id),
            |reply| {
                if reply.reclaimed {
                    passes += 1;
                }
                record(summary, progress, reply.result);
            },
        )?;

        pool.shutdown();
        tracing::debug!("Process pool started {} workers", pool.spawned());
        summary.reclamation_passes = passes;
        Ok(completion)
    }
}

fn record(summary: &mut RunSummary, progress: Option<&ProgressHook>, result: TaskResult) {
    if let Some(hook) = progress {
        hook(&result);
    }
    summary.record(result);
}
