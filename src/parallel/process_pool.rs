//! Process-pool execution
//!
//! Each worker slot owns at most one child process running `<program> worker`.
//! The protocol is line-delimited JSON over the child's stdin/stdout:
//!
//! ```text
//! parent -> child   Settings            (once, first line)
//! parent -> child   ImageTask           (one line per task)
//! child  -> parent  WorkerReply         (one line per task)
//! parent closes stdin                   (child drains and exits)
//! ```
//!
//! Children log to stderr, so stdout carries nothing but replies.

use crate::config::Settings;
use crate::engine::{ImageTask, TaskResult};
use crate::error::WatermarkError;
use crate::memory::MemoryManager;
use crate::watermark::{WatermarkRenderer, WatermarkTask};
use serde::{Deserialize, Serialize};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Subcommand the child is started with
pub const WORKER_SUBCOMMAND: &str = "worker";

/// One reply line from a worker process
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerReply {
    pub result: TaskResult,
    /// Whether this task completion triggered a reclamation pass in the child
    pub reclaimed: bool,
}

struct WorkerProcess {
    child: Child,
    stdin: Option<BufWriter<ChildStdin>>,
    stdout: BufReader<ChildStdout>,
}

impl WorkerProcess {
    fn spawn(program: &Path, settings_line: &str) -> Result<Self, WatermarkError> {
        let mut command = Command::new(program);
        command
            .arg(WORKER_SUBCOMMAND)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit());
        // Own process group: a terminal Ctrl-C reaches only the parent, which
        // stops dispatch and lets children finish the image in hand
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            command.process_group(0);
        }
        let mut child = command
            .spawn()
            .map_err(|e| {
                WatermarkError::worker(format!("cannot start {}: {}", program.display(), e))
            })?;

        let (Some(stdin), Some(stdout)) = (child.stdin.take(), child.stdout.take()) else {
            let _ = child.kill();
            let _ = child.wait();
            return Err(WatermarkError::worker("worker pipes unavailable"));
        };

        let mut worker = Self {
            child,
            stdin: Some(BufWriter::new(stdin)),
            stdout: BufReader::new(stdout),
        };
        worker.send_line(settings_line)?;
        tracing::debug!("Started worker process {}", worker.child.id());
        Ok(worker)
    }

    fn round_trip(&mut self, task: &ImageTask) -> Result<WorkerReply, WatermarkError> {
        let line = serde_json::to_string(task)
            .map_err(|e| WatermarkError::worker(format!("cannot encode task: {}", e)))?;
        self.send_line(&line)?;

        let mut reply = String::new();
        let read = self
            .stdout
            .read_line(&mut reply)
            .map_err(|e| WatermarkError::worker(format!("reply read failed: {}", e)))?;
        if read == 0 {
            return Err(WatermarkError::worker(format!(
                "worker process {} exited while processing {}",
                self.child.id(),
                task.source.display()
            )));
        }
        serde_json::from_str(&reply)
            .map_err(|e| WatermarkError::worker(format!("malformed reply: {}", e)))
    }

    fn send_line(&mut self, line: &str) -> Result<(), WatermarkError> {
        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| WatermarkError::worker("worker stdin closed"))?;
        writeln!(stdin, "{}", line)
            .and_then(|_| stdin.flush())
            .map_err(|e| WatermarkError::worker(format!("write to worker failed: {}", e)))
    }

    /// Close stdin and wait for a clean exit
    fn finish(mut self) {
        self.stdin.take();
        match self.child.wait() {
            Ok(status) if !status.success() => {
                tracing::warn!("Worker process {} exited with {}", self.child.id(), status);
            }
            Ok(_) => {}
            Err(e) => tracing::warn!("Could not wait for worker process: {}", e),
        }
    }

    fn abandon(mut self) {
        self.stdin.take();
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

/// Pool of worker processes, one slot per parallel executor worker id
pub struct ProcessPool {
    program: PathBuf,
    settings_line: String,
    slots: Vec<Mutex<Option<WorkerProcess>>>,
    spawned: AtomicUsize,
}

impl ProcessPool {
    pub fn new(
        program: impl Into<PathBuf>,
        settings: &Settings,
        workers: usize,
    ) -> Result<Self, WatermarkError> {
        let settings_line = serde_json::to_string(settings)
            .map_err(|e| WatermarkError::worker(format!("cannot encode settings: {}", e)))?;
        Ok(Self {
            program: program.into(),
            settings_line,
            slots: (0..workers.max(1)).map(|_| Mutex::new(None)).collect(),
            spawned: AtomicUsize::new(0),
        })
    }

    /// Processes started so far, including replacements for lost workers
    pub fn spawned(&self) -> usize {
        self.spawned.load(Ordering::Relaxed)
    }

    /// Run one task on the worker owning `slot`, starting it on first use.
    ///
    /// A worker that dies or breaks protocol fails only this task and is
    /// replaced on the next call.
    pub fn execute(&self, task: &ImageTask, slot: usize) -> WorkerReply {
        let mut guard = self.slots[slot % self.slots.len()]
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        if guard.is_none() {
            match WorkerProcess::spawn(&self.program, &self.settings_line) {
                Ok(worker) => {
                    self.spawned.fetch_add(1, Ordering::Relaxed);
                    *guard = Some(worker);
                }
                Err(e) => return Self::lost(task, e),
            }
        }

        let Some(worker) = guard.as_mut() else {
            return Self::lost(task, WatermarkError::worker("worker slot empty"));
        };
        match worker.round_trip(task) {
            Ok(reply) => reply,
            Err(e) => {
                if let Some(worker) = guard.take() {
                    worker.abandon();
                }
                Self::lost(task, e)
            }
        }
    }

    /// Close every worker's input and wait for them to exit
    pub fn shutdown(&self) {
        for slot in &self.slots {
            let worker = slot
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner())
                .take();
            if let Some(worker) = worker {
                worker.finish();
            }
        }
    }

    fn lost(task: &ImageTask, error: WatermarkError) -> WorkerReply {
        tracing::warn!("{}", error);
        WorkerReply {
            result: TaskResult::failed(&task.source, &error),
            reclaimed: false,
        }
    }
}

impl Drop for ProcessPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Child side of the protocol. Returns the number of tasks served.
pub fn serve<R: BufRead, W: Write>(mut input: R, mut output: W) -> Result<usize, WatermarkError> {
    let mut line = String::new();
    if input
        .read_line(&mut line)
        .map_err(|e| WatermarkError::worker(format!("cannot read settings: {}", e)))?
        == 0
    {
        return Err(WatermarkError::worker("no settings received"));
    }
    let settings: Settings = serde_json::from_str(&line)
        .map_err(|e| WatermarkError::worker(format!("malformed settings: {}", e)))?;

    let renderer = Arc::new(WatermarkRenderer::load(&settings)?);
    let memory = MemoryManager::start(&settings, renderer.clone());
    let pipeline = WatermarkTask::for_settings(renderer, &settings);

    let mut served = 0;
    loop {
        line.clear();
        let read = input
            .read_line(&mut line)
            .map_err(|e| WatermarkError::worker(format!("cannot read task: {}", e)))?;
        if read == 0 {
            break;
        }
        if line.trim().is_empty() {
            continue;
        }

        let task: ImageTask = serde_json::from_str(&line)
            .map_err(|e| WatermarkError::worker(format!("malformed task: {}", e)))?;
        let result = pipeline.execute(&task);
        let reclaimed = memory.coordinator().on_item_completed();

        let reply = serde_json::to_string(&WorkerReply { result, reclaimed })
            .map_err(|e| WatermarkError::worker(format!("cannot encode reply: {}", e)))?;
        writeln!(output, "{}", reply)
            .and_then(|_| output.flush())
            .map_err(|e| WatermarkError::worker(format!("cannot write reply: {}", e)))?;
        served += 1;
    }

    let passes = memory.finish();
    tracing::debug!("Worker served {} tasks, {} reclamation passes", served, passes);
    Ok(served)
}
