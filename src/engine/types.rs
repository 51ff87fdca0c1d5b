use crate::error::{ErrorKind, WatermarkError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// One discovered input image
///
/// `relative_dir` is the folder of `source` relative to the input root, which
/// is what lets recursive runs mirror the input tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageTask {
    pub source: PathBuf,
    pub relative_dir: PathBuf,
}

impl ImageTask {
    pub fn new(source: impl Into<PathBuf>, relative_dir: impl Into<PathBuf>) -> Self {
        Self {
            source: source.into(),
            relative_dir: relative_dir.into(),
        }
    }

    /// Task for a file directly under the input root
    pub fn top_level(source: impl Into<PathBuf>) -> Self {
        Self::new(source, PathBuf::new())
    }
}

/// Outcome of one task
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TaskOutcome {
    Written {
        output: PathBuf,
        /// Working resolution the watermark was composited at
        width: u32,
        height: u32,
        precompressed: bool,
    },
    Failed {
        kind: ErrorKind,
        message: String,
    },
}

/// Result from processing a single image
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskResult {
    pub input: PathBuf,
    pub outcome: TaskOutcome,
}

impl TaskResult {
    pub fn written(
        input: impl Into<PathBuf>,
        output: impl Into<PathBuf>,
        (width, height): (u32, u32),
        precompressed: bool,
    ) -> Self {
        Self {
            input: input.into(),
            outcome: TaskOutcome::Written {
                output: output.into(),
                width,
                height,
                precompressed,
            },
        }
    }

    pub fn failed(input: impl Into<PathBuf>, error: &WatermarkError) -> Self {
        Self {
            input: input.into(),
            outcome: TaskOutcome::Failed {
                kind: error.kind(),
                message: error.to_string(),
            },
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self.outcome, TaskOutcome::Written { .. })
    }

    pub fn output(&self) -> Option<&Path> {
        match &self.outcome {
            TaskOutcome::Written { output, .. } => Some(output),
            TaskOutcome::Failed { .. } => None,
        }
    }
}

/// A failed image in the run summary
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Failure {
    pub path: PathBuf,
    pub kind: ErrorKind,
    pub message: String,
}

/// Per-run summary. Built by folding results in any order.
#[derive(Debug, Default, Serialize)]
pub struct RunSummary {
    pub mode: String,
    pub workers: usize,
    pub discovered: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub precompressed: usize,
    pub failures: Vec<Failure>,
    pub outputs: Vec<PathBuf>,
    pub reclamation_passes: usize,
    pub cancelled: bool,
    pub elapsed: Duration,
}

impl RunSummary {
    pub fn record(&mut self, result: TaskResult) {
        self.discovered += 1;
        match result.outcome {
            TaskOutcome::Written {
                output,
                precompressed,
                ..
            } => {
                self.succeeded += 1;
                if precompressed {
                    self.precompressed += 1;
                }
                self.outputs.push(output);
            }
            TaskOutcome::Failed { kind, message } => {
                self.failed += 1;
                self.failures.push(Failure {
                    path: result.input,
                    kind,
                    message,
                });
            }
        }
    }

    pub fn is_clean(&self) -> bool {
        self.failed == 0
    }
}
