//! Execution strategies
//!
//! This module owns **how** work items are run, never **what** they do:
//!
//! - `ExecutionMode`: the closed set of run modes, selected once per run
//! - `SequentialExecutor`: one item at a time on the calling thread
//! - `ParallelExecutor`: bounded crossbeam producer/consumer thread pool
//! - `ProcessPool`: worker child processes driven through a `ParallelExecutor`
//! - `CancelToken`: cooperative stop between dispatches
//!
//! ```text
//! ┌──────────────┐   ImageTask   ┌──────────────────┐   result   ┌────────────┐
//! │ producer     │──────────────▶│ workers 0..N     │───────────▶│ collector  │
//! │ (caller)     │   bounded     │ thread or child  │  bounded   │ (summary)  │
//! └──────────────┘               └──────────────────┘            └────────────┘
//! ```
//!
//! ```rust,no_run
//! use watermarker::parallel::{CancelToken, ParallelExecutor};
//!
//! let mut total = 0;
//! ParallelExecutor::new(4)
//!     .execute(1..=100, &CancelToken::new(), |x, _worker_id| x * 2, |r| total += r)
//!     .unwrap();
//! ```

pub mod core;
pub mod process_pool;

pub use self::core::{CancelToken, Completion, ExecutionMode, ParallelExecutor, SequentialExecutor};
pub use process_pool::{ProcessPool, WORKER_SUBCOMMAND, WorkerReply, serve};
