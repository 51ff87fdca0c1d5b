//! # Watermarker - Memory-Aware Batch Watermarking
//!
//! Applies a watermark image to every photo in a folder tree, sequentially,
//! on a thread pool, or on a pool of worker processes, while keeping resident
//! memory in check.
//!
//! ## Features
//!
//! - **Three execution modes**: sequential, thread pool, process pool
//! - **Memory feedback loop**: background RSS sampling drives reclamation passes
//! - **Precompression**: oversized inputs are downscaled before compositing
//! - **Layered configuration**: defaults, file, environment, CLI flags
//!
//! ## Quick Start
//!
//! ```bash
//! watermarker config init
//! watermarker run --input-folder photos --output-folder marked --watermark logo.png
//! ```

pub mod cli;
pub mod config;
pub mod discovery;
pub mod engine;
pub mod error;
pub mod logging;
pub mod memory;
pub mod parallel;
pub mod watermark;

pub use cli::{Cli, Output};
pub use config::{Settings, SettingsLoader};
pub use engine::{Engine, RunSummary, TaskResult};
pub use error::{ErrorKind, WatermarkError};

/// Result type alias for watermarker operations
pub type Result<T> = anyhow::Result<T>;

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const PKG_NAME: &str = env!("CARGO_PKG_NAME");
pub const PKG_DESCRIPTION: &str = env!("CARGO_PKG_DESCRIPTION");
