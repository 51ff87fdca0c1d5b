//! `watermarker run`

use crate::cli::Output;
use crate::config::{Position, SettingsLoader, SettingsOverrides};
use crate::discovery;
use crate::engine::{Engine, RunSummary, TaskResult};
use crate::error::WatermarkError;
use anyhow::Result;
use clap::Args;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Failures listed individually before the rest are summarized
const MAX_LISTED_FAILURES: usize = 10;

/// Exit status after a cancelled run
const EXIT_CANCELLED: i32 = 130;

/// Every flag overrides the matching setting from file or environment
#[derive(Args, Debug, Default)]
pub struct RunArgs {
    /// Folder scanned for input images
    #[arg(short = 'i', long, value_name = "DIR")]
    pub input_folder: Option<PathBuf>,

    /// Folder receiving watermarked images
    #[arg(short = 'o', long, value_name = "DIR")]
    pub output_folder: Option<PathBuf>,

    /// Watermark image
    #[arg(short = 'w', long, value_name = "FILE")]
    pub watermark: Option<PathBuf>,

    /// Watermark opacity (0.0 - 1.0)
    #[arg(long)]
    pub opacity: Option<f32>,

    /// Watermark anchor
    #[arg(long, value_enum)]
    pub position: Option<Position>,

    /// JPEG quality (1 - 100)
    #[arg(long)]
    pub quality: Option<u8>,

    /// Watermark width as % of the shorter image side
    #[arg(long)]
    pub scale: Option<f32>,

    /// Margin in pixels for portrait images
    #[arg(long)]
    pub margin_vertical: Option<u32>,

    /// Margin in pixels for landscape and square images
    #[arg(long)]
    pub margin_horizontal: Option<u32>,

    /// Descend into subfolders and mirror them in the output
    #[arg(short = 'r', long, num_args = 0..=1, default_missing_value = "true", require_equals = true)]
    pub recursive: Option<bool>,

    /// Tag appended to every output file stem
    #[arg(long)]
    pub output_tag: Option<String>,

    /// Images between count-based reclamation passes
    #[arg(long)]
    pub gc_batch_size: Option<usize>,

    /// Resident memory (MB) that forces a reclamation pass in mixed mode
    #[arg(long)]
    pub gc_memory_threshold: Option<u64>,

    /// Seconds between memory samples
    #[arg(long)]
    pub memory_check_interval: Option<u64>,

    /// Trigger reclamation on memory pressure as well as on batch count
    #[arg(long, num_args = 0..=1, default_missing_value = "true", require_equals = true)]
    pub enable_mixed_mode: Option<bool>,

    /// Process images concurrently
    #[arg(short = 'p', long, num_args = 0..=1, default_missing_value = "true", require_equals = true)]
    pub enable_parallel: Option<bool>,

    /// Length of the random suffix added to parallel outputs
    #[arg(long)]
    pub uuid_length: Option<usize>,

    /// Use worker processes in parallel mode and allow precompression
    #[arg(long, num_args = 0..=1, default_missing_value = "true", require_equals = true)]
    pub enable_advanced_memory_management: Option<bool>,

    /// Downscale images larger than --large-image-threshold first
    #[arg(long, num_args = 0..=1, default_missing_value = "true", require_equals = true)]
    pub enable_precompression: Option<bool>,

    /// Longer-side pixel limit for precompression
    #[arg(long)]
    pub large_image_threshold: Option<u32>,

    /// Worker count (0 = derive from CPU cores)
    #[arg(short = 'j', long)]
    pub workers: Option<usize>,

    /// Percentage of CPU cores used when workers is 0
    #[arg(long)]
    pub thread_percentage: Option<u8>,

    /// Print the run summary as JSON
    #[arg(long)]
    pub json: bool,
}

impl RunArgs {
    pub fn overrides(&self) -> SettingsOverrides {
        SettingsOverrides {
            input_folder: self.input_folder.clone(),
            output_folder: self.output_folder.clone(),
            watermark: self.watermark.clone(),
            opacity: self.opacity,
            position: self.position,
            quality: self.quality,
            scale: self.scale,
            margin_vertical: self.margin_vertical,
            margin_horizontal: self.margin_horizontal,
            recursive: self.recursive,
            output_tag: self.output_tag.clone(),
            gc_batch_size: self.gc_batch_size,
            gc_memory_threshold: self.gc_memory_threshold,
            memory_check_interval: self.memory_check_interval,
            enable_mixed_mode: self.enable_mixed_mode,
            enable_parallel: self.enable_parallel,
            uuid_length: self.uuid_length,
            enable_advanced_memory_management: self.enable_advanced_memory_management,
            enable_precompression: self.enable_precompression,
            large_image_threshold: self.large_image_threshold,
            workers: self.workers,
            thread_percentage: self.thread_percentage,
        }
    }
}

pub async fn execute(args: RunArgs, config: Option<&Path>, output: &Output) -> Result<()> {
    let settings = SettingsLoader::new(config)?
        .with_overrides(&args.overrides())
        .load()?;

    let mut engine = Engine::new(settings);
    match std::env::current_exe() {
        Ok(exe) => engine = engine.with_worker_program(exe),
        Err(e) => tracing::debug!("Cannot resolve own executable: {}", e),
    }
    output.verbose(&format!("Execution mode: {}", engine.mode()));

    let spinner = output.spinner("watermarked");
    let progress_bar = spinner.clone();
    let engine = engine.with_progress(Arc::new(move |result: &TaskResult| {
        progress_bar.inc(1);
        if let Some(name) = result.input.file_name() {
            progress_bar.set_message(name.to_string_lossy().to_string());
        }
    }));

    let cancel = engine.cancel_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted, finishing images in flight");
            cancel.cancel();
        }
    });

    // Discovery and the run share the blocking thread; the walk is lazy
    let outcome = tokio::task::spawn_blocking(move || -> Result<RunSummary> {
        let tasks = discovery::discover(engine.settings())?;
        engine.run(tasks)
    })
    .await?;
    spinner.finish_and_clear();
    let summary = match outcome {
        Ok(summary) => summary,
        Err(e) => {
            if let Some(error) = e.downcast_ref::<WatermarkError>()
                && error.kind().is_fatal()
            {
                output.error(&error.to_string());
                std::process::exit(1);
            }
            return Err(e);
        }
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        print_summary(&summary, output);
    }

    if summary.cancelled {
        std::process::exit(EXIT_CANCELLED);
    }
    if !summary.is_clean() {
        std::process::exit(1);
    }
    Ok(())
}

fn print_summary(summary: &RunSummary, output: &Output) {
    if summary.discovered == 0 {
        output.warning("No images found");
        return;
    }

    output.header("Watermark Summary");
    output.key_value("Mode:", &summary.mode, false);
    output.key_value("Workers:", &summary.workers.to_string(), false);
    output.key_value("Images:", &summary.discovered.to_string(), false);
    output.key_value("Written:", &summary.succeeded.to_string(), summary.failed == 0);
    output.key_value("Failed:", &summary.failed.to_string(), false);
    output.key_value("Precompressed:", &summary.precompressed.to_string(), false);
    output.key_value(
        "Reclamation passes:",
        &summary.reclamation_passes.to_string(),
        false,
    );
    output.key_value("Elapsed:", &format!("{:.2?}", summary.elapsed), false);

    if !summary.failures.is_empty() {
        output.blank_line();
        output.separator();
        for failure in summary.failures.iter().take(MAX_LISTED_FAILURES) {
            output.list_item(&format!(
                "{} [{}] {}",
                failure.path.display(),
                failure.kind,
                failure.message
            ));
        }
        if summary.failures.len() > MAX_LISTED_FAILURES {
            output.list_item(&format!(
                "... and {} more",
                summary.failures.len() - MAX_LISTED_FAILURES
            ));
        }
        output.separator();
    }

    output.blank_line();
    if summary.cancelled {
        output.warning("Run cancelled before all images were dispatched");
    }
    let message = format!(
        "{} of {} images watermarked",
        summary.succeeded, summary.discovered
    );
    output.task_summary(&message, summary.is_clean());
}
