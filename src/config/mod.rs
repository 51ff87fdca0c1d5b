//! Configuration management for watermarker
//!
//! `Settings` is the immutable snapshot the engine runs with. It is built by
//! layering defaults, an optional config file, environment variables and CLI
//! flags (see `core`), then validated once. The engine trusts it afterwards.

use crate::error::WatermarkError;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

pub mod core;

pub use self::core::{SettingsLoader, SettingsOverrides};

/// Where the watermark is anchored on the base image
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "snake_case")]
#[value(rename_all = "snake_case")]
pub enum Position {
    LeftTop,
    Top,
    RightTop,
    LeftBottom,
    #[default]
    Bottom,
    RightBottom,
}

impl Position {
    pub fn is_bottom(self) -> bool {
        matches!(
            self,
            Position::LeftBottom | Position::Bottom | Position::RightBottom
        )
    }
}

/// Full engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Folder scanned for input images
    pub input_folder: PathBuf,

    /// Folder receiving watermarked images
    pub output_folder: PathBuf,

    /// Watermark image (PNG with alpha recommended)
    pub watermark: PathBuf,

    /// Watermark opacity (0.0 - 1.0)
    pub opacity: f32,

    /// Watermark anchor
    pub position: Position,

    /// JPEG output quality (1 - 100)
    pub quality: u8,

    /// Watermark width as a percentage of the shorter base side (1 - 100)
    pub scale: f32,

    /// Edge margin in pixels for portrait images
    pub margin_vertical: u32,

    /// Edge margin in pixels for landscape and square images
    pub margin_horizontal: u32,

    /// Descend into subfolders and mirror them under the output folder
    pub recursive: bool,

    /// Optional tag appended to every output file stem
    pub output_tag: String,

    /// Completed images between count-based reclamation passes
    pub gc_batch_size: usize,

    /// Resident memory (MB) above which a reclamation pass is forced
    pub gc_memory_threshold: u64,

    /// Seconds between memory samples
    pub memory_check_interval: u64,

    /// Use memory readings first, batch count as fallback
    pub enable_mixed_mode: bool,

    /// Process images concurrently (adds a random suffix to output names)
    pub enable_parallel: bool,

    /// Length of the random output suffix in parallel mode (4 - 36)
    pub uuid_length: usize,

    /// Isolate parallel workers in their own processes
    pub enable_advanced_memory_management: bool,

    /// Shrink oversized images before compositing
    pub enable_precompression: bool,

    /// Longer-side pixel limit that triggers precompression (100 - 10000)
    pub large_image_threshold: u32,

    /// Worker count for parallel modes (0 = derive from CPU cores)
    pub workers: usize,

    /// Percentage of CPU cores used when `workers` is 0
    pub thread_percentage: u8,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            input_folder: PathBuf::from("original"),
            output_folder: PathBuf::from("output"),
            watermark: PathBuf::from("Logo.png"),
            opacity: 0.65,
            position: Position::Bottom,
            quality: 100,
            scale: 15.0,
            margin_vertical: 20,
            margin_horizontal: 15,
            recursive: false,
            output_tag: String::new(),
            gc_batch_size: 20,
            gc_memory_threshold: 500,
            memory_check_interval: 5,
            enable_mixed_mode: false,
            enable_parallel: false,
            uuid_length: 6,
            enable_advanced_memory_management: false,
            enable_precompression: false,
            large_image_threshold: 3000,
            workers: 0,
            thread_percentage: 75,
        }
    }
}

impl Settings {
    /// Validate ranges and references; every failure is a `ConfigError`
    pub fn validate(&self) -> Result<(), WatermarkError> {
        if !(0.0..=1.0).contains(&self.opacity) {
            return Err(WatermarkError::config(format!(
                "opacity must be between 0 and 1 (got {})",
                self.opacity
            )));
        }
        if !(1..=100).contains(&self.quality) {
            return Err(WatermarkError::config(format!(
                "quality must be between 1 and 100 (got {})",
                self.quality
            )));
        }
        if !(1.0..=100.0).contains(&self.scale) {
            return Err(WatermarkError::config(format!(
                "scale must be between 1 and 100 (got {})",
                self.scale
            )));
        }
        if !(4..=36).contains(&self.uuid_length) {
            return Err(WatermarkError::config(format!(
                "uuid_length must be between 4 and 36 (got {})",
                self.uuid_length
            )));
        }
        if !(100..=10_000).contains(&self.large_image_threshold) {
            return Err(WatermarkError::config(format!(
                "large_image_threshold must be between 100 and 10000 (got {})",
                self.large_image_threshold
            )));
        }
        if self.gc_batch_size == 0 {
            return Err(WatermarkError::config("gc_batch_size must be greater than 0"));
        }
        if self.gc_memory_threshold == 0 {
            return Err(WatermarkError::config(
                "gc_memory_threshold must be greater than 0",
            ));
        }
        if self.memory_check_interval == 0 {
            return Err(WatermarkError::config(
                "memory_check_interval must be greater than 0",
            ));
        }
        if !(1..=100).contains(&self.thread_percentage) {
            return Err(WatermarkError::config(format!(
                "thread_percentage must be between 1 and 100 (got {})",
                self.thread_percentage
            )));
        }
        if self.output_tag.contains(['/', '\\']) {
            return Err(WatermarkError::config(
                "output_tag must not contain path separators",
            ));
        }
        if !self.watermark.is_file() {
            return Err(WatermarkError::config(format!(
                "watermark {} is not an existing file",
                self.watermark.display()
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests;
