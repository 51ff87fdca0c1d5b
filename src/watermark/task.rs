use super::{OutputNamer, PrecompressionGate, WatermarkRenderer};
use crate::config::Settings;
use crate::engine::{ImageTask, TaskResult};
use crate::error::WatermarkError;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

/// Per-image pipeline: open, shrink if oversized, composite, name, write
pub struct WatermarkTask {
    renderer: Arc<WatermarkRenderer>,
    gate: PrecompressionGate,
    namer: OutputNamer,
}

impl WatermarkTask {
    pub fn new(renderer: Arc<WatermarkRenderer>, gate: PrecompressionGate, namer: OutputNamer) -> Self {
        Self {
            renderer,
            gate,
            namer,
        }
    }

    pub fn for_settings(renderer: Arc<WatermarkRenderer>, settings: &Settings) -> Self {
        Self::new(
            renderer,
            PrecompressionGate::new(settings),
            OutputNamer::new(settings),
        )
    }

    /// Run the pipeline for one image. Failures come back as a failed result.
    pub fn execute(&self, task: &ImageTask) -> TaskResult {
        match self.process(task) {
            Ok((output, dimensions, precompressed)) => {
                tracing::debug!("Watermarked {} -> {}", task.source.display(), output.display());
                TaskResult::written(&task.source, output, dimensions, precompressed)
            }
            Err(e) => {
                tracing::warn!("{}", e);
                TaskResult::failed(&task.source, &e)
            }
        }
    }

    fn process(&self, task: &ImageTask) -> Result<(PathBuf, (u32, u32), bool), WatermarkError> {
        let image = image::open(&task.source).map_err(|source| WatermarkError::ImageRead {
            path: task.source.clone(),
            source,
        })?;

        let (image, precompressed) = self.gate.maybe_shrink(image);
        let mut canvas = image.into_rgba8();
        let dimensions = canvas.dimensions();
        self.renderer.apply(&mut canvas);

        let output = self.namer.name_for(task);
        if let Some(parent) = output.parent() {
            fs::create_dir_all(parent).map_err(|e| WatermarkError::image_write(&output, e))?;
        }
        self.renderer.save(canvas, &output)?;

        Ok((output, dimensions, precompressed))
    }
}
