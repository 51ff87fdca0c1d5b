use crate::config::Settings;
use image::DynamicImage;
use image::imageops::FilterType;

/// Dimensions after fitting the longer side to `threshold`, or `None` when
/// the image already fits
pub fn target_dimensions(width: u32, height: u32, threshold: u32) -> Option<(u32, u32)> {
    let longer = width.max(height);
    if longer <= threshold || threshold == 0 {
        return None;
    }

    let shorter = width.min(height);
    let scaled = ((shorter as f64 * threshold as f64 / longer as f64).round() as u32).max(1);

    if width >= height {
        Some((threshold, scaled))
    } else {
        Some((scaled, threshold))
    }
}

/// Downscales oversized inputs before compositing
#[derive(Debug, Clone, Copy)]
pub struct PrecompressionGate {
    threshold: Option<u32>,
}

impl PrecompressionGate {
    pub fn new(settings: &Settings) -> Self {
        let active = settings.enable_advanced_memory_management && settings.enable_precompression;
        Self {
            threshold: active.then_some(settings.large_image_threshold),
        }
    }

    pub fn is_active(&self) -> bool {
        self.threshold.is_some()
    }

    /// Returns the image to composite on and whether it was shrunk
    pub fn maybe_shrink(&self, image: DynamicImage) -> (DynamicImage, bool) {
        let Some(threshold) = self.threshold else {
            return (image, false);
        };
        match target_dimensions(image.width(), image.height(), threshold) {
            Some((width, height)) => {
                tracing::debug!(
                    "Precompressing {}x{} to {}x{}",
                    image.width(),
                    image.height(),
                    width,
                    height
                );
                (image.resize_exact(width, height, FilterType::Lanczos3), true)
            }
            None => (image, false),
        }
    }
}
