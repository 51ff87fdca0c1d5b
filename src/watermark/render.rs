use crate::config::{Position, Settings};
use crate::error::WatermarkError;
use crate::memory::Reclaimer;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::{self, FilterType};
use image::{DynamicImage, ImageFormat, RgbaImage};
use std::collections::HashMap;
use std::io::BufWriter;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

/// Where a scaled mark lands on a base image
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Placement {
    pub x: i64,
    pub y: i64,
    pub width: u32,
    pub height: u32,
}

/// Composites the watermark onto base images.
///
/// The source mark is decoded once, with its alpha already multiplied by the
/// configured opacity. Scaled copies are cached by target width until the
/// next reclamation pass.
pub struct WatermarkRenderer {
    mark: RgbaImage,
    /// Fully transparent rows at the bottom of `mark`
    transparent_bottom_rows: u32,
    position: Position,
    scale: f32,
    margin_vertical: u32,
    margin_horizontal: u32,
    quality: u8,
    scaled: Mutex<HashMap<u32, Arc<RgbaImage>>>,
}

impl WatermarkRenderer {
    pub fn load(settings: &Settings) -> Result<Self, WatermarkError> {
        let mark = image::open(&settings.watermark).map_err(|e| {
            WatermarkError::config(format!(
                "cannot load watermark {}: {}",
                settings.watermark.display(),
                e
            ))
        })?;
        tracing::debug!(
            "Loaded watermark {} ({}x{})",
            settings.watermark.display(),
            mark.width(),
            mark.height()
        );
        Ok(Self::from_image(mark, settings))
    }

    pub fn from_image(mark: DynamicImage, settings: &Settings) -> Self {
        let mut mark = mark.into_rgba8();
        let opacity = settings.opacity.clamp(0.0, 1.0);
        for pixel in mark.pixels_mut() {
            pixel[3] = (pixel[3] as f32 * opacity) as u8;
        }
        let transparent_bottom_rows = transparent_bottom_rows(&mark);

        Self {
            mark,
            transparent_bottom_rows,
            position: settings.position,
            scale: settings.scale,
            margin_vertical: settings.margin_vertical,
            margin_horizontal: settings.margin_horizontal,
            quality: settings.quality.clamp(1, 100),
            scaled: Mutex::new(HashMap::new()),
        }
    }

    /// Number of scaled marks currently cached
    pub fn cached_marks(&self) -> usize {
        self.cache().len()
    }

    /// Compute where the mark goes on a `base_width` x `base_height` image
    pub fn placement(&self, base_width: u32, base_height: u32) -> Placement {
        let (width, height) = self.scaled_size(base_width, base_height);
        let overhang = self.scaled_overhang(width);

        let margin = if base_width < base_height {
            self.margin_vertical
        } else {
            self.margin_horizontal
        } as i64;

        let (base_w, base_h) = (base_width as i64, base_height as i64);
        let (w, h) = (width as i64, height as i64);

        let x = match self.position {
            Position::LeftTop | Position::LeftBottom => margin,
            Position::Top | Position::Bottom => (base_w - w) / 2,
            Position::RightTop | Position::RightBottom => base_w - w - margin,
        };
        let y = if self.position.is_bottom() {
            base_h - margin - (h - overhang)
        } else {
            margin
        };

        Placement {
            x,
            y,
            width,
            height,
        }
    }

    /// Alpha-composite the mark onto `base` in place
    pub fn apply(&self, base: &mut RgbaImage) -> Placement {
        let placement = self.placement(base.width(), base.height());
        let mark = self.scaled_mark(placement.width, placement.height);
        imageops::overlay(base, &*mark, placement.x, placement.y);
        placement
    }

    /// Encode `image` to `path`, choosing the format from the extension.
    ///
    /// The image is encoded into a temporary file beside `path` and renamed
    /// into place, so a failed write never leaves a partial output.
    pub fn save(&self, image: RgbaImage, path: &Path) -> Result<(), WatermarkError> {
        let format =
            ImageFormat::from_path(path).map_err(|e| WatermarkError::image_write(path, e))?;
        let folder = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };

        let staged = tempfile::Builder::new()
            .prefix(".watermarker-")
            .tempfile_in(folder)
            .map_err(|e| WatermarkError::image_write(path, e))?;
        let mut writer = BufWriter::new(staged);
        let encoded = match format {
            ImageFormat::Jpeg => {
                let rgb = DynamicImage::ImageRgba8(image).into_rgb8();
                let encoder = JpegEncoder::new_with_quality(&mut writer, self.quality);
                rgb.write_with_encoder(encoder)
            }
            other => DynamicImage::ImageRgba8(image).write_to(&mut writer, other),
        };
        encoded.map_err(|e| WatermarkError::image_write(path, e))?;

        let staged = writer
            .into_inner()
            .map_err(|e| WatermarkError::image_write(path, e.error()))?;
        // Temp files are created owner-only
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            staged
                .as_file()
                .set_permissions(std::fs::Permissions::from_mode(0o644))
                .map_err(|e| WatermarkError::image_write(path, e))?;
        }
        staged
            .persist(path)
            .map_err(|e| WatermarkError::image_write(path, e.error))?;
        Ok(())
    }

    fn scaled_size(&self, base_width: u32, base_height: u32) -> (u32, u32) {
        let shorter = base_width.min(base_height) as f32;
        let width = ((shorter * self.scale / 100.0) as u32).max(1);
        let ratio = self.mark.height() as f64 / self.mark.width().max(1) as f64;
        let height = ((width as f64 * ratio).round() as u32).max(1);
        (width, height)
    }

    fn scaled_overhang(&self, width: u32) -> i64 {
        let factor = width as f64 / self.mark.width().max(1) as f64;
        (self.transparent_bottom_rows as f64 * factor).round() as i64
    }

    fn scaled_mark(&self, width: u32, height: u32) -> Arc<RgbaImage> {
        let mut cache = self.cache();
        cache
            .entry(width)
            .or_insert_with(|| {
                Arc::new(imageops::resize(&self.mark, width, height, FilterType::Lanczos3))
            })
            .clone()
    }

    fn cache(&self) -> MutexGuard<'_, HashMap<u32, Arc<RgbaImage>>> {
        self.scaled
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Reclaimer for WatermarkRenderer {
    fn reclaim(&self) {
        let mut cache = self.cache();
        let released = cache.len();
        cache.clear();
        cache.shrink_to_fit();
        tracing::debug!("Released {} cached watermark sizes", released);
    }
}

fn transparent_bottom_rows(mark: &RgbaImage) -> u32 {
    (0..mark.height())
        .rev()
        .take_while(|&y| (0..mark.width()).all(|x| mark.get_pixel(x, y)[3] == 0))
        .count() as u32
}
