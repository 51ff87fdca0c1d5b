//! Image discovery
//!
//! Produces the lazy, per-run sequence of `ImageTask`s the engine consumes.
//! Walking is done with `ignore`'s walker with its git/hidden filters turned
//! off, so every image under the input folder is seen regardless of
//! `.gitignore` files or dot-prefixed names.

use crate::config::Settings;
use crate::engine::ImageTask;
use crate::error::WatermarkError;
use ignore::{Walk, WalkBuilder};
use std::fs;
use std::path::{Path, PathBuf};

/// File extensions treated as images (case-insensitive)
pub const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "bmp", "gif"];

/// Check whether a path has a supported image extension
pub fn is_supported_image(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| {
            IMAGE_EXTENSIONS
                .iter()
                .any(|known| known.eq_ignore_ascii_case(ext))
        })
}

/// Start discovering images under `settings.input_folder`.
///
/// Fails with `DiscoveryError` when the input folder is missing, not a
/// directory, or unreadable. Everything after that is lazy: entries are read
/// as the iterator is advanced.
pub fn discover(settings: &Settings) -> Result<ImageWalk, WatermarkError> {
    let root = settings.input_folder.clone();

    let metadata = fs::metadata(&root).map_err(|e| WatermarkError::discovery(&root, e))?;
    if !metadata.is_dir() {
        return Err(WatermarkError::discovery(&root, "not a directory"));
    }
    fs::read_dir(&root).map_err(|e| WatermarkError::discovery(&root, e))?;

    let mut builder = WalkBuilder::new(&root);
    builder
        .standard_filters(false)
        .follow_links(true)
        .sort_by_file_name(|a, b| a.cmp(b));

    if !settings.recursive {
        builder.max_depth(Some(1));
    }

    // Never re-watermark previous outputs nested inside the input tree
    if let Some(nested) = nested_output(&root, &settings.output_folder) {
        let walk_root = root.clone();
        builder.filter_entry(move |entry| {
            !entry
                .path()
                .strip_prefix(&walk_root)
                .is_ok_and(|relative| relative.starts_with(&nested))
        });
    }

    tracing::debug!(
        "Discovering images in {} (recursive: {})",
        root.display(),
        settings.recursive
    );

    Ok(ImageWalk {
        root,
        walk: builder.build(),
    })
}

/// Output folder relative to the input root, when it lies strictly inside it
fn nested_output(root: &Path, output: &Path) -> Option<PathBuf> {
    let root = resolve(root);
    let output = resolve(output);
    let relative = output.strip_prefix(&root).ok()?;
    (!relative.as_os_str().is_empty()).then(|| relative.to_path_buf())
}

/// Absolute form of `path` with symlinks and `..` resolved as far as it exists
fn resolve(path: &Path) -> PathBuf {
    if let Ok(canonical) = fs::canonicalize(path) {
        return canonical;
    }
    let absolute = std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf());
    match (absolute.parent(), absolute.file_name()) {
        (Some(parent), Some(name)) => fs::canonicalize(parent)
            .map(|parent| parent.join(name))
            .unwrap_or(absolute),
        _ => absolute,
    }
}

/// Lazy iterator over discovered images
pub struct ImageWalk {
    root: PathBuf,
    walk: Walk,
}

impl Iterator for ImageWalk {
    type Item = ImageTask;

    fn next(&mut self) -> Option<ImageTask> {
        loop {
            let entry = match self.walk.next()? {
                Ok(entry) => entry,
                Err(e) => {
                    tracing::warn!("Skipping unreadable entry: {}", e);
                    continue;
                }
            };

            if !entry.file_type().is_some_and(|ft| ft.is_file()) {
                continue;
            }
            if !is_supported_image(entry.path()) {
                continue;
            }

            let relative_dir = entry
                .path()
                .parent()
                .and_then(|parent| parent.strip_prefix(&self.root).ok())
                .map(Path::to_path_buf)
                .unwrap_or_default();

            return Some(ImageTask::new(entry.into_path(), relative_dir));
        }
    }
}
