use crate::config::Settings;
use crate::engine::ImageTask;
use std::collections::HashSet;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use uuid::Uuid;

/// Re-draws allowed before accepting a suffix the run has already issued
const MAX_SUFFIX_DRAWS: usize = 16;

/// Hex digits of a v4 UUID fixed by its version and variant bits
const FIXED_NIBBLES: [usize; 2] = [12, 16];

/// Random lowercase hex suffix of exactly `len` characters.
///
/// Only the random digits of each UUID are used, so every character carries
/// full entropy.
pub fn random_suffix(len: usize) -> String {
    let mut suffix = String::with_capacity(len + 32);
    while suffix.len() < len {
        let uuid = Uuid::new_v4().simple().to_string();
        suffix.extend(
            uuid.chars()
                .enumerate()
                .filter(|(i, _)| !FIXED_NIBBLES.contains(i))
                .map(|(_, c)| c),
        );
    }
    suffix.truncate(len);
    suffix
}

/// Maps inputs to output paths for one run.
///
/// Sequential runs keep the original file name, so reruns overwrite the same
/// outputs. Parallel runs append `_<suffix>` to the stem; issued paths are
/// remembered for the run and a repeated draw is re-drawn. Uniqueness across
/// separate worker processes is probabilistic.
pub struct OutputNamer {
    output_root: PathBuf,
    recursive: bool,
    suffix_len: Option<usize>,
    tag: String,
    issued: Mutex<HashSet<PathBuf>>,
}

impl OutputNamer {
    pub fn new(settings: &Settings) -> Self {
        Self {
            output_root: settings.output_folder.clone(),
            recursive: settings.recursive,
            suffix_len: settings.enable_parallel.then_some(settings.uuid_length),
            tag: settings.output_tag.clone(),
            issued: Mutex::new(HashSet::new()),
        }
    }

    pub fn name_for(&self, task: &ImageTask) -> PathBuf {
        let folder = if self.recursive {
            self.output_root.join(&task.relative_dir)
        } else {
            self.output_root.clone()
        };

        let Some(suffix_len) = self.suffix_len else {
            return folder.join(self.file_name(&task.source, None));
        };

        let mut issued = self
            .issued
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let mut candidate = folder.join(self.file_name(&task.source, Some(&random_suffix(suffix_len))));
        for _ in 1..MAX_SUFFIX_DRAWS {
            if !issued.contains(&candidate) {
                break;
            }
            tracing::debug!("Suffix collision on {}, drawing again", candidate.display());
            candidate = folder.join(self.file_name(&task.source, Some(&random_suffix(suffix_len))));
        }
        issued.insert(candidate.clone());
        candidate
    }

    fn file_name(&self, source: &Path, suffix: Option<&str>) -> OsString {
        let stem = source.file_stem().unwrap_or_default();
        let mut name = stem.to_os_string();
        if !self.tag.is_empty() {
            name.push("_");
            name.push(&self.tag);
        }
        if let Some(suffix) = suffix {
            name.push("_");
            name.push(suffix);
        }
        if let Some(extension) = source.extension() {
            name.push(".");
            name.push(extension);
        }
        name
    }
}
