use crate::config::{Position, Settings};
use crate::error::WatermarkError;
use figment::{
    Figment,
    providers::{Env, Format, Json, Serialized, Toml, Yaml},
};
use serde::Serialize;
use std::path::{Path, PathBuf};

/// Stem of the config file picked up from the working directory
pub const DEFAULT_CONFIG_STEM: &str = "watermarker";

/// Prefix for environment variable overrides (e.g. `WATERMARKER_OPACITY=0.4`)
pub const ENV_PREFIX: &str = "WATERMARKER_";

/// Values given explicitly on the command line. Unset fields leave the
/// lower layers untouched.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SettingsOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_folder: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_folder: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub watermark: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub opacity: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position: Option<Position>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quality: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scale: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub margin_vertical: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub margin_horizontal: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recursive: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_tag: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gc_batch_size: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gc_memory_threshold: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memory_check_interval: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enable_mixed_mode: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enable_parallel: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uuid_length: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enable_advanced_memory_management: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enable_precompression: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub large_image_threshold: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workers: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thread_percentage: Option<u8>,
}

/// Layered settings source: defaults -> config file -> environment -> CLI
pub struct SettingsLoader {
    figment: Figment,
}

impl SettingsLoader {
    /// Build the standard layering. An explicit `config_file` must exist;
    /// without one, `watermarker.{toml,json,yaml,yml}` in the working
    /// directory is used when present.
    pub fn new(config_file: Option<&Path>) -> Result<Self, WatermarkError> {
        Self::layered(config_file, ENV_PREFIX)
    }

    pub(crate) fn layered(
        config_file: Option<&Path>,
        env_prefix: &str,
    ) -> Result<Self, WatermarkError> {
        let mut figment = Figment::from(Serialized::defaults(Settings::default()));

        if let Some(path) = config_file {
            if !path.is_file() {
                return Err(WatermarkError::config(format!(
                    "config file {} not found",
                    path.display()
                )));
            }
            figment = merge_file(figment, path)?;
        } else {
            figment = figment
                .merge(Toml::file(format!("{DEFAULT_CONFIG_STEM}.toml")))
                .merge(Json::file(format!("{DEFAULT_CONFIG_STEM}.json")))
                .merge(Yaml::file(format!("{DEFAULT_CONFIG_STEM}.yaml")))
                .merge(Yaml::file(format!("{DEFAULT_CONFIG_STEM}.yml")));
        }

        // Environment variables override files
        figment = figment.merge(Env::prefixed(env_prefix));

        tracing::trace!("CONFIG LOAD: file = {:?}, env prefix = {}", config_file, env_prefix);
        Ok(Self { figment })
    }

    /// Apply explicit CLI values on top of every other layer
    pub fn with_overrides(mut self, overrides: &SettingsOverrides) -> Self {
        self.figment = self.figment.merge(Serialized::globals(overrides));
        self
    }

    /// Extract without validation (used by `config show`)
    pub fn extract(&self) -> Result<Settings, WatermarkError> {
        self.figment
            .extract::<Settings>()
            .map_err(|e| WatermarkError::config(e.to_string()))
    }

    /// Extract and validate
    pub fn load(&self) -> Result<Settings, WatermarkError> {
        let settings = self.extract()?;
        settings.validate()?;
        Ok(settings)
    }
}

fn merge_file(figment: Figment, path: &Path) -> Result<Figment, WatermarkError> {
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
        .unwrap_or_default();

    match extension.as_str() {
        "toml" => Ok(figment.merge(Toml::file(path))),
        "json" => Ok(figment.merge(Json::file(path))),
        "yaml" | "yml" => Ok(figment.merge(Yaml::file(path))),
        other => Err(WatermarkError::config(format!(
            "unsupported config format '{}' for {} (expected toml, json, yaml or yml)",
            other,
            path.display()
        ))),
    }
}
