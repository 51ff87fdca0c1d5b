//! Configuration command implementations

use crate::cli::{ConfigCommands, Output};
use crate::config::{Settings, SettingsLoader, core::DEFAULT_CONFIG_STEM};
use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

/// Execute config commands
pub async fn execute(cmd: ConfigCommands, config: Option<&Path>, output: &Output) -> Result<()> {
    match cmd {
        ConfigCommands::Init { force } => init(config, force, output),
        ConfigCommands::Validate => validate(config, output),
        ConfigCommands::Show => show(config, output),
    }
}

fn init(config: Option<&Path>, force: bool, output: &Output) -> Result<()> {
    let path = config
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from(format!("{}.toml", DEFAULT_CONFIG_STEM)));

    if path.exists() && !force {
        output.warning(&format!(
            "{} already exists (use --force to overwrite)",
            path.display()
        ));
        return Ok(());
    }

    let content = default_config_toml()?;
    fs::write(&path, content).with_context(|| format!("Failed to write {}", path.display()))?;

    output.success(&format!("Created {}", path.display()));
    output.info("Edit it to point at your photos and watermark");
    Ok(())
}

fn validate(config: Option<&Path>, output: &Output) -> Result<()> {
    match SettingsLoader::new(config).and_then(|loader| loader.load()) {
        Ok(settings) => {
            output.success("Configuration is valid");
            output.key_value("Input folder:", &settings.input_folder.display().to_string(), false);
            output.key_value("Output folder:", &settings.output_folder.display().to_string(), false);
            output.key_value("Watermark:", &settings.watermark.display().to_string(), false);
            output.key_value(
                "Mode:",
                &crate::parallel::ExecutionMode::select(&settings).to_string(),
                true,
            );
            Ok(())
        }
        Err(e) => {
            output.error(&e.to_string());
            std::process::exit(1);
        }
    }
}

fn show(config: Option<&Path>, output: &Output) -> Result<()> {
    let settings = SettingsLoader::new(config)?.extract()?;
    output.header("Effective Configuration");
    output.separator();
    println!("{}", toml::to_string_pretty(&settings)?);
    Ok(())
}

/// Default settings rendered as a commented TOML document
pub fn default_config_toml() -> Result<String> {
    let body = toml::to_string_pretty(&Settings::default())?;
    Ok(format!(
        "# watermarker configuration\n\
         # Every key can also be set with a WATERMARKER_<KEY> environment variable\n\
         # or the matching `watermarker run --<key>` flag.\n\n{}",
        body
    ))
}
