use super::*;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

// Unique prefix so the process environment never leaks into these tests
const TEST_ENV_PREFIX: &str = "WATERMARKER_UNIT_TEST_UNSET_";

fn settings_with_watermark(dir: &TempDir) -> Settings {
    let watermark = dir.path().join("logo.png");
    fs::write(&watermark, b"not really a png").unwrap();
    Settings {
        watermark,
        ..Settings::default()
    }
}

#[test]
fn test_defaults_match_original_tool() {
    let settings = Settings::default();
    assert_eq!(settings.opacity, 0.65);
    assert_eq!(settings.position, Position::Bottom);
    assert_eq!(settings.quality, 100);
    assert_eq!(settings.scale, 15.0);
    assert_eq!(settings.margin_vertical, 20);
    assert_eq!(settings.margin_horizontal, 15);
    assert_eq!(settings.gc_batch_size, 20);
    assert_eq!(settings.gc_memory_threshold, 500);
    assert_eq!(settings.memory_check_interval, 5);
    assert_eq!(settings.uuid_length, 6);
    assert_eq!(settings.large_image_threshold, 3000);
    assert!(!settings.enable_parallel);
    assert!(!settings.enable_precompression);
}

#[test]
fn test_validate_accepts_defaults_with_existing_watermark() {
    let dir = TempDir::new().unwrap();
    assert!(settings_with_watermark(&dir).validate().is_ok());
}

#[test]
fn test_validate_rejects_out_of_range_values() {
    let dir = TempDir::new().unwrap();
    let base = settings_with_watermark(&dir);

    let cases = vec![
        Settings { opacity: 1.5, ..base.clone() },
        Settings { quality: 0, ..base.clone() },
        Settings { scale: 0.5, ..base.clone() },
        Settings { uuid_length: 3, ..base.clone() },
        Settings { uuid_length: 37, ..base.clone() },
        Settings { large_image_threshold: 99, ..base.clone() },
        Settings { large_image_threshold: 10_001, ..base.clone() },
        Settings { gc_batch_size: 0, ..base.clone() },
        Settings { memory_check_interval: 0, ..base.clone() },
        Settings { thread_percentage: 0, ..base.clone() },
        Settings { output_tag: "a/b".to_string(), ..base.clone() },
    ];

    for settings in cases {
        let err = settings.validate().unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Config, "{err}");
    }
}

#[test]
fn test_validate_rejects_missing_watermark() {
    let settings = Settings {
        watermark: "definitely/not/here.png".into(),
        ..Settings::default()
    };
    let err = settings.validate().unwrap_err();
    assert!(err.to_string().contains("here.png"));
}

#[test]
fn test_loader_without_files_yields_defaults() {
    let loader = SettingsLoader::layered(None, TEST_ENV_PREFIX).unwrap();
    assert_eq!(loader.extract().unwrap(), Settings::default());
}

#[test]
fn test_loader_reads_toml_file() {
    let dir = TempDir::new().unwrap();
    let config_path = dir.path().join("custom.toml");
    fs::write(
        &config_path,
        r#"
opacity = 0.4
position = "right_top"
enable_parallel = true
uuid_length = 12
"#,
    )
    .unwrap();

    let loader = SettingsLoader::layered(Some(&config_path), TEST_ENV_PREFIX).unwrap();
    let settings = loader.extract().unwrap();
    assert_eq!(settings.opacity, 0.4);
    assert_eq!(settings.position, Position::RightTop);
    assert!(settings.enable_parallel);
    assert_eq!(settings.uuid_length, 12);
    // untouched keys keep their defaults
    assert_eq!(settings.quality, 100);
}

#[test]
fn test_loader_reads_yaml_file() {
    let dir = TempDir::new().unwrap();
    let config_path = dir.path().join("custom.yml");
    fs::write(&config_path, "scale: 30\nrecursive: true\n").unwrap();

    let settings = SettingsLoader::layered(Some(&config_path), TEST_ENV_PREFIX)
        .unwrap()
        .extract()
        .unwrap();
    assert_eq!(settings.scale, 30.0);
    assert!(settings.recursive);
}

#[test]
fn test_cli_overrides_win_over_file() {
    let dir = TempDir::new().unwrap();
    let config_path = dir.path().join("custom.json");
    fs::write(&config_path, r#"{ "quality": 80, "gc_batch_size": 5 }"#).unwrap();

    let overrides = SettingsOverrides {
        quality: Some(55),
        ..SettingsOverrides::default()
    };
    let settings = SettingsLoader::layered(Some(&config_path), TEST_ENV_PREFIX)
        .unwrap()
        .with_overrides(&overrides)
        .extract()
        .unwrap();

    assert_eq!(settings.quality, 55);
    assert_eq!(settings.gc_batch_size, 5);
}

#[test]
fn test_missing_explicit_config_is_config_error() {
    let err = SettingsLoader::layered(Some(Path::new("nope/watermarker.toml")), TEST_ENV_PREFIX)
        .err()
        .unwrap();
    assert_eq!(err.kind(), crate::error::ErrorKind::Config);
}

#[test]
fn test_unsupported_config_format() {
    let dir = TempDir::new().unwrap();
    let config_path = dir.path().join("config.ini");
    fs::write(&config_path, "[DEFAULT]\nopacity = 0.5\n").unwrap();

    let err = SettingsLoader::layered(Some(&config_path), TEST_ENV_PREFIX)
        .err()
        .unwrap();
    assert!(err.to_string().contains("unsupported config format"));
}

#[test]
fn test_load_validates() {
    let dir = TempDir::new().unwrap();
    let config_path = dir.path().join("bad.toml");
    fs::write(&config_path, "opacity = 2.0\n").unwrap();

    let err = SettingsLoader::layered(Some(&config_path), TEST_ENV_PREFIX)
        .unwrap()
        .load()
        .unwrap_err();
    assert!(err.to_string().contains("opacity"));
}
