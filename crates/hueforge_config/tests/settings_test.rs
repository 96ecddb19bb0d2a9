use std::io::Write;

use hueforge_config::format_diagnostics;
use hueforge_config::LogLevel;
use hueforge_config::Settings;
use hueforge_config::DEFAULT_EXTERNAL_SENSOR;
use tempfile::NamedTempFile;

#[test]
fn test_load_settings_file() {
    let mut file = NamedTempFile::new().unwrap();
    write!(
        file,
        r#"
bridge = "192.168.1.20"
api_key = "s3cr3t"
other_keys = ["hue-essentials"]
external_sensor = "Gateway"

[logging]
level = "warn"
"#
    )
    .unwrap();

    let (settings, diagnostics) = Settings::from_file(file.path()).unwrap();
    assert!(diagnostics.0.is_empty());
    assert_eq!(settings.api_key, "s3cr3t");
    assert!(settings.other_keys.contains("hue-essentials"));
    assert_eq!(settings.external_sensor, "Gateway");
    assert_eq!(settings.logging.level, LogLevel::Warn);
}

#[test]
fn test_shipped_example_settings_load() {
    let path = std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("../../settings.example.toml");
    let (settings, _) = Settings::from_file(&path).unwrap();
    assert_eq!(settings.external_sensor, DEFAULT_EXTERNAL_SENSOR);
}

#[test]
fn test_missing_bridge_is_reported_with_location() {
    let mut file = NamedTempFile::new().unwrap();
    write!(file, "bridge = \"\"\napi_key = \"\"\n").unwrap();

    let diagnostics = Settings::from_file(file.path()).unwrap_err();
    assert_eq!(diagnostics.0.len(), 2);

    let rendered = format_diagnostics(&diagnostics.0);
    assert!(rendered.contains("bridge must not be empty"), "{rendered}");
    assert!(rendered.contains("api_key must not be empty"), "{rendered}");
}
