//! Bridge address, credentials and logging settings.

use std::collections::BTreeSet;
use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;
use toml::Spanned;
use tracing_subscriber::filter::LevelFilter;

use crate::diagnostics::Diagnostic;
use crate::diagnostics::Diagnostics;
use crate::diagnostics::Error;
use crate::diagnostics::LoadError;
use crate::diagnostics::SourceInfo;
use crate::diagnostics::ValidationError;
use crate::diagnostics::Warning;

/// Name of the virtual sensor external gateways write event codes into.
pub const DEFAULT_EXTERNAL_SENSOR: &str = "External input";

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl From<LogLevel> for LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => LevelFilter::TRACE,
            LogLevel::Debug => LevelFilter::DEBUG,
            LogLevel::Info => LevelFilter::INFO,
            LogLevel::Warn => LevelFilter::WARN,
            LogLevel::Error => LevelFilter::ERROR,
        }
    }
}

#[derive(Debug, Default, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    #[serde(default)]
    pub level: LogLevel,

    /// Per-target levels, e.g. `hueforge::sync = "debug"`
    #[serde(default)]
    pub overrides: HashMap<String, LogLevel>,
}

/// Everything the engine needs to talk to one bridge.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Bridge IP address or host name
    pub bridge: String,

    /// API key (hub user name) the engine creates objects under
    pub api_key: String,

    /// Keys of other tools whose objects are not reported as foreign
    pub other_keys: BTreeSet<String>,

    /// Virtual sensor receiving external event codes
    pub external_sensor: String,

    pub logging: LoggingConfig,
}

impl Settings {
    pub fn new(bridge: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            bridge: bridge.into(),
            api_key: api_key.into(),
            other_keys: BTreeSet::new(),
            external_sensor: DEFAULT_EXTERNAL_SENSOR.to_string(),
            logging: LoggingConfig::default(),
        }
    }

    /// Load and validate a settings file.
    ///
    /// Returns the settings together with any warnings, or every diagnostic
    /// found if at least one of them is an error.
    pub fn from_file(path: impl AsRef<Path>) -> Result<(Self, Diagnostics), Diagnostics> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| LoadError::io(path, &e))?;
        Self::from_str_with_path(&content, path)
    }

    pub fn from_str_with_path(
        content: &str,
        path: &Path,
    ) -> Result<(Self, Diagnostics), Diagnostics> {
        let raw: RawSettings =
            toml::from_str(content).map_err(|e| LoadError::parse(path, &e, content))?;

        let source = SourceInfo {
            file_path: path.to_path_buf(),
            content: content.to_string(),
        };
        let mut diagnostics = Vec::new();

        for (field, value) in [("bridge", &raw.bridge), ("api_key", &raw.api_key)] {
            if value.get_ref().trim().is_empty() {
                diagnostics.push(Diagnostic::Error(Error::Validation(ValidationError {
                    field_path: field.to_string(),
                    message: format!("{} must not be empty", field),
                    span: Some(value.span()),
                    source: Some(source.clone()),
                })));
            }
        }

        let api_key = raw.api_key.into_inner();
        if raw.other_keys.contains(&api_key) {
            diagnostics.push(Diagnostic::Warning(Warning::RedundantTrustedKey {
                file_path: path.to_path_buf(),
                key: api_key.clone(),
            }));
        }

        let diagnostics = Diagnostics(diagnostics);
        if diagnostics.has_errors() {
            return Err(diagnostics);
        }

        let settings = Settings {
            bridge: raw.bridge.into_inner(),
            api_key,
            other_keys: raw.other_keys,
            external_sensor: raw
                .external_sensor
                .unwrap_or_else(|| DEFAULT_EXTERNAL_SENSOR.to_string()),
            logging: raw.logging,
        };
        Ok((settings, diagnostics))
    }
}

#[derive(Debug, Deserialize)]
struct RawSettings {
    bridge: Spanned<String>,

    #[serde(alias = "apiKey")]
    api_key: Spanned<String>,

    #[serde(default, alias = "otherKeys")]
    other_keys: BTreeSet<String>,

    #[serde(default)]
    external_sensor: Option<String>,

    #[serde(default)]
    logging: LoggingConfig,
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;

    fn parse(content: &str) -> Result<(Settings, Diagnostics), Diagnostics> {
        Settings::from_str_with_path(content, &PathBuf::from("settings.toml"))
    }

    #[test]
    fn test_parse_minimal_settings() {
        let (settings, diagnostics) = parse(
            r#"
            bridge = "192.168.1.20"
            api_key = "abc123"
            "#,
        )
        .unwrap();

        assert!(diagnostics.0.is_empty());
        assert_eq!(settings.bridge, "192.168.1.20");
        assert_eq!(settings.external_sensor, DEFAULT_EXTERNAL_SENSOR);
        assert_eq!(settings.logging.level, LogLevel::Info);
        assert!(settings.other_keys.is_empty());
    }

    #[test]
    fn test_parse_camel_case_keys() {
        let (settings, _) = parse(
            r#"
            bridge = "hue.local"
            apiKey = "abc123"
            otherKeys = ["hue-app", "ifttt"]

            [logging]
            level = "debug"
            overrides = { "hueforge::sync" = "trace" }
            "#,
        )
        .unwrap();

        assert_eq!(settings.api_key, "abc123");
        assert_eq!(settings.other_keys.len(), 2);
        assert_eq!(settings.logging.level, LogLevel::Debug);
        assert_eq!(
            settings.logging.overrides.get("hueforge::sync"),
            Some(&LogLevel::Trace)
        );
    }

    #[test]
    fn test_empty_api_key_is_an_error() {
        let diagnostics = parse(
            r#"
            bridge = "hue.local"
            api_key = ""
            "#,
        )
        .unwrap_err();

        assert_eq!(diagnostics.0.len(), 1);
        assert!(matches!(
            &diagnostics.0[0],
            Diagnostic::Error(Error::Validation(v)) if v.field_path == "api_key"
        ));
    }

    #[test]
    fn test_own_key_in_trusted_keys_warns() {
        let (_, diagnostics) = parse(
            r#"
            bridge = "hue.local"
            api_key = "abc123"
            other_keys = ["abc123"]
            "#,
        )
        .unwrap();

        assert_eq!(diagnostics.0.len(), 1);
        assert!(diagnostics.0[0].is_warning());
    }

    #[test]
    fn test_log_level_converts_to_filter() {
        assert_eq!(LevelFilter::from(LogLevel::Warn), LevelFilter::WARN);
    }
}
