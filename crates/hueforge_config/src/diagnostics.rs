use std::ops::Range;
use std::path::Path;
use std::path::PathBuf;

use ariadne::Color;
use ariadne::Label;
use ariadne::Report;
use ariadne::ReportKind;
use ariadne::Source;

/// Source information for where a diagnostic came from
#[derive(Debug, Clone)]
pub struct SourceInfo {
    pub file_path: PathBuf,
    pub content: String,
}

/// A diagnostic message that can be either a warning or an error
#[derive(Debug, Clone)]
pub enum Diagnostic {
    Warning(Warning),
    Error(Error),
}

/// Warning messages that don't prevent loading
#[derive(Debug, Clone)]
pub enum Warning {
    /// A room file without any blocks
    EmptyRoom { file_path: PathBuf },
    /// The engine's own key listed among the trusted keys
    RedundantTrustedKey { file_path: PathBuf, key: String },
}

/// Error messages that indicate problems with a settings or room file
#[derive(Debug, Clone)]
pub enum Error {
    Duplicate(DuplicateError),
    Validation(ValidationError),
    Load(LoadError),
}

/// The same name defined more than once
#[derive(Debug, Clone)]
pub struct DuplicateError {
    pub field_path: String,
    pub message: String,
    pub definitions: Vec<DefinitionLocation>,
}

#[derive(Debug, Clone)]
pub struct DefinitionLocation {
    pub file_path: PathBuf,
    pub span: Range<usize>,
    pub content: String,
}

/// Error type for validation failures
#[derive(Debug, Clone)]
pub struct ValidationError {
    pub field_path: String,
    pub message: String,
    pub span: Option<Range<usize>>,
    pub source: Option<SourceInfo>,
}

/// Error type for file loading failures
#[derive(Debug, Clone)]
pub enum LoadError {
    Io {
        path: PathBuf,
        error: String,
    },
    Parse {
        path: PathBuf,
        error: String,
        span: Option<Range<usize>>,
        content: String,
    },
}

impl LoadError {
    pub fn io(path: impl Into<PathBuf>, error: &std::io::Error) -> Self {
        LoadError::Io {
            path: path.into(),
            error: error.to_string(),
        }
    }

    pub fn parse(path: impl Into<PathBuf>, error: &toml::de::Error, content: &str) -> Self {
        LoadError::Parse {
            path: path.into(),
            error: error.message().to_string(),
            span: error.span(),
            content: content.to_string(),
        }
    }
}

const ERROR: &str = "\x1b[31mError\x1b[0m";
const WARNING: &str = "\x1b[33mWarning\x1b[0m";

/// A diagnostic without a source span: heading, file and a note.
fn plain(heading: &str, file: &Path, message: &str) -> String {
    format!(
        "{}\n  ┌─ {}:1:1\n  │\n  = {}\n\n",
        heading,
        file.display(),
        message
    )
}

impl std::fmt::Display for LoadError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let (path, what, error) = match self {
            LoadError::Io { path, error } => (path, "read", error),
            LoadError::Parse { path, error, .. } => (path, "parse", error),
        };
        let heading = format!("{}: Failed to {} file", ERROR, what);
        f.write_str(&plain(&heading, path, error))
    }
}

impl std::error::Error for LoadError {}

/// A collection of diagnostics (warnings and/or errors)
#[derive(Debug, Clone, Default)]
pub struct Diagnostics(pub Vec<Diagnostic>);

impl Diagnostics {
    pub fn has_errors(&self) -> bool {
        self.0.iter().any(Diagnostic::is_error)
    }
}

impl std::fmt::Display for Diagnostics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", format_diagnostics(&self.0))
    }
}

impl std::error::Error for Diagnostics {}

impl From<LoadError> for Diagnostics {
    fn from(error: LoadError) -> Self {
        Diagnostics(vec![Diagnostic::Error(Error::Load(error))])
    }
}

impl Diagnostic {
    /// Returns true if this diagnostic is an error
    pub fn is_error(&self) -> bool {
        matches!(self, Diagnostic::Error(_))
    }

    /// Returns true if this diagnostic is a warning
    pub fn is_warning(&self) -> bool {
        matches!(self, Diagnostic::Warning(_))
    }
}

/// Label of a span in a rendered report.
struct Mark<'a> {
    span: Range<usize>,
    message: &'a str,
    color: Color,
}

/// Render an error report over `content`, pointing at every mark.
fn report(
    file: &Path,
    content: &str,
    title: &str,
    note: Option<&str>,
    marks: &[Mark<'_>],
) -> String {
    let Some(first) = marks.first() else {
        return plain(&format!("{}: {}", ERROR, title), file, note.unwrap_or(title));
    };
    let file_id = file.display().to_string();
    let mut builder =
        Report::build(ReportKind::Error, (file_id.clone(), first.span.clone())).with_message(title);
    if let Some(note) = note {
        builder = builder.with_note(note);
    }
    for mark in marks {
        builder = builder.with_label(
            Label::new((file_id.clone(), mark.span.clone()))
                .with_message(mark.message)
                .with_color(mark.color),
        );
    }

    let mut output = Vec::new();
    builder
        .finish()
        .write((file_id, Source::from(content.to_string())), &mut output)
        .ok();
    String::from_utf8_lossy(&output).into_owned()
}

fn format_warning(warning: &Warning) -> String {
    match warning {
        Warning::EmptyRoom { file_path } => plain(
            &format!("{}: Empty room configuration", WARNING),
            file_path,
            &format!(
                "Room file '{}' has no blocks and has no effect",
                file_path.display()
            ),
        ),
        Warning::RedundantTrustedKey { file_path, key } => plain(
            &format!("{}: Redundant trusted key", WARNING),
            file_path,
            &format!("'{}' is the engine's own key and is always trusted", key),
        ),
    }
}

fn format_error(error: &Error) -> String {
    match error {
        Error::Duplicate(duplicate) => {
            let title = format!("Duplicate definition of '{}'", duplicate.field_path);
            let Some(first) = duplicate.definitions.first() else {
                return plain(
                    &format!("{}: {}", ERROR, title),
                    Path::new("<unknown>"),
                    &duplicate.message,
                );
            };
            let marks: Vec<Mark<'_>> = duplicate
                .definitions
                .iter()
                .enumerate()
                .map(|(i, definition)| Mark {
                    span: definition.span.clone(),
                    message: if i == 0 {
                        "first definition here"
                    } else {
                        "defined again here"
                    },
                    color: if i == 0 { Color::Red } else { Color::Yellow },
                })
                .collect();
            // blocks of one room share a file
            report(
                &first.file_path,
                &first.content,
                &title,
                Some(&duplicate.message),
                &marks,
            )
        }
        Error::Validation(validation) => {
            let title = format!("Validation error in '{}'", validation.field_path);
            match (&validation.span, &validation.source) {
                (Some(span), Some(source)) => report(
                    &source.file_path,
                    &source.content,
                    &title,
                    None,
                    &[Mark {
                        span: span.clone(),
                        message: &validation.message,
                        color: Color::Red,
                    }],
                ),
                (_, source) => plain(
                    &format!("{}: {}", ERROR, title),
                    source
                        .as_ref()
                        .map_or(Path::new("<unknown>"), |s| s.file_path.as_path()),
                    &validation.message,
                ),
            }
        }
        Error::Load(LoadError::Parse {
            path,
            error,
            span: Some(span),
            content,
        }) => report(
            path,
            content,
            "Failed to parse file",
            None,
            &[Mark {
                span: span.clone(),
                message: error,
                color: Color::Red,
            }],
        ),
        Error::Load(load) => load.to_string(),
    }
}

/// Render diagnostics for the terminal, with source excerpts where spans
/// are known.
pub fn format_diagnostics(diagnostics: &[Diagnostic]) -> String {
    diagnostics
        .iter()
        .map(|diagnostic| match diagnostic {
            Diagnostic::Warning(warning) => format_warning(warning),
            Diagnostic::Error(error) => format_error(error),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Strip ANSI escape sequences so assertions see plain text.
    fn strip_ansi(s: &str) -> String {
        let mut out = String::with_capacity(s.len());
        let mut chars = s.chars();
        while let Some(c) = chars.next() {
            if c == '\x1b' {
                for c2 in chars.by_ref() {
                    if c2 == 'm' {
                        break;
                    }
                }
            } else {
                out.push(c);
            }
        }
        out
    }

    #[test]
    fn test_diagnostic_is_error() {
        let error = Diagnostic::Error(Error::Validation(ValidationError {
            field_path: "test".to_string(),
            message: "test error".to_string(),
            span: None,
            source: None,
        }));
        assert!(error.is_error());
        assert!(!error.is_warning());
    }

    #[test]
    fn test_format_empty_room_warning() {
        let diagnostics = vec![Diagnostic::Warning(Warning::EmptyRoom {
            file_path: PathBuf::from("/tmp/hwr.toml"),
        })];

        let output = format_diagnostics(&diagnostics);
        let expected = "\u{1b}[33mWarning\u{1b}[0m: Empty room configuration
  ┌─ /tmp/hwr.toml:1:1
  │
  = Room file '/tmp/hwr.toml' has no blocks and has no effect

";
        assert_eq!(output, expected);
    }

    #[test]
    fn test_format_validation_error_without_span() {
        let diagnostics = vec![Diagnostic::Error(Error::Validation(ValidationError {
            field_path: "api_key".to_string(),
            message: "api_key must not be empty".to_string(),
            span: None,
            source: Some(SourceInfo {
                file_path: PathBuf::from("/tmp/settings.toml"),
                content: String::new(),
            }),
        }))];

        let output = format_diagnostics(&diagnostics);
        let expected = "\u{1b}[31mError\u{1b}[0m: Validation error in 'api_key'\n  ┌─ /tmp/settings.toml:1:1\n  │\n  = api_key must not be empty\n\n";
        assert_eq!(output, expected);
    }

    #[test]
    fn test_format_duplicate_names_both_locations() {
        let content = "[[block]]\nname = \"Flur\"\n[[block]]\nname = \"Flur\"\n";
        let definitions = vec![
            DefinitionLocation {
                file_path: PathBuf::from("/tmp/flure.toml"),
                span: 10..23,
                content: content.to_string(),
            },
            DefinitionLocation {
                file_path: PathBuf::from("/tmp/flure.toml"),
                span: 34..47,
                content: content.to_string(),
            },
        ];
        let diagnostics = vec![Diagnostic::Error(Error::Duplicate(DuplicateError {
            field_path: "block.name".to_string(),
            message: "block 'Flur' is defined 2 times".to_string(),
            definitions,
        }))];

        let output = strip_ansi(&format_diagnostics(&diagnostics));
        assert!(output.contains("Duplicate definition of 'block.name'"));
        assert!(output.contains("first definition here"));
        assert!(output.contains("defined again here"));
        assert!(output.contains("block 'Flur' is defined 2 times"));
    }

    #[test]
    fn test_format_parse_error_with_span() {
        let diagnostics = vec![Diagnostic::Error(Error::Load(LoadError::Parse {
            path: PathBuf::from("/tmp/kitchen.toml"),
            error: "invalid duration (HH:MM:SS) '3 minutes'".to_string(),
            span: Some(10..21),
            content: "timeout = \"3 minutes\"\n".to_string(),
        }))];

        let output = strip_ansi(&format_diagnostics(&diagnostics));
        assert!(output.contains("Failed to parse file"));
        assert!(output.contains("invalid duration (HH:MM:SS) '3 minutes'"));
        assert!(output.contains("/tmp/kitchen.toml"));
    }

    #[test]
    fn test_load_error_display_io() {
        let error = LoadError::Io {
            path: PathBuf::from("/tmp/settings.toml"),
            error: "file not found".to_string(),
        };
        let display = format!("{}", error);
        assert!(display.contains("Failed to read"));
        assert!(display.contains("/tmp/settings.toml"));
        assert!(display.contains("file not found"));
    }
}
