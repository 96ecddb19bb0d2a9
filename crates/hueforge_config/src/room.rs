//! Loading of room files.
//!
//! A room file holds the blocks of one label:
//!
//! ```toml
//! label = "Küche"
//!
//! [[block]]
//! type = "state"
//! name = "Küche state"
//! ```
//!
//! Without `label` the file stem is used.

use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;
use toml::Spanned;

use crate::diagnostics::DefinitionLocation;
use crate::diagnostics::Diagnostic;
use crate::diagnostics::Diagnostics;
use crate::diagnostics::DuplicateError;
use crate::diagnostics::Error;
use crate::diagnostics::LoadError;
use crate::diagnostics::Warning;
use crate::model::Block;

#[derive(Debug, Clone)]
pub struct RoomConfig {
    pub label: String,
    pub blocks: Vec<Block>,
}

#[derive(Debug, Deserialize)]
struct RawRoom {
    #[serde(default)]
    label: Option<String>,

    #[serde(default, rename = "block")]
    blocks: Vec<Spanned<Block>>,
}

impl RoomConfig {
    /// Load a room file, reporting parse errors and duplicate block names.
    pub fn from_file(path: impl AsRef<Path>) -> Result<(Self, Diagnostics), Diagnostics> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| LoadError::io(path, &e))?;
        Self::from_str_with_path(&content, path)
    }

    pub fn from_str_with_path(
        content: &str,
        path: &Path,
    ) -> Result<(Self, Diagnostics), Diagnostics> {
        let raw: RawRoom =
            toml::from_str(content).map_err(|e| LoadError::parse(path, &e, content))?;

        let mut diagnostics = Vec::new();
        if raw.blocks.is_empty() {
            diagnostics.push(Diagnostic::Warning(Warning::EmptyRoom {
                file_path: path.to_path_buf(),
            }));
        }

        diagnostics.extend(duplicate_names(&raw.blocks, path, content));

        let diagnostics = Diagnostics(diagnostics);
        if diagnostics.has_errors() {
            return Err(diagnostics);
        }

        let label = raw.label.unwrap_or_else(|| {
            path.file_stem()
                .map(|s| s.to_string_lossy().to_string())
                .unwrap_or_default()
        });
        let blocks = raw.blocks.into_iter().map(Spanned::into_inner).collect();
        Ok((RoomConfig { label, blocks }, diagnostics))
    }
}

fn duplicate_names(blocks: &[Spanned<Block>], path: &Path, content: &str) -> Vec<Diagnostic> {
    let mut by_name: HashMap<&str, Vec<&Spanned<Block>>> = HashMap::new();
    let mut order = Vec::new();
    for block in blocks {
        let entry = by_name.entry(block.get_ref().name()).or_default();
        if entry.is_empty() {
            order.push(block.get_ref().name());
        }
        entry.push(block);
    }

    order
        .into_iter()
        .filter(|name| by_name[name].len() > 1)
        .map(|name| {
            let definitions = &by_name[name];
            Diagnostic::Error(Error::Duplicate(DuplicateError {
                field_path: format!("block.{}", name),
                message: format!(
                    "block '{}' is defined {} times; names must be unique",
                    name,
                    definitions.len()
                ),
                definitions: definitions
                    .iter()
                    .map(|b| DefinitionLocation {
                        file_path: path.to_path_buf(),
                        span: b.span(),
                        content: content.to_string(),
                    })
                    .collect(),
            }))
        })
        .collect()
}
