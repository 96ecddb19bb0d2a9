use std::fmt;

use crate::hub::ObjectKind;

/// A bridge object named the way the bridge shows it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectRef {
    pub kind: ObjectKind,
    pub name: String,
}

impl fmt::Display for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} '{}'", self.kind, self.name)
    }
}

/// What a `configure()` call did to the bridge.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigureReport {
    pub label: String,
    pub created: Vec<ObjectRef>,
    pub updated: Vec<ObjectRef>,
    pub unchanged: usize,
}

impl ConfigureReport {
    pub fn new(label: &str) -> Self {
        Self {
            label: label.to_string(),
            ..Default::default()
        }
    }

    /// Number of objects written.
    pub fn writes(&self) -> usize {
        self.created.len() + self.updated.len()
    }
}

impl fmt::Display for ConfigureReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} created, {} updated, {} unchanged",
            self.label,
            self.created.len(),
            self.updated.len(),
            self.unchanged
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriftReason {
    /// Owned by a key that is neither ours nor trusted
    Foreign,
    /// Made by the engine but no longer compiled from any room
    Stale,
}

/// An object on the bridge the engine did not expect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriftWarning {
    pub kind: ObjectKind,
    pub id: String,
    pub name: String,
    pub owner: Option<String>,
    pub reason: DriftReason,
}

impl fmt::Display for DriftWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self.reason {
            DriftReason::Foreign => "foreign",
            DriftReason::Stale => "stale",
        };
        write!(f, "{} {} {} '{}'", reason, self.kind, self.id, self.name)?;
        if let Some(owner) = &self.owner {
            write!(f, " (owner {})", owner)?;
        }
        Ok(())
    }
}
