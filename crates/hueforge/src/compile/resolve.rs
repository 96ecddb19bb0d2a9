//! Alias and redirect resolution.
//!
//! Aliases (`recover = "on"`) are resolved per block into plain actions.
//! Redirects are resolved through the [`Arena`], which holds every external
//! binding compiled so far in this process, so a switch can redirect to an
//! external action defined later in the same room or in an earlier room.

use std::collections::BTreeMap;
use std::collections::HashMap;
use std::collections::HashSet;

use hueforge_config::Action;
use hueforge_config::ActionKind;
use hueforge_config::Binding;
use hueforge_config::Code;

use crate::error::ConfigError;

/// Replace every alias of a block's bindings with the action it names.
pub fn resolve_aliases(
    block: &str,
    bindings: &BTreeMap<Code, Binding>,
) -> Result<BTreeMap<Code, Action>, ConfigError> {
    let mut resolved = BTreeMap::new();
    for code in bindings.keys() {
        let mut chain = vec![code.clone()];
        let mut current = code;
        let action = loop {
            match bindings.get(current) {
                Some(Binding::Action(action)) => break action.clone(),
                Some(Binding::AliasOf(target)) => {
                    if chain.contains(target) {
                        chain.push(target.clone());
                        return Err(ConfigError::AliasCycle {
                            block: block.to_string(),
                            chain: chain.iter().map(|c| c.to_string()).collect(),
                        });
                    }
                    chain.push(target.clone());
                    current = target;
                }
                None => {
                    return Err(ConfigError::UnknownAlias {
                        block: block.to_string(),
                        code: chain[chain.len() - 2].clone(),
                        target: current.clone(),
                    })
                }
            }
        };
        resolved.insert(code.clone(), action);
    }
    Ok(resolved)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct Handle(usize);

#[derive(Debug, Clone)]
struct Entry {
    block: String,
    code: Code,
    /// `None` for codes emitted by contact blocks
    action: Option<Action>,
}

/// Process-wide registry of external codes.
///
/// Every external code is written into the same virtual sensor, so a code
/// may be bound only once across all rooms.
#[derive(Debug, Clone, Default)]
pub struct Arena {
    entries: Vec<Entry>,
    by_key: HashMap<(String, Code), Handle>,
    by_code: HashMap<Code, Handle>,
}

impl Arena {
    pub fn register(
        &mut self,
        block: &str,
        code: &Code,
        action: Option<&Action>,
    ) -> Result<(), ConfigError> {
        if let Some(existing) = self.by_code.get(code) {
            return Err(ConfigError::DuplicateExternalCode {
                code: code.clone(),
                first: self.entries[existing.0].block.clone(),
                second: block.to_string(),
            });
        }
        let handle = Handle(self.entries.len());
        self.entries.push(Entry {
            block: block.to_string(),
            code: code.clone(),
            action: action.cloned(),
        });
        self.by_key.insert((block.to_string(), code.clone()), handle);
        self.by_code.insert(code.clone(), handle);
        Ok(())
    }

    fn lookup(&self, target: &str) -> Option<Handle> {
        match target.rsplit_once('/') {
            Some((block, code)) => self
                .by_key
                .get(&(block.to_string(), Code::from(code)))
                .copied(),
            None => self.by_code.get(&Code::from(target)).copied(),
        }
    }

    /// Follow a redirect of `block`/`code` to the external code whose
    /// action finally runs.
    ///
    /// `target` is either a bare external code or `<block>/<code>`.
    pub fn resolve_redirect(
        &self,
        block: &str,
        code: &Code,
        target: &Code,
    ) -> Result<Code, ConfigError> {
        let mut visited = HashSet::new();
        let mut chain = vec![format!("{}/{}", block, code)];
        let mut target = target.as_str().to_string();
        loop {
            let handle = self
                .lookup(&target)
                .ok_or_else(|| ConfigError::UnknownRedirectTarget {
                    block: block.to_string(),
                    code: code.clone(),
                    target: target.clone(),
                })?;
            let entry = &self.entries[handle.0];
            chain.push(format!("{}/{}", entry.block, entry.code));
            if !visited.insert(handle) || (entry.block == block && &entry.code == code) {
                return Err(ConfigError::RedirectCycle {
                    block: block.to_string(),
                    code: code.clone(),
                    chain,
                });
            }
            match &entry.action {
                None => {
                    return Err(ConfigError::NotRedirectable {
                        block: block.to_string(),
                        code: code.clone(),
                        target,
                    })
                }
                Some(Action {
                    kind: ActionKind::Redirect(next),
                    ..
                }) => target = next.value.as_str().to_string(),
                Some(_) => return Ok(entry.code.clone()),
            }
        }
    }
}
