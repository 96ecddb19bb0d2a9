//! Compiles room blocks into a symbolic [`Program`].
//!
//! Compilation never talks to the bridge. Names of blocks, states, motion
//! sensors and external codes are registered process-wide, so a room can
//! redirect to actions of rooms configured before it. A failed compilation
//! leaves the registry untouched.

use std::collections::HashMap;
use std::collections::HashSet;

use hueforge_config::Block;
use hueforge_config::ContactBlock;
use hueforge_config::MotionBlock;
use hueforge_config::StateBlock;

mod binding;
mod cycle;
pub mod ir;
mod pretty_print;
mod resolve;
mod sensors;
mod template;


pub use binding::button_event;
pub use binding::DEFAULT_DIM_STEP;
use binding::Binder;
use binding::Input;
use binding::Source;
pub use cycle::counter_name;
use cycle::StateEntry;
pub use ir::Program;
pub use pretty_print::PrettyPrint;
use resolve::Arena;
pub use sensors::door_flag;
pub use sensors::status_sensor;
pub use sensors::suppress_flag;

use crate::error::ConfigError;
use crate::hub::model::MAX_RULE_ITEMS;

/// Names registered by every room compiled so far.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    /// Block name to the label that defined it
    blocks: HashMap<String, String>,
    arena: Arena,
    states: HashMap<String, StateEntry>,
    motions: HashSet<String>,
    contacts: HashSet<String>,
}

/// A compiled room, not yet committed to the registry.
#[derive(Debug)]
pub struct Compilation {
    pub program: Program,
    registry: Registry,
}

pub struct Compiler {
    external_sensor: String,
    registry: Registry,
}

impl Compiler {
    pub fn new(external_sensor: &str) -> Self {
        Self {
            external_sensor: external_sensor.to_string(),
            registry: Registry::default(),
        }
    }

    pub fn external_sensor(&self) -> &str {
        &self.external_sensor
    }

    /// Compile `blocks` of the room `label`.
    pub fn compile(&self, blocks: &[Block], label: &str) -> Result<Compilation, ConfigError> {
        let mut registry = self.registry.clone();
        register(&mut registry, blocks, label)?;
        let units = units(blocks)?;
        let sources = || units.iter().filter_map(Unit::source);
        for source in sources() {
            if source.input != Input::External {
                continue;
            }
            for (code, action) in &source.bindings {
                binding::external_value(source.block, code)?;
                registry.arena.register(source.block, code, Some(action))?;
            }
        }

        let mut program = Program::new(label);
        program.add_sensor(&self.external_sensor, ir::VirtualKind::Status);
        let mut binder = Binder::new(label, &self.external_sensor, &mut registry);

        for source in sources() {
            for (code, action) in &source.bindings {
                let cx = binding::ActionContext::new(source, code, action);
                if let Some((scene, state)) = cx.cycling() {
                    cycle::claim(&mut binder, &cx, scene, state, &mut program)?;
                }
            }
        }

        for unit in &units {
            match unit {
                Unit::State(state) => cycle::compile_state_block(state, &mut program)?,
                Unit::Contact(contact) => sensors::compile_contact(&binder, contact, &mut program)?,
                Unit::Input(source) => binder.compile_input(source, &mut program)?,
                Unit::Motion(motion, source) => {
                    sensors::compile_motion(&binder, source, motion, &mut program)?
                }
            }
        }

        if let Some(rule) = program.rules.iter().find(|r| {
            r.conditions.len() > MAX_RULE_ITEMS || r.actions.len() > MAX_RULE_ITEMS
        }) {
            return Err(ConfigError::RuleTooLarge {
                rule: rule.name.clone(),
                conditions: rule.conditions.len(),
                actions: rule.actions.len(),
            });
        }

        tracing::debug!(
            label,
            sensors = program.sensors.len(),
            schedules = program.schedules.len(),
            rules = program.rules.len(),
            "compiled room"
        );
        Ok(Compilation { program, registry })
    }

    /// Keep the names a compilation registered; later rooms may refer to them.
    pub fn commit(&mut self, compilation: Compilation) -> Program {
        self.registry = compilation.registry;
        compilation.program
    }
}

fn register(registry: &mut Registry, blocks: &[Block], label: &str) -> Result<(), ConfigError> {
    for block in blocks {
        let name = block.name();
        if let Some(first) = registry.blocks.get(name) {
            return Err(ConfigError::DuplicateBlock {
                name: name.to_string(),
                first: first.clone(),
                second: label.to_string(),
            });
        }
        registry.blocks.insert(name.to_string(), label.to_string());

        match block {
            Block::State(state) => {
                registry
                    .states
                    .insert(state.name.clone(), StateEntry::new(state)?);
            }
            Block::Motion(motion) => {
                registry.motions.insert(motion.name.clone());
            }
            Block::Contact(contact) => {
                registry.contacts.insert(contact.name.clone());
                for code in [&contact.bindings.open, &contact.bindings.closed] {
                    binding::external_value(&contact.name, code)?;
                    registry.arena.register(&contact.name, code, None)?;
                }
            }
            Block::Switch(_) | Block::External(_) => {}
        }
    }
    Ok(())
}

/// A block ready for compilation.
enum Unit<'a> {
    State(&'a StateBlock),
    Contact(&'a ContactBlock),
    Input(Source<'a>),
    Motion(&'a MotionBlock, Source<'a>),
}

impl<'a> Unit<'a> {
    fn source(&self) -> Option<&Source<'a>> {
        match self {
            Unit::Input(source) | Unit::Motion(_, source) => Some(source),
            Unit::State(_) | Unit::Contact(_) => None,
        }
    }
}

/// Blocks in order, with aliases and templates of input blocks resolved.
fn units(blocks: &[Block]) -> Result<Vec<Unit<'_>>, ConfigError> {
    let mut units = Vec::with_capacity(blocks.len());
    for block in blocks {
        let unit = match block {
            Block::State(state) => Unit::State(state),
            Block::Contact(contact) => Unit::Contact(contact),
            Block::Switch(input) | Block::External(input) => {
                let (kind, bindings) = match block {
                    Block::Switch(_) => (
                        Input::Switch,
                        template::expand(&input.templates, &input.bindings),
                    ),
                    _ => (Input::External, input.bindings.clone()),
                };
                Unit::Input(Source {
                    block: &input.name,
                    input: kind,
                    group: input.group.as_deref(),
                    state: input.state.as_deref(),
                    sensor: input.sensor.as_deref(),
                    bindings: resolve::resolve_aliases(&input.name, &bindings)?,
                })
            }
            Block::Motion(motion) => Unit::Motion(
                motion,
                Source {
                    block: &motion.name,
                    input: Input::Motion,
                    group: motion.group.as_deref(),
                    state: None,
                    sensor: None,
                    bindings: resolve::resolve_aliases(&motion.name, &motion.bindings)?,
                },
            ),
        };
        units.push(unit);
    }
    Ok(units)
}
