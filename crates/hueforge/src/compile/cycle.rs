//! Cycling scenes on virtual counters.
//!
//! A state block owns one `CLIPGenericStatus` counter per use. A counter
//! reads `0` when fresh and `i + 1` while config `i` of its cycling action is
//! shown. Pressing again advances to the next config. A fresh press picks the
//! config mapped to the current time window instead.
//!
//! Configs with a timeout start a disabled one-shot schedule that writes
//! `-(i + 1)` into the counter. A revert rule reacts to that value by
//! replaying the default config and making the counter fresh again.

use std::collections::BTreeMap;

use hueforge_config::time::check_tiling;
use hueforge_config::Action;
use hueforge_config::HmsDuration;
use hueforge_config::SceneAction;
use hueforge_config::SceneConfig;
use hueforge_config::StateBlock;
use hueforge_config::TimeWindow;
use serde_json::json;

use super::binding::ActionContext;
use super::binding::Binder;
use super::binding::Trigger;
use super::ir::ActionSpec;
use super::ir::Address;
use super::ir::CondSpec;
use super::ir::Field;
use super::ir::Program;
use super::ir::ScheduleRef;
use super::ir::ScheduleSpec;
use super::ir::SensorRef;
use super::ir::VirtualKind;
use crate::error::ConfigError;
use crate::hub::model::Operator;

/// Name of the counter sensor of `slot`.
pub fn counter_name(state: &str, slot: usize) -> String {
    if slot == 0 {
        state.to_string()
    } else {
        format!("{} {}", state, slot + 1)
    }
}

fn counter(name: &str) -> SensorRef {
    SensorRef::Virtual(name.to_string())
}

fn schedule_name(counter: &str, index: usize) -> String {
    format!("{} t{}", counter, index + 1)
}

/// Write `value` into a counter.
pub fn set_counter(name: &str, value: i64) -> ActionSpec {
    ActionSpec::new(Address::sensor(counter(name)), json!({ "status": value }))
}

fn counter_is(name: &str, value: i64) -> CondSpec {
    CondSpec::new(
        Address::sensor_state(counter(name), Field::Status),
        Operator::Eq,
        value,
    )
}

#[derive(Debug, Clone)]
struct SlotOwner {
    block: String,
    binding: String,
    action: Action,
}

/// Registry entry of a state block.
#[derive(Debug, Clone)]
pub struct StateEntry {
    pub uses: u8,
    owners: [Option<SlotOwner>; 2],
    /// Revert schedules of every cycle on this state
    pub schedules: Vec<ScheduleRef>,
}

impl StateEntry {
    pub fn new(block: &StateBlock) -> Result<Self, ConfigError> {
        if !(1..=2).contains(&block.uses) {
            return Err(ConfigError::InvalidUses {
                state: block.name.clone(),
                uses: block.uses,
            });
        }
        Ok(Self {
            uses: block.uses,
            owners: [None, None],
            schedules: Vec::new(),
        })
    }

    pub fn counters<'a>(&self, state: &'a str) -> impl Iterator<Item = String> + 'a {
        (0..self.uses as usize).map(move |slot| counter_name(state, slot))
    }
}

/// Counter sensors of a state block, plus its inactivity reset.
pub fn compile_state_block(block: &StateBlock, out: &mut Program) -> Result<(), ConfigError> {
    let entry = StateEntry::new(block)?;
    for name in entry.counters(&block.name) {
        out.add_sensor(&name, VirtualKind::Status);
        if let Some(timeout) = block.timeout {
            out.add_rule(
                format!("{} reset", name),
                vec![
                    CondSpec::new(
                        Address::sensor_state(counter(&name), Field::Status),
                        Operator::Gt,
                        0,
                    ),
                    CondSpec::stable_for(
                        Address::sensor_state(counter(&name), Field::LastUpdated),
                        timeout,
                    ),
                ],
                vec![set_counter(&name, 0)],
            );
        }
    }
    Ok(())
}

/// Time windows of a fresh press and the config each selects; a single
/// unconditional choice of config 0 without a time table.
fn fresh_choices(times: &BTreeMap<TimeWindow, usize>) -> Vec<(Option<TimeWindow>, usize)> {
    if times.is_empty() {
        vec![(None, 0)]
    } else {
        times.iter().map(|(w, i)| (Some(*w), *i)).collect()
    }
}

pub fn in_window(window: &TimeWindow) -> CondSpec {
    CondSpec::new(Address::localtime(), Operator::In, window)
}

pub fn validate_times(
    cx: &ActionContext,
    times: &BTreeMap<TimeWindow, usize>,
    len: usize,
) -> Result<(), ConfigError> {
    if times.is_empty() {
        return Ok(());
    }
    check_tiling(times.keys()).map_err(|source| ConfigError::InvalidTimes {
        block: cx.block.to_string(),
        code: cx.code.clone(),
        source,
    })?;
    if let Some(&index) = times.values().find(|&&i| i >= len) {
        return Err(ConfigError::TimeIndexOutOfRange {
            block: cx.block.to_string(),
            code: cx.code.clone(),
            index,
            len,
        });
    }
    Ok(())
}

fn slot(cx: &ActionContext, state: &str, entry: &StateEntry) -> Result<usize, ConfigError> {
    let slot = cx.action.state_use.unwrap_or_default().slot();
    if slot >= entry.uses as usize {
        return Err(ConfigError::NoSecondarySlot {
            block: cx.block.to_string(),
            code: cx.code.clone(),
            state: state.to_string(),
        });
    }
    Ok(slot)
}

/// A cycling scene action bound to its counter.
pub struct Cycle<'a> {
    cx: &'a ActionContext<'a>,
    configs: Vec<SceneConfig>,
    times: &'a BTreeMap<TimeWindow, usize>,
    slot: usize,
    counter: String,
    label: String,
}

impl<'a> Cycle<'a> {
    fn schedule(&self, index: usize) -> Option<ScheduleRef> {
        self.configs[index].timeout.map(|_| ScheduleRef {
            label: self.label.clone(),
            name: schedule_name(&self.counter, index),
        })
    }

    /// Show config `index`: its effect, then (re)start its revert schedule
    /// and stop those of the other configs.
    fn select(&self, binder: &Binder, index: usize) -> Result<Vec<ActionSpec>, ConfigError> {
        let mut actions = binder.scene_effect(self.cx, &self.configs[index])?;
        for (i, config) in self.configs.iter().enumerate() {
            let (Some(timer), Some(schedule)) = (config.timeout, self.schedule(i)) else {
                continue;
            };
            let body = if i == index {
                json!({ "status": "enabled", "localtime": timer.to_timer() })
            } else {
                json!({ "status": "disabled" })
            };
            actions.push(ActionSpec::new(Address::schedule(schedule), body));
        }
        Ok(actions)
    }
}

/// Bind a cycling scene action to the counter it advances.
pub fn bind<'a>(
    binder: &Binder,
    cx: &'a ActionContext<'a>,
    scene: &'a SceneAction,
    state: &str,
) -> Result<Cycle<'a>, ConfigError> {
    let configs = scene.effective_configs();
    validate_times(cx, &scene.times, configs.len())?;
    let entry = binder.state(cx.block, state)?;
    let slot = slot(cx, state, entry)?;
    Ok(Cycle {
        cx,
        configs,
        times: &scene.times,
        slot,
        counter: counter_name(state, slot),
        label: binder.label.to_string(),
    })
}

/// Claim the counter of a cycling action and emit what exists once per
/// cycle: revert schedules and revert rules.
///
/// Runs over every binding before any rule is compiled, so resets of a state
/// know all of its revert schedules. Binding the same action of one block
/// twice (motion `on` and `recover`) shares the cycle.
pub fn claim(
    binder: &mut Binder,
    cx: &ActionContext,
    scene: &SceneAction,
    state: &str,
    out: &mut Program,
) -> Result<(), ConfigError> {
    let cycle = bind(binder, cx, scene, state)?;
    let binding = format!("{}/{}", cx.block, cx.code);

    let entry = binder.state_mut(cx.block, state)?;
    match &entry.owners[cycle.slot] {
        Some(owner) if owner.block == cx.block && &owner.action == cx.action => return Ok(()),
        Some(owner) => {
            return Err(ConfigError::SharedSlot {
                counter: cycle.counter.clone(),
                first: owner.binding.clone(),
                second: binding,
            })
        }
        None => {
            entry.owners[cycle.slot] = Some(SlotOwner {
                block: cx.block.to_string(),
                binding,
                action: cx.action.clone(),
            });
        }
    }
    entry
        .schedules
        .extend((0..cycle.configs.len()).filter_map(|i| cycle.schedule(i)));

    let counter = &cycle.counter;
    let timeouts: Vec<(usize, HmsDuration)> = cycle
        .configs
        .iter()
        .enumerate()
        .filter_map(|(i, c)| c.timeout.map(|t| (i, t)))
        .collect();
    for (index, timer) in timeouts {
        let revert = -(index as i64 + 1);
        out.add_schedule(ScheduleSpec {
            name: schedule_name(counter, index),
            timer,
            command: set_counter(counter, revert),
        });

        for (k, (window, default)) in fresh_choices(cycle.times).into_iter().enumerate() {
            let name = match window {
                Some(_) => format!("{} r{} w{}", counter, index + 1, k + 1),
                None => format!("{} r{}", counter, index + 1),
            };
            let mut conditions = vec![
                counter_is(counter, revert),
                CondSpec::changed(Address::sensor_state(
                    SensorRef::Virtual(counter.clone()),
                    Field::LastUpdated,
                )),
            ];
            conditions.extend(window.as_ref().map(in_window));
            let mut actions = binder.scene_effect(cx, &cycle.configs[default])?;
            actions.push(set_counter(counter, 0));
            out.add_rule(name, conditions, actions);
        }
    }
    Ok(())
}

/// Emit the selection rules of a cycle for one trigger.
///
/// When the trigger resets the counter before the cycle runs, only the
/// fresh choice is compiled.
pub fn compile_selection(
    binder: &Binder,
    cycle: &Cycle,
    trigger: &Trigger,
    fresh_only: bool,
    out: &mut Program,
) -> Result<(), ConfigError> {
    let counter = &cycle.counter;
    for (k, (window, index)) in fresh_choices(cycle.times).into_iter().enumerate() {
        let mut conditions = Vec::new();
        if !fresh_only {
            conditions.push(counter_is(counter, 0));
        }
        conditions.extend(window.as_ref().map(in_window));
        let mut actions = cycle.select(binder, index)?;
        actions.push(set_counter(counter, index as i64 + 1));
        binder.emit(out, trigger, Some(format!("f{}", k + 1)), conditions, actions);
    }
    if fresh_only {
        return Ok(());
    }

    let len = cycle.configs.len();
    for shown in 1..=len {
        let next = shown % len;
        let mut actions = cycle.select(binder, next)?;
        actions.push(set_counter(counter, next as i64 + 1));
        binder.emit(
            out,
            trigger,
            Some(format!("a{}", shown)),
            vec![counter_is(counter, shown as i64)],
            actions,
        );
    }
    Ok(())
}

/// Reset every counter of a state and stop its revert schedules.
pub fn reset_actions(state: &str, entry: &StateEntry) -> Vec<ActionSpec> {
    let mut actions: Vec<ActionSpec> = entry
        .counters(state)
        .map(|name| set_counter(&name, 0))
        .collect();
    actions.extend(entry.schedules.iter().map(|schedule| {
        ActionSpec::new(
            Address::schedule(schedule.clone()),
            json!({ "status": "disabled" }),
        )
    }));
    actions
}
