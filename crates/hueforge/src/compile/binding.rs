//! Binding compiler: one rule (or a family of rules) per input binding.

use std::collections::BTreeMap;

use hueforge_config::Action;
use hueforge_config::ActionKind;
use hueforge_config::Code;
use hueforge_config::LightOp;
use hueforge_config::SceneAction;
use hueforge_config::SceneConfig;
use hueforge_config::SensorOverride;
use hueforge_config::SCENE_DIM;
use hueforge_config::SCENE_OFF;
use serde_json::json;

use super::cycle;
use super::cycle::StateEntry;
use super::ir::ActionSpec;
use super::ir::Address;
use super::ir::Body;
use super::ir::CondSpec;
use super::ir::Field;
use super::ir::PhysicalKind;
use super::ir::Program;
use super::ir::SensorRef;
use super::Registry;
use crate::error::ConfigError;
use crate::hub::model::Operator;

/// Brightness step of dimming without an explicit value.
pub const DEFAULT_DIM_STEP: i16 = -128;

/// Hue button event of a switch code.
///
/// Friends-of-Hue rockers use `tl`, `bl`, `tr`, `br`; the Hue tap uses
/// `b1`..`b4`. Dimmer switches use `on`, `up`, `down` and `off`, released
/// after a short press, with `-press`, `-hold` and `-long` for the initial
/// press, holding and releasing after a long press. Numbers are passed
/// through unchanged.
pub fn button_event(block: &str, code: &Code) -> Result<i64, ConfigError> {
    let unknown = || ConfigError::UnknownButton {
        block: block.to_string(),
        code: code.clone(),
    };
    let event = match code.as_str() {
        "tl" => 16,
        "bl" => 17,
        "tr" => 18,
        "br" => 19,
        "b1" => 34,
        "b2" => 16,
        "b3" => 17,
        "b4" => 18,
        other => {
            if let Ok(event) = other.parse() {
                return Ok(event);
            }
            let (button, phase) = other.split_once('-').unwrap_or((other, "release"));
            let button = match button {
                "on" => 1000,
                "up" => 2000,
                "down" => 3000,
                "off" => 4000,
                _ => return Err(unknown()),
            };
            let phase = match phase {
                "press" => 0,
                "hold" => 1,
                "release" => 2,
                "long" => 3,
                _ => return Err(unknown()),
            };
            button + phase
        }
    };
    Ok(event)
}

/// Value an external code writes into the external input sensor.
pub fn external_value(block: &str, code: &Code) -> Result<i64, ConfigError> {
    code.as_str()
        .parse()
        .map_err(|_| ConfigError::InvalidExternalCode {
            block: block.to_string(),
            code: code.clone(),
        })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Input {
    Switch,
    External,
    Motion,
}

/// An input block with its aliases and templates resolved.
pub struct Source<'a> {
    pub block: &'a str,
    pub input: Input,
    pub group: Option<&'a str>,
    pub state: Option<&'a str>,
    pub sensor: Option<&'a str>,
    pub bindings: BTreeMap<Code, Action>,
}

/// One action with the defaults it inherits from its block applied.
pub struct ActionContext<'a> {
    pub block: &'a str,
    pub code: &'a Code,
    pub action: &'a Action,
    pub group: Option<&'a str>,
    /// Innermost declared state; redirects never inherit one
    pub state: Option<&'a str>,
    /// Motion block suppressed when this action fires
    pub sensor: Option<&'a str>,
}

impl<'a> ActionContext<'a> {
    pub fn new(source: &'a Source<'a>, code: &'a Code, action: &'a Action) -> Self {
        let inherited_state = match action.kind {
            ActionKind::Redirect(_) => None,
            _ => source.state,
        };
        let sensor = match &action.sensor {
            Some(SensorOverride::Use(sensor)) => Some(sensor.as_str()),
            Some(SensorOverride::Disable) => None,
            None => source.sensor,
        };
        Self {
            block: source.block,
            code,
            action,
            group: action.group.as_deref().or(source.group),
            state: action.state.as_deref().or(inherited_state),
            sensor,
        }
    }

    /// The scene and state if this action advances a counter.
    pub fn cycling(&self) -> Option<(&'a SceneAction, &'a str)> {
        match (&self.action.kind, self.state) {
            (ActionKind::Scene(scene), Some(state)) if scene.effective_configs().len() > 1 => {
                Some((scene, state))
            }
            _ => None,
        }
    }

    fn group(&self, action: &'static str) -> Result<&'a str, ConfigError> {
        self.group.ok_or_else(|| ConfigError::MissingGroup {
            block: self.block.to_string(),
            code: self.code.clone(),
            action,
        })
    }
}

/// What fires a compiled action and what runs around it.
pub struct Trigger {
    pub name: String,
    pub conditions: Vec<CondSpec>,
    pub before: Vec<ActionSpec>,
    pub after: Vec<ActionSpec>,
    /// State whose counters `before` resets
    pub resets: Option<String>,
}

impl Trigger {
    pub fn new(name: String, conditions: Vec<CondSpec>) -> Self {
        Self {
            name,
            conditions,
            before: Vec::new(),
            after: Vec::new(),
            resets: None,
        }
    }
}

pub struct Binder<'r> {
    pub label: &'r str,
    external_sensor: &'r str,
    registry: &'r mut Registry,
}

impl<'r> Binder<'r> {
    pub fn new(label: &'r str, external_sensor: &'r str, registry: &'r mut Registry) -> Self {
        Self {
            label,
            external_sensor,
            registry,
        }
    }

    pub fn registry(&self) -> &Registry {
        self.registry
    }

    pub fn state(&self, block: &str, state: &str) -> Result<&StateEntry, ConfigError> {
        self.registry
            .states
            .get(state)
            .ok_or_else(|| ConfigError::UnknownState {
                block: block.to_string(),
                state: state.to_string(),
            })
    }

    pub fn state_mut(&mut self, block: &str, state: &str) -> Result<&mut StateEntry, ConfigError> {
        self.registry
            .states
            .get_mut(state)
            .ok_or_else(|| ConfigError::UnknownState {
                block: block.to_string(),
                state: state.to_string(),
            })
    }

    pub fn reset_state(&self, block: &str, state: &str) -> Result<Vec<ActionSpec>, ConfigError> {
        Ok(cycle::reset_actions(state, self.state(block, state)?))
    }

    pub fn external_sensor(&self) -> SensorRef {
        SensorRef::Virtual(self.external_sensor.to_string())
    }

    /// Conditions of "external code `code` was written".
    pub fn external_trigger(&self, block: &str, code: &Code) -> Result<Vec<CondSpec>, ConfigError> {
        Ok(vec![
            CondSpec::new(
                Address::sensor_state(self.external_sensor(), Field::Status),
                Operator::Eq,
                external_value(block, code)?,
            ),
            CondSpec::changed(Address::sensor_state(
                self.external_sensor(),
                Field::LastUpdated,
            )),
        ])
    }

    fn external_write(&self, block: &str, code: &Code) -> Result<ActionSpec, ConfigError> {
        Ok(ActionSpec::new(
            Address::sensor(self.external_sensor()),
            json!({ "status": external_value(block, code)? }),
        ))
    }

    /// Mark a motion block as suppressed.
    pub fn suppress(&self, block: &str, motion: &str) -> Result<ActionSpec, ConfigError> {
        if !self.registry.motions.contains(motion) {
            return Err(ConfigError::UnknownMotion {
                block: block.to_string(),
                sensor: motion.to_string(),
            });
        }
        Ok(ActionSpec::new(
            Address::sensor(SensorRef::Virtual(super::sensors::suppress_flag(motion))),
            json!({ "flag": true }),
        ))
    }

    /// Actions showing one scene config on the action's group.
    pub fn scene_effect(
        &self,
        cx: &ActionContext,
        config: &SceneConfig,
    ) -> Result<Vec<ActionSpec>, ConfigError> {
        let group = cx.group("scene")?;
        let address = Address::group(group);
        let actions = match config.scene.as_str() {
            SCENE_OFF => vec![ActionSpec::new(address, json!({ "on": false }))],
            SCENE_DIM => vec![ActionSpec::new(
                address,
                json!({ "bri_inc": config.value.unwrap_or(DEFAULT_DIM_STEP) }),
            )],
            scene => {
                let mut actions = vec![ActionSpec {
                    address: address.clone(),
                    body: Body::Scene {
                        group: group.to_string(),
                        scene: scene.to_string(),
                    },
                }];
                if let Some(value) = config.value {
                    actions.push(ActionSpec::new(address, json!({ "bri_inc": value })));
                }
                actions
            }
        };
        Ok(actions)
    }

    /// Add a rule: trigger conditions plus `conditions`, and `actions`
    /// wrapped in the trigger's before and after actions.
    pub fn emit(
        &self,
        out: &mut Program,
        trigger: &Trigger,
        suffix: Option<String>,
        conditions: Vec<CondSpec>,
        actions: Vec<ActionSpec>,
    ) {
        let name = match suffix {
            Some(suffix) => format!("{} {}", trigger.name, suffix),
            None => trigger.name.clone(),
        };
        let mut all_conditions = trigger.conditions.clone();
        all_conditions.extend(conditions);

        let mut all_actions: Vec<ActionSpec> = Vec::new();
        let ordered = trigger
            .before
            .iter()
            .cloned()
            .chain(actions)
            .chain(trigger.after.iter().cloned());
        for action in ordered {
            if !all_actions.contains(&action) {
                all_actions.push(action);
            }
        }
        out.add_rule(name, all_conditions, all_actions);
    }

    /// Compile one action fired by `trigger`.
    pub fn compile_action(
        &self,
        cx: &ActionContext,
        mut trigger: Trigger,
        out: &mut Program,
    ) -> Result<(), ConfigError> {
        if let Some(motion) = cx.sensor {
            trigger.after.push(self.suppress(cx.block, motion)?);
        }

        let cycling = cx.cycling();
        let reset = match cx.state {
            Some(state) if cycling.is_none() => self.reset_state(cx.block, state)?,
            _ => Vec::new(),
        };

        match &cx.action.kind {
            ActionKind::Redirect(redirect) => {
                let target =
                    self.registry
                        .arena
                        .resolve_redirect(cx.block, cx.code, &redirect.value)?;
                let mut actions = reset;
                actions.push(self.external_write(cx.block, &target)?);
                self.emit(out, &trigger, None, Vec::new(), actions);
            }
            ActionKind::Scene(scene) => {
                if let Some((scene, state)) = cycling {
                    let cycle = cycle::bind(self, cx, scene, state)?;
                    let fresh_only = trigger.resets.as_deref() == Some(state);
                    return cycle::compile_selection(self, &cycle, &trigger, fresh_only, out);
                }
                self.compile_stateless_scene(cx, scene, &trigger, reset, out)?;
            }
            ActionKind::Light(light) => {
                let address = Address::light(&light.light);
                match light.action {
                    LightOp::On | LightOp::Off => {
                        let mut actions = reset;
                        actions.push(ActionSpec::new(
                            address,
                            json!({ "on": light.action == LightOp::On }),
                        ));
                        self.emit(out, &trigger, None, Vec::new(), actions);
                    }
                    LightOp::Toggle => {
                        for (now_on, suffix) in [(false, "on"), (true, "off")] {
                            let mut actions = reset.clone();
                            actions.push(ActionSpec::new(
                                address.clone(),
                                json!({ "on": !now_on }),
                            ));
                            self.emit(
                                out,
                                &trigger,
                                Some(suffix.to_string()),
                                vec![CondSpec::new(
                                    Address::light_on(&light.light),
                                    Operator::Eq,
                                    now_on,
                                )],
                                actions,
                            );
                        }
                    }
                }
            }
            ActionKind::Off => {
                let mut actions = reset;
                actions.push(ActionSpec::new(
                    Address::group(cx.group("off")?),
                    json!({ "on": false }),
                ));
                self.emit(out, &trigger, None, Vec::new(), actions);
            }
            ActionKind::Dim(dim) => {
                let body = match dim.tt {
                    Some(tt) => json!({ "bri_inc": dim.value, "transitiontime": tt }),
                    None => json!({ "bri_inc": dim.value }),
                };
                let mut actions = reset;
                actions.push(ActionSpec::new(Address::group(cx.group("dim")?), body));
                self.emit(out, &trigger, None, Vec::new(), actions);
            }
        }
        Ok(())
    }

    /// A single scene, or configs picked by time of day alone.
    fn compile_stateless_scene(
        &self,
        cx: &ActionContext,
        scene: &SceneAction,
        trigger: &Trigger,
        reset: Vec<ActionSpec>,
        out: &mut Program,
    ) -> Result<(), ConfigError> {
        let configs = scene.effective_configs();
        if configs.is_empty() {
            return Err(ConfigError::EmptyScene {
                block: cx.block.to_string(),
                code: cx.code.clone(),
            });
        }
        if configs.iter().any(|c| c.timeout.is_some()) {
            return Err(ConfigError::RevertWithoutState {
                block: cx.block.to_string(),
                code: cx.code.clone(),
            });
        }

        if configs.len() == 1 {
            let mut actions = reset;
            actions.extend(self.scene_effect(cx, &configs[0])?);
            self.emit(out, trigger, None, Vec::new(), actions);
            return Ok(());
        }

        if scene.times.is_empty() {
            return Err(ConfigError::StatelessCycleWithoutTimes {
                block: cx.block.to_string(),
                code: cx.code.clone(),
            });
        }
        cycle::validate_times(cx, &scene.times, configs.len())?;
        for (k, (window, &index)) in scene.times.iter().enumerate() {
            let mut actions = reset.clone();
            actions.extend(self.scene_effect(cx, &configs[index])?);
            self.emit(
                out,
                trigger,
                Some(format!("w{}", k + 1)),
                vec![cycle::in_window(window)],
                actions,
            );
        }
        Ok(())
    }

    /// Compile every binding of a switch or external block.
    pub fn compile_input(&self, source: &Source, out: &mut Program) -> Result<(), ConfigError> {
        for (code, action) in &source.bindings {
            let cx = ActionContext::new(source, code, action);
            let conditions = match source.input {
                Input::Switch => {
                    let sensor = SensorRef::Physical {
                        name: source.block.to_string(),
                        kind: PhysicalKind::Switch,
                    };
                    vec![
                        CondSpec::new(
                            Address::sensor_state(sensor.clone(), Field::ButtonEvent),
                            Operator::Eq,
                            button_event(source.block, code)?,
                        ),
                        CondSpec::changed(Address::sensor_state(sensor, Field::LastUpdated)),
                    ]
                }
                Input::External => self.external_trigger(source.block, code)?,
                Input::Motion => continue,
            };
            let trigger = Trigger::new(format!("{} {}", source.block, code), conditions);
            self.compile_action(&cx, trigger, out)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_button_events() {
        let event = |code: &str| button_event("S", &Code::from(code)).unwrap();
        assert_eq!(event("tl"), 16);
        assert_eq!(event("br"), 19);
        assert_eq!(event("b1"), 34);
        assert_eq!(event("on"), 1002);
        assert_eq!(event("up-press"), 2000);
        assert_eq!(event("down-hold"), 3001);
        assert_eq!(event("off-long"), 4003);
        assert_eq!(event("5002"), 5002);
    }

    #[test]
    fn test_unknown_buttons_are_rejected() {
        assert!(button_event("S", &Code::from("middle")).is_err());
        assert!(button_event("S", &Code::from("up-double")).is_err());
    }
}
