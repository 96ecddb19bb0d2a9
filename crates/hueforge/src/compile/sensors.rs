//! Motion and contact coordination.
//!
//! Every motion block gets a status sensor `<name> MS`:
//!
//! | value | meaning                                   |
//! |-------|-------------------------------------------|
//! | 0     | idle                                      |
//! | 1     | active                                    |
//! | 2     | dimming, waiting for `dimtime` to pass    |
//! | 3     | door closed, watching for presence        |
//! | 4     | door closed while idle                    |
//!
//! and a flag `<name> SF` set by manual actions to keep the sensor from
//! firing right after someone used a switch. Contact blocks get a flag
//! `<name> DF` which is `true` while the door is closed.

use hueforge_config::Action;
use hueforge_config::ActionKind;
use hueforge_config::Code;
use hueforge_config::ContactBlock;
use hueforge_config::DimAction;
use hueforge_config::HmsDuration;
use hueforge_config::MotionBlock;
use serde_json::json;

use super::binding::ActionContext;
use super::binding::Binder;
use super::binding::Source;
use super::binding::Trigger;
use super::binding::DEFAULT_DIM_STEP;
use super::ir::ActionSpec;
use super::ir::Address;
use super::ir::CondSpec;
use super::ir::Field;
use super::ir::PhysicalKind;
use super::ir::Program;
use super::ir::SensorRef;
use super::ir::VirtualKind;
use crate::error::ConfigError;
use crate::hub::model::Operator;

/// Suppression window without an explicit `suppress`.
pub const DEFAULT_SUPPRESS: HmsDuration = HmsDuration::from_secs(60);

const IDLE: i64 = 0;
const ACTIVE: i64 = 1;
const DIMMING: i64 = 2;
const WATCH: i64 = 3;
const IDLE_CLOSED: i64 = 4;

/// Codes a motion block may bind.
pub const MOTION_EVENTS: [&str; 4] = ["on", "recover", "dim", "off"];

pub fn status_sensor(motion: &str) -> String {
    format!("{} MS", motion)
}

pub fn suppress_flag(motion: &str) -> String {
    format!("{} SF", motion)
}

pub fn door_flag(contact: &str) -> String {
    format!("{} DF", contact)
}

fn flag_is(name: String, value: bool) -> CondSpec {
    CondSpec::new(
        Address::sensor_state(SensorRef::Virtual(name), Field::Flag),
        Operator::Eq,
        value,
    )
}

fn set_flag(name: String, value: bool) -> ActionSpec {
    ActionSpec::new(
        Address::sensor(SensorRef::Virtual(name)),
        json!({ "flag": value }),
    )
}

struct Motion<'a> {
    block: &'a MotionBlock,
    presence: SensorRef,
    status: SensorRef,
    door: Option<String>,
    /// Resets of the block's state
    reset: Vec<ActionSpec>,
    dim: (&'a Code, &'a Action),
    off: (&'a Code, &'a Action),
}

impl Motion<'_> {
    fn status_is(&self, op: Operator, value: i64) -> CondSpec {
        CondSpec::new(
            Address::sensor_state(self.status.clone(), Field::Status),
            op,
            value,
        )
    }

    fn set_status(&self, value: i64) -> ActionSpec {
        ActionSpec::new(Address::sensor(self.status.clone()), json!({ "status": value }))
    }

    fn presence_is(&self, present: bool) -> CondSpec {
        CondSpec::new(
            Address::sensor_state(self.presence.clone(), Field::Presence),
            Operator::Eq,
            present,
        )
    }

    fn presence_changed(&self) -> CondSpec {
        CondSpec::changed(Address::sensor_state(self.presence.clone(), Field::Presence))
    }

    fn absent_for(&self, duration: HmsDuration) -> [CondSpec; 2] {
        [
            self.presence_is(false),
            CondSpec::stable_for(
                Address::sensor_state(self.presence.clone(), Field::Presence),
                duration,
            ),
        ]
    }

    fn status_stable_for(&self, duration: HmsDuration) -> CondSpec {
        CondSpec::stable_for(
            Address::sensor_state(self.status.clone(), Field::LastUpdated),
            duration,
        )
    }

    /// `DF eq false` when a door gates this sensor.
    fn door_open(&self) -> Option<CondSpec> {
        self.door.clone().map(|door| flag_is(door, false))
    }

    fn trigger(&self, event: &str, mut conditions: Vec<CondSpec>) -> Trigger {
        conditions.extend(self.door_open());
        Trigger::new(format!("{} {}", self.block.name, event), conditions)
    }
}

/// Sensors and cascade rules of a motion block.
pub fn compile_motion(
    binder: &Binder,
    source: &Source,
    block: &MotionBlock,
    out: &mut Program,
) -> Result<(), ConfigError> {
    if let Some(code) = source
        .bindings
        .keys()
        .find(|code| !MOTION_EVENTS.contains(&code.as_str()))
    {
        return Err(ConfigError::UnknownMotionEvent {
            block: block.name.clone(),
            code: code.clone(),
        });
    }
    let door = match &block.contact {
        Some(contact) if !binder.registry().contacts.contains(contact) => {
            return Err(ConfigError::UnknownContact {
                block: block.name.clone(),
                contact: contact.clone(),
            })
        }
        contact => contact.as_deref().map(door_flag),
    };

    out.add_sensor(&status_sensor(&block.name), VirtualKind::Status);
    out.add_sensor(&suppress_flag(&block.name), VirtualKind::Flag);

    let on_code = Code::from("on");
    let on = source
        .bindings
        .get(&on_code)
        .ok_or_else(|| ConfigError::MissingBinding {
            block: block.name.clone(),
            code: "on",
        })?;
    let recover_code = Code::from("recover");
    let recover = source.bindings.get(&recover_code).unwrap_or(on);
    let dim_code = Code::from("dim");
    let default_dim = Action::new(ActionKind::Dim(DimAction {
        value: DEFAULT_DIM_STEP,
        tt: None,
    }));
    let off_code = Code::from("off");
    let default_off = Action::new(ActionKind::Off);

    let motion = Motion {
        block,
        presence: SensorRef::Physical {
            name: block.name.clone(),
            kind: PhysicalKind::Presence,
        },
        status: SensorRef::Virtual(status_sensor(&block.name)),
        door,
        reset: match &block.state {
            Some(state) => binder.reset_state(&block.name, state)?,
            None => Vec::new(),
        },
        dim: (
            &dim_code,
            source.bindings.get(&dim_code).unwrap_or(&default_dim),
        ),
        off: (
            &off_code,
            source.bindings.get(&off_code).unwrap_or(&default_off),
        ),
    };

    // presence while idle or dimming
    for (event, code, action, from) in [
        ("on", &on_code, on, IDLE),
        ("recover", &recover_code, recover, DIMMING),
    ] {
        let mut trigger = motion.trigger(
            event,
            vec![
                motion.presence_is(true),
                motion.presence_changed(),
                motion.status_is(Operator::Eq, from),
                flag_is(suppress_flag(&block.name), false),
            ],
        );
        trigger.before = motion.reset.clone();
        trigger.after = vec![motion.set_status(ACTIVE)];
        trigger.resets = block.state.clone();
        binder.compile_action(&ActionContext::new(source, code, action), trigger, out)?;
    }

    let mut absent = motion.absent_for(block.timeout).to_vec();
    absent.push(motion.status_is(Operator::Eq, ACTIVE));
    let mut trigger = motion.trigger("dim", absent);
    trigger.after = vec![motion.set_status(DIMMING)];
    let (code, action) = motion.dim;
    binder.compile_action(&ActionContext::new(source, code, action), trigger, out)?;

    let mut trigger = Trigger::new(
        format!("{} off", block.name),
        vec![
            motion.status_is(Operator::Eq, DIMMING),
            motion.status_stable_for(block.dimtime),
        ],
    );
    trigger.after = motion.reset.clone();
    trigger.after.push(motion.set_status(IDLE));
    let (code, action) = motion.off;
    binder.compile_action(&ActionContext::new(source, code, action), trigger, out)?;

    let suppress = block.suppress.unwrap_or(DEFAULT_SUPPRESS);
    out.add_rule(
        format!("{} unsuppress", block.name),
        vec![
            flag_is(suppress_flag(&block.name), true),
            CondSpec::stable_for(
                Address::sensor_state(
                    SensorRef::Virtual(suppress_flag(&block.name)),
                    Field::LastUpdated,
                ),
                suppress,
            ),
        ],
        vec![set_flag(suppress_flag(&block.name), false)],
    );

    if let Some(door) = &motion.door {
        compile_watch(binder, source, &motion, door, out)?;
    }
    Ok(())
}

/// Door-closed watch of a motion block gated by a contact.
fn compile_watch(
    binder: &Binder,
    source: &Source,
    motion: &Motion,
    door: &str,
    out: &mut Program,
) -> Result<(), ConfigError> {
    let name = &motion.block.name;
    let door_state = |closed: bool| {
        [
            flag_is(door.to_string(), closed),
            CondSpec::changed(Address::sensor_state(
                SensorRef::Virtual(door.to_string()),
                Field::LastUpdated,
            )),
        ]
    };

    // an idle room stays dark behind a closed door and wakes up on opening
    for (event, from, to) in [
        ("door closed", ACTIVE, WATCH),
        ("idle door closed", IDLE, IDLE_CLOSED),
    ] {
        let mut conditions = door_state(true).to_vec();
        conditions.push(motion.status_is(Operator::Eq, from));
        out.add_rule(format!("{} {}", name, event), conditions, vec![motion.set_status(to)]);
    }
    for (event, from, to) in [
        ("door opened", WATCH, ACTIVE),
        ("idle door opened", IDLE_CLOSED, IDLE),
    ] {
        let mut conditions = door_state(false).to_vec();
        conditions.push(motion.status_is(Operator::Eq, from));
        out.add_rule(format!("{} {}", name, event), conditions, vec![motion.set_status(to)]);
    }

    out.add_rule(
        format!("{} watch", name),
        vec![
            motion.presence_is(true),
            motion.presence_changed(),
            motion.status_is(Operator::Eq, WATCH),
        ],
        vec![motion.set_status(ACTIVE)],
    );
    out.add_rule(
        format!("{} watch stay", name),
        vec![
            motion.status_is(Operator::Eq, WATCH),
            motion.status_stable_for(motion.block.dimtime),
            motion.presence_is(true),
        ],
        vec![motion.set_status(ACTIVE)],
    );

    let mut trigger = Trigger::new(
        format!("{} watch off", name),
        vec![
            motion.status_is(Operator::Eq, WATCH),
            motion.status_stable_for(motion.block.dimtime),
            motion.presence_is(false),
        ],
    );
    trigger.after = motion.reset.clone();
    trigger.after.push(motion.set_status(IDLE));
    let (code, action) = motion.off;
    binder.compile_action(&ActionContext::new(source, code, action), trigger, out)?;

    let mut trigger = Trigger::new(
        format!("{} idle watch off", name),
        vec![
            motion.status_is(Operator::Eq, IDLE_CLOSED),
            motion.status_stable_for(motion.block.dimtime),
            motion.presence_is(false),
        ],
    );
    trigger.after = vec![motion.set_status(IDLE)];
    binder.compile_action(&ActionContext::new(source, code, action), trigger, out)?;

    // the dim timer may have expired while the door was closed
    let conditions = vec![
        flag_is(door.to_string(), false),
        CondSpec::stable_for(
            Address::sensor_state(SensorRef::Virtual(door.to_string()), Field::LastUpdated),
            motion.block.timeout,
        ),
        motion.presence_is(false),
        motion.status_is(Operator::Eq, ACTIVE),
    ];
    let mut trigger = Trigger::new(format!("{} reopen", name), conditions);
    trigger.after = vec![motion.set_status(DIMMING)];
    let (code, action) = motion.dim;
    binder.compile_action(&ActionContext::new(source, code, action), trigger, out)
}

/// Door flag of a contact block, driven by its external codes.
pub fn compile_contact(
    binder: &Binder,
    block: &ContactBlock,
    out: &mut Program,
) -> Result<(), ConfigError> {
    let flag = door_flag(&block.name);
    out.add_sensor(&flag, VirtualKind::Flag);
    for (event, code, closed) in [
        ("open", &block.bindings.open, false),
        ("closed", &block.bindings.closed, true),
    ] {
        out.add_rule(
            format!("{} {}", block.name, event),
            binder.external_trigger(&block.name, code)?,
            vec![set_flag(flag.clone(), closed)],
        );
    }
    Ok(())
}
