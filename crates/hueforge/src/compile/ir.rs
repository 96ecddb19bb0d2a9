//! Compiled program of one label.
//!
//! Everything a rule or schedule refers to stays symbolic (sensor, group,
//! scene and light names) until the synchronizer links it against the
//! bridge's object ids.

use std::fmt;

use hueforge_config::HmsDuration;
use serde_json::Value;

use crate::hub::model::Operator;

/// Physical sensor kinds the compiler refers to by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum PhysicalKind {
    Switch,
    Presence,
}

impl PhysicalKind {
    /// Whether a bridge sensor type is of this kind.
    pub fn matches(self, sensor_type: &str) -> bool {
        match self {
            PhysicalKind::Switch => sensor_type.ends_with("Switch"),
            PhysicalKind::Presence => sensor_type.ends_with("Presence"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SensorRef {
    /// Sensor created and owned by the engine
    Virtual(String),
    /// Hardware sensor paired with the bridge
    Physical { name: String, kind: PhysicalKind },
}

impl SensorRef {
    pub fn name(&self) -> &str {
        match self {
            SensorRef::Virtual(name) => name,
            SensorRef::Physical { name, .. } => name,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
pub enum VirtualKind {
    #[strum(serialize = "status")]
    Status,
    #[strum(serialize = "flag")]
    Flag,
}

impl VirtualKind {
    pub fn hub_type(self) -> &'static str {
        match self {
            VirtualKind::Status => "CLIPGenericStatus",
            VirtualKind::Flag => "CLIPGenericFlag",
        }
    }

    pub fn from_hub_type(sensor_type: &str) -> Option<Self> {
        match sensor_type {
            "CLIPGenericStatus" => Some(VirtualKind::Status),
            "CLIPGenericFlag" => Some(VirtualKind::Flag),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SensorSpec {
    pub name: String,
    pub kind: VirtualKind,
}

/// A schedule named by the label that compiled it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ScheduleRef {
    pub label: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    Sensor(SensorRef),
    Group(String),
    Light(String),
    Schedule(ScheduleRef),
    /// Bridge configuration (`/config/localtime`)
    Config,
}

/// Resource plus attribute path below it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Address {
    pub target: Target,
    pub path: &'static str,
}

/// Sensor state attributes used in conditions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    Status,
    Flag,
    Presence,
    ButtonEvent,
    LastUpdated,
}

impl Field {
    fn path(self) -> &'static str {
        match self {
            Field::Status => "state/status",
            Field::Flag => "state/flag",
            Field::Presence => "state/presence",
            Field::ButtonEvent => "state/buttonevent",
            Field::LastUpdated => "state/lastupdated",
        }
    }
}

impl Address {
    pub fn sensor_state(sensor: SensorRef, field: Field) -> Self {
        Self {
            target: Target::Sensor(sensor),
            path: field.path(),
        }
    }

    pub fn sensor(sensor: SensorRef) -> Self {
        Self {
            target: Target::Sensor(sensor),
            path: "state",
        }
    }

    pub fn group(group: &str) -> Self {
        Self {
            target: Target::Group(group.to_string()),
            path: "action",
        }
    }

    pub fn light(light: &str) -> Self {
        Self {
            target: Target::Light(light.to_string()),
            path: "state",
        }
    }

    pub fn light_on(light: &str) -> Self {
        Self {
            target: Target::Light(light.to_string()),
            path: "state/on",
        }
    }

    pub fn schedule(schedule: ScheduleRef) -> Self {
        Self {
            target: Target::Schedule(schedule),
            path: "",
        }
    }

    pub fn localtime() -> Self {
        Self {
            target: Target::Config,
            path: "localtime",
        }
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.target {
            Target::Sensor(SensorRef::Virtual(name)) => write!(f, "sensor \"{}\"", name)?,
            Target::Sensor(SensorRef::Physical { name, kind }) => {
                write!(f, "{} \"{}\"", kind, name)?
            }
            Target::Group(name) => write!(f, "group \"{}\"", name)?,
            Target::Light(name) => write!(f, "light \"{}\"", name)?,
            Target::Schedule(schedule) => write!(f, "schedule \"{}\"", schedule.name)?,
            Target::Config => write!(f, "config")?,
        }
        if !self.path.is_empty() {
            write!(f, ".{}", self.path.replace('/', "."))?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CondSpec {
    pub address: Address,
    pub op: Operator,
    pub value: Option<String>,
}

impl CondSpec {
    pub fn new(address: Address, op: Operator, value: impl ToString) -> Self {
        Self {
            address,
            op,
            value: Some(value.to_string()),
        }
    }

    /// `dx` on an attribute: fires when it changes.
    pub fn changed(address: Address) -> Self {
        Self {
            address,
            op: Operator::Dx,
            value: None,
        }
    }

    /// `ddx`: the attribute changed and then stayed unchanged for `after`.
    pub fn stable_for(address: Address, after: HmsDuration) -> Self {
        Self::new(address, Operator::Ddx, after.to_timer())
    }
}

impl fmt::Display for CondSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.address, self.op)?;
        if let Some(value) = &self.value {
            write!(f, " {}", value)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Body {
    Json(Value),
    /// `{"scene": <id>}` of the named scene in the named group
    Scene { group: String, scene: String },
}

impl fmt::Display for Body {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Body::Json(value) => write!(f, "{}", value),
            Body::Scene { group, scene } => write!(f, "scene \"{}\"/\"{}\"", group, scene),
        }
    }
}

/// A `PUT` issued by a rule or schedule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionSpec {
    pub address: Address,
    pub body: Body,
}

impl ActionSpec {
    pub fn new(address: Address, body: Value) -> Self {
        Self {
            address,
            body: Body::Json(body),
        }
    }
}

impl fmt::Display for ActionSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PUT {} {}", self.address, self.body)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleSpec {
    pub name: String,
    pub conditions: Vec<CondSpec>,
    pub actions: Vec<ActionSpec>,
}

/// One-shot timer, created disabled and started by rules.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduleSpec {
    pub name: String,
    pub timer: HmsDuration,
    pub command: ActionSpec,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Program {
    pub label: String,
    pub sensors: Vec<SensorSpec>,
    pub schedules: Vec<ScheduleSpec>,
    pub rules: Vec<RuleSpec>,
}

impl Program {
    pub fn new(label: &str) -> Self {
        Self {
            label: label.to_string(),
            ..Default::default()
        }
    }

    pub fn add_sensor(&mut self, name: &str, kind: VirtualKind) {
        if !self.sensors.iter().any(|s| s.name == name) {
            self.sensors.push(SensorSpec {
                name: name.to_string(),
                kind,
            });
        }
    }

    /// Add a schedule unless one with the same name was already added.
    pub fn add_schedule(&mut self, schedule: ScheduleSpec) {
        if !self.schedules.iter().any(|s| s.name == schedule.name) {
            self.schedules.push(schedule);
        }
    }

    pub fn add_rule(&mut self, name: String, conditions: Vec<CondSpec>, actions: Vec<ActionSpec>) {
        self.rules.push(RuleSpec {
            name,
            conditions,
            actions,
        });
    }

    pub fn rule(&self, name: &str) -> Option<&RuleSpec> {
        self.rules.iter().find(|r| r.name == name)
    }
}
