//! Declarative room configuration: blocks, bindings and actions.
//!
//! A room file is an ordered list of [`Block`]s. Input blocks map event codes
//! to [`Binding`]s, which are either a full [`Action`] or an alias naming
//! another binding of the same block.

use std::collections::BTreeMap;
use std::fmt;

use serde::de;
use serde::Deserialize;
use serde::Deserializer;

use crate::time::HmsDuration;
use crate::time::TimeWindow;

/// An event code: a button name, a motion event or an external input value.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Code(pub String);

impl Code {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Code {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Code {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl<'de> Deserialize<'de> for Code {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct CodeVisitor;

        impl de::Visitor<'_> for CodeVisitor {
            type Value = Code;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("an event code (string or integer)")
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<Code, E> {
                Ok(Code(v.to_string()))
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<Code, E> {
                Ok(Code(v.to_string()))
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<Code, E> {
                Ok(Code(v.to_string()))
            }
        }

        deserializer.deserialize_any(CodeVisitor)
    }
}

/// A configuration unit of a room.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Block {
    State(StateBlock),
    Switch(InputBlock),
    External(InputBlock),
    Motion(MotionBlock),
    Contact(ContactBlock),
}

impl Block {
    pub fn name(&self) -> &str {
        match self {
            Block::State(b) => &b.name,
            Block::Switch(b) | Block::External(b) => &b.name,
            Block::Motion(b) => &b.name,
            Block::Contact(b) => &b.name,
        }
    }

    pub fn kind(&self) -> BlockKind {
        match self {
            Block::State(_) => BlockKind::State,
            Block::Switch(_) => BlockKind::Switch,
            Block::External(_) => BlockKind::External,
            Block::Motion(_) => BlockKind::Motion,
            Block::Contact(_) => BlockKind::Contact,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlockKind {
    State,
    Switch,
    External,
    Motion,
    Contact,
}

impl fmt::Display for BlockKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BlockKind::State => "state",
            BlockKind::Switch => "switch",
            BlockKind::External => "external",
            BlockKind::Motion => "motion",
            BlockKind::Contact => "contact",
        };
        f.write_str(s)
    }
}

fn default_uses() -> u8 {
    1
}

/// Virtual counter storage for cycling scenes.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateBlock {
    pub name: String,

    /// Number of independent counters (1 or 2)
    #[serde(default = "default_uses")]
    pub uses: u8,

    /// Reset every counter to fresh after this long without a change
    #[serde(default)]
    pub timeout: Option<HmsDuration>,
}

/// A switch or an external input source.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InputBlock {
    pub name: String,

    #[serde(default)]
    pub group: Option<String>,

    #[serde(default)]
    pub state: Option<String>,

    /// Motion block to suppress whenever a binding of this block fires
    #[serde(default)]
    pub sensor: Option<String>,

    /// Rule templates expanded into the bindings (switches only)
    #[serde(default)]
    pub templates: Vec<Template>,

    #[serde(default)]
    pub bindings: BTreeMap<Code, Binding>,
}

/// Named sets of bindings shared between switches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Template {
    /// Continuous dimming on the brightness buttons of a dimmer switch
    Dimmer,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MotionBlock {
    pub name: String,

    #[serde(default)]
    pub group: Option<String>,

    /// Time without motion before dimming
    pub timeout: HmsDuration,

    /// Time spent dimmed before turning off
    pub dimtime: HmsDuration,

    #[serde(default)]
    pub contact: Option<String>,

    #[serde(default)]
    pub state: Option<String>,

    /// How long a manual action keeps the sensor suppressed
    #[serde(default)]
    pub suppress: Option<HmsDuration>,

    #[serde(default)]
    pub bindings: BTreeMap<Code, Binding>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ContactBlock {
    pub name: String,
    pub bindings: ContactBindings,
}

/// External input codes emitted when the door changes state.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ContactBindings {
    pub open: Code,
    pub closed: Code,
}

/// Right-hand side of a binding.
#[derive(Debug, Clone, PartialEq)]
pub enum Binding {
    /// Reuse the action bound to another code of the same block.
    AliasOf(Code),
    Action(Action),
}

impl<'de> Deserialize<'de> for Binding {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Alias(String),
            Table(toml::Table),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Alias(code) => Ok(Binding::AliasOf(Code(code))),
            Raw::Table(table) => Action::deserialize(toml::Value::Table(table))
                .map(Binding::Action)
                .map_err(|e| de::Error::custom(e.message())),
        }
    }
}

/// What happens when a binding fires.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Action {
    #[serde(flatten)]
    pub kind: ActionKind,

    /// Overrides the block's group
    #[serde(default)]
    pub group: Option<String>,

    /// Overrides the block's state
    #[serde(default)]
    pub state: Option<String>,

    #[serde(default)]
    pub state_use: Option<StateUse>,

    /// Overrides the block's suppressed motion sensor
    #[serde(default)]
    pub sensor: Option<SensorOverride>,
}

impl Action {
    pub fn new(kind: ActionKind) -> Self {
        Self {
            kind,
            group: None,
            state: None,
            state_use: None,
            sensor: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ActionKind {
    Scene(SceneAction),
    Light(LightAction),
    Off,
    Dim(DimAction),
    Redirect(RedirectAction),
}

impl ActionKind {
    pub fn type_name(&self) -> &'static str {
        match self {
            ActionKind::Scene(_) => "scene",
            ActionKind::Light(_) => "light",
            ActionKind::Off => "off",
            ActionKind::Dim(_) => "dim",
            ActionKind::Redirect(_) => "redirect",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SceneAction {
    /// Single scene to recall
    #[serde(default)]
    pub value: Option<String>,

    /// Scenes to cycle through
    #[serde(default)]
    pub configs: Vec<SceneConfig>,

    /// Default index into `configs` for a fresh cycle, by time of day
    #[serde(default)]
    pub times: BTreeMap<TimeWindow, usize>,
}

impl SceneAction {
    /// The scene configs this action selects from.
    pub fn effective_configs(&self) -> Vec<SceneConfig> {
        match (&self.value, self.configs.is_empty()) {
            (Some(scene), true) => vec![SceneConfig::named(scene)],
            _ => self.configs.clone(),
        }
    }
}

/// Scene name recalled as "turn the group off".
pub const SCENE_OFF: &str = "off";

/// Scene name recalled as "step brightness by `value`".
pub const SCENE_DIM: &str = "dim";

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SceneConfig {
    pub scene: String,

    /// Revert to the default config after this long
    #[serde(default)]
    pub timeout: Option<HmsDuration>,

    /// Brightness delta applied with the scene
    #[serde(default)]
    pub value: Option<i16>,
}

impl SceneConfig {
    pub fn named(scene: &str) -> Self {
        Self {
            scene: scene.to_string(),
            timeout: None,
            value: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LightOp {
    On,
    Off,
    Toggle,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct LightAction {
    pub light: String,
    pub action: LightOp,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DimAction {
    pub value: i16,

    /// Transition time in tenths of a second
    #[serde(default)]
    pub tt: Option<u16>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RedirectAction {
    pub value: Code,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StateUse {
    #[default]
    Primary,
    Secondary,
}

impl StateUse {
    /// Zero-based counter slot.
    pub fn slot(self) -> usize {
        match self {
            StateUse::Primary => 0,
            StateUse::Secondary => 1,
        }
    }
}

/// Per-action override of the suppressed motion sensor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SensorOverride {
    Use(String),
    /// `sensor = false`: do not suppress even if the block names a sensor
    Disable,
}

impl<'de> Deserialize<'de> for SensorOverride {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct SensorVisitor;

        impl de::Visitor<'_> for SensorVisitor {
            type Value = SensorOverride;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a motion sensor name or `false`")
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<SensorOverride, E> {
                Ok(SensorOverride::Use(v.to_string()))
            }

            fn visit_bool<E: de::Error>(self, v: bool) -> Result<SensorOverride, E> {
                if v {
                    Err(E::invalid_value(de::Unexpected::Bool(true), &self))
                } else {
                    Ok(SensorOverride::Disable)
                }
            }
        }

        deserializer.deserialize_any(SensorVisitor)
    }
}
