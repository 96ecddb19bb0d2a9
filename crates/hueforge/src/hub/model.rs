//! Hue v1 object model.
//!
//! Only the attributes the engine reads or writes are modelled. Everything
//! else the bridge returns is ignored on deserialization.

use std::collections::BTreeMap;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Map;
use serde_json::Value;

/// Manufacturer marker on virtual sensors created by the engine.
pub const MANUFACTURER: &str = "hueforge";

/// Maximum length of an object name on the bridge.
pub const MAX_NAME_LEN: usize = 32;

/// Maximum number of conditions and of actions in one rule.
pub const MAX_RULE_ITEMS: usize = 8;

/// Collections of the bridge REST API.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, strum::Display, strum::AsRefStr,
)]
#[strum(serialize_all = "lowercase")]
pub enum ObjectKind {
    Light,
    Group,
    Scene,
    Sensor,
    Schedule,
    Rule,
}

impl ObjectKind {
    /// Path segment of the collection, e.g. `rules`.
    pub fn collection(self) -> &'static str {
        match self {
            ObjectKind::Light => "lights",
            ObjectKind::Group => "groups",
            ObjectKind::Scene => "scenes",
            ObjectKind::Sensor => "sensors",
            ObjectKind::Schedule => "schedules",
            ObjectKind::Rule => "rules",
        }
    }
}

/// Full object set of a bridge, as returned by `GET /api/<key>`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HubState {
    #[serde(default)]
    pub lights: BTreeMap<String, Light>,
    #[serde(default)]
    pub groups: BTreeMap<String, Group>,
    #[serde(default)]
    pub scenes: BTreeMap<String, Scene>,
    #[serde(default)]
    pub sensors: BTreeMap<String, Sensor>,
    #[serde(default)]
    pub schedules: BTreeMap<String, Schedule>,
    #[serde(default)]
    pub rules: BTreeMap<String, Rule>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Light {
    pub name: String,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub state: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Group {
    pub name: String,
    #[serde(default)]
    pub lights: Vec<String>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scene {
    pub name: String,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    /// Owning group of a `GroupScene`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
    #[serde(default)]
    pub lights: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sensor {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modelid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manufacturername: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub swversion: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uniqueid: Option<String>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub state: Map<String, Value>,
}

impl Sensor {
    /// Whether the engine created this sensor.
    pub fn is_engine_made(&self) -> bool {
        self.manufacturername.as_deref() == Some(MANUFACTURER)
    }

    pub fn status(&self) -> Option<i64> {
        self.state.get("status").and_then(Value::as_i64)
    }
}

/// Request issued by a rule action or a schedule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Command {
    pub address: String,
    pub method: String,
    pub body: Value,
}

impl Command {
    pub fn put(address: impl Into<String>, body: Value) -> Self {
        Self {
            address: address.into(),
            method: "PUT".to_string(),
            body,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Schedule {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub command: Command,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub localtime: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub autodelete: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
}

/// Rule condition operators understood by the bridge.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Operator {
    Eq,
    Gt,
    Lt,
    /// Attribute changed
    Dx,
    /// Attribute changed and stayed unchanged for the given duration
    Ddx,
    /// Time of day inside a window
    In,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    pub address: String,
    pub operator: Operator,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    pub conditions: Vec<Condition>,
    pub actions: Vec<Command>,
}

impl Rule {
    pub fn is_enabled(&self) -> bool {
        self.status.as_deref().is_none_or(|s| s == "enabled")
    }
}

/// Bridge ids are decimal strings; order them numerically.
pub fn id_order(a: &str, b: &str) -> std::cmp::Ordering {
    (a.len(), a).cmp(&(b.len(), b))
}
