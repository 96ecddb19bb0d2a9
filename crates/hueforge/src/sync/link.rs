//! Resolution of symbolic names to bridge ids.

use std::collections::HashMap;

use serde_json::json;

use crate::compile::ir::ActionSpec;
use crate::compile::ir::Address;
use crate::compile::ir::Body;
use crate::compile::ir::CondSpec;
use crate::compile::ir::Program;
use crate::compile::ir::ScheduleRef;
use crate::compile::ir::SensorRef;
use crate::compile::ir::Target;
use crate::compile::ir::VirtualKind;
use crate::error::ConfigError;
use crate::hub::model::Command;
use crate::hub::model::Condition;
use crate::hub::model::MAX_NAME_LEN;
use crate::hub::HubState;
use crate::hub::ObjectKind;

/// Group containing every light; not listed by the bridge.
pub const ALL_LIGHTS: &str = "All Lights";

fn fnv1a(bytes: &[u8]) -> u32 {
    bytes.iter().fold(0x811c_9dc5, |hash, &b| {
        (hash ^ u32::from(b)).wrapping_mul(0x0100_0193)
    })
}

/// Fit a name into the bridge's limit, keeping it unique with a hash of
/// the full name.
pub fn shorten(full: &str) -> String {
    if full.len() <= MAX_NAME_LEN {
        return full.to_string();
    }
    let suffix = format!("~{:04x}", fnv1a(full.as_bytes()) & 0xffff);
    let keep = MAX_NAME_LEN - suffix.len();
    let end = full
        .char_indices()
        .map(|(i, c)| i + c.len_utf8())
        .take_while(|&end| end <= keep)
        .last()
        .unwrap_or(0);
    format!("{}{}", &full[..end], suffix)
}

/// Bridge name of a rule or schedule of `label`.
pub fn hub_name(label: &str, local: &str) -> String {
    shorten(&format!("{}: {}", label, local))
}

pub struct Linker<'a> {
    snapshot: &'a HubState,
    label: &'a str,
    api_key: &'a str,
    /// Local schedule name to id
    schedules: HashMap<String, String>,
}

impl<'a> Linker<'a> {
    pub fn new(snapshot: &'a HubState, label: &'a str, api_key: &'a str) -> Self {
        Self {
            snapshot,
            label,
            api_key,
            schedules: HashMap::new(),
        }
    }

    pub fn add_schedule(&mut self, local: &str, id: &str) {
        self.schedules.insert(local.to_string(), id.to_string());
    }

    fn unknown(&self, kind: ObjectKind, name: impl Into<String>) -> ConfigError {
        ConfigError::UnknownReference {
            label: self.label.to_string(),
            kind,
            name: name.into(),
        }
    }

    fn sensor_id(&self, sensor: &SensorRef) -> Result<&'a str, ConfigError> {
        let sensors = &self.snapshot.sensors;
        let found = match sensor {
            SensorRef::Virtual(name) => {
                let name = shorten(name);
                sensors.iter().find(|(_, s)| {
                    s.name == name && VirtualKind::from_hub_type(&s.kind).is_some()
                })
            }
            SensorRef::Physical { name, kind } => sensors
                .iter()
                .find(|(_, s)| &s.name == name && kind.matches(&s.kind)),
        };
        found
            .map(|(id, _)| id.as_str())
            .ok_or_else(|| self.unknown(ObjectKind::Sensor, sensor.name()))
    }

    fn group_id(&self, name: &str) -> Result<&'a str, ConfigError> {
        if name == ALL_LIGHTS {
            return Ok("0");
        }
        self.snapshot
            .groups
            .iter()
            .find(|(_, g)| g.name == name)
            .map(|(id, _)| id.as_str())
            .ok_or_else(|| self.unknown(ObjectKind::Group, name))
    }

    fn light_id(&self, name: &str) -> Result<&'a str, ConfigError> {
        self.snapshot
            .lights
            .iter()
            .find(|(_, l)| l.name == name)
            .map(|(id, _)| id.as_str())
            .ok_or_else(|| self.unknown(ObjectKind::Light, name))
    }

    /// Scene `name` of a group: a scene of that group, or a light scene
    /// whose lights all belong to it. Any scene matches `All Lights`.
    fn scene_id(&self, group: &str, name: &str) -> Result<&'a str, ConfigError> {
        let gid = self.group_id(group)?;
        let scenes = || self.snapshot.scenes.iter().filter(move |(_, s)| s.name == name);
        let in_group = scenes().find(|(_, s)| s.group.as_deref() == Some(gid));
        let found = in_group.or_else(|| {
            if gid == "0" {
                return scenes().next();
            }
            let lights = &self.snapshot.groups.get(gid)?.lights;
            scenes().find(|(_, s)| {
                s.group.is_none()
                    && !s.lights.is_empty()
                    && s.lights.iter().all(|l| lights.contains(l))
            })
        });
        found
            .map(|(id, _)| id.as_str())
            .ok_or_else(|| self.unknown(ObjectKind::Scene, format!("{} in {}", name, group)))
    }

    fn schedule_id(&self, schedule: &ScheduleRef) -> Result<&str, ConfigError> {
        self.schedules
            .get(&schedule.name)
            .map(String::as_str)
            .ok_or_else(|| self.unknown(ObjectKind::Schedule, &schedule.name))
    }

    fn resource(&self, target: &Target) -> Result<String, ConfigError> {
        let (kind, id) = match target {
            Target::Sensor(sensor) => (ObjectKind::Sensor, self.sensor_id(sensor)?),
            Target::Group(group) => (ObjectKind::Group, self.group_id(group)?),
            Target::Light(light) => (ObjectKind::Light, self.light_id(light)?),
            Target::Schedule(schedule) => (ObjectKind::Schedule, self.schedule_id(schedule)?),
            Target::Config => return Ok("/config".to_string()),
        };
        Ok(format!("/{}/{}", kind.collection(), id))
    }

    fn address(&self, address: &Address) -> Result<String, ConfigError> {
        let resource = self.resource(&address.target)?;
        if address.path.is_empty() {
            Ok(resource)
        } else {
            Ok(format!("{}/{}", resource, address.path))
        }
    }

    pub fn condition(&self, condition: &CondSpec) -> Result<Condition, ConfigError> {
        Ok(Condition {
            address: self.address(&condition.address)?,
            operator: condition.op,
            value: condition.value.clone(),
        })
    }

    pub fn command(&self, action: &ActionSpec) -> Result<Command, ConfigError> {
        let body = match &action.body {
            Body::Json(body) => body.clone(),
            Body::Scene { group, scene } => json!({ "scene": self.scene_id(group, scene)? }),
        };
        Ok(Command::put(self.address(&action.address)?, body))
    }

    /// Schedules address the full API path, including the key.
    pub fn schedule_command(&self, action: &ActionSpec) -> Result<Command, ConfigError> {
        let mut command = self.command(action)?;
        command.address = format!("/api/{}{}", self.api_key, command.address);
        Ok(command)
    }

    /// Verify every bridge object the program refers to exists.
    ///
    /// Virtual sensors and schedules are created by the synchronizer and
    /// are not checked.
    pub fn check(&self, program: &Program) -> Result<(), ConfigError> {
        let actions = program
            .rules
            .iter()
            .flat_map(|r| &r.actions)
            .chain(program.schedules.iter().map(|s| &s.command));
        let addresses = program
            .rules
            .iter()
            .flat_map(|r| &r.conditions)
            .map(|c| &c.address)
            .chain(actions.clone().map(|a| &a.address));
        for address in addresses {
            match &address.target {
                Target::Sensor(SensorRef::Virtual(_)) | Target::Schedule(_) | Target::Config => {}
                target => {
                    self.resource(target)?;
                }
            }
        }
        for action in actions {
            if let Body::Scene { group, scene } = &action.body {
                self.scene_id(group, scene)?;
            }
        }
        Ok(())
    }
}
