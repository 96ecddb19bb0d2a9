//! In-process bridge that stores objects and runs rules and schedules.
//!
//! Time is virtual: it only moves in [`SimHub::advance`]. Every write to a
//! sensor, light or schedule is an event; rules are evaluated against the
//! state before any of their actions run, and the writes of their actions
//! become new events.

use std::collections::BTreeSet;
use std::collections::HashMap;
use std::collections::VecDeque;

use chrono::Duration;
use chrono::NaiveTime;
use hueforge_config::TimeWindow;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::json;
use serde_json::Value;

use super::model::id_order;
use super::model::Group;
use super::model::Light;
use super::model::Operator;
use super::model::Rule;
use super::model::Scene;
use super::model::Schedule;
use super::HubClient;
use super::HubError;
use super::HubState;
use super::ObjectKind;
use super::Sensor;

const MAX_EVENTS: usize = 10_000;

#[derive(Debug, Default)]
struct Event {
    /// Attribute addresses whose value changed
    changed: BTreeSet<String>,
    /// Attribute whose `ddx` timer expired
    stable: Option<String>,
}

#[derive(Debug, Clone)]
enum TimerKind {
    Stable { address: String, armed_at: u64 },
    Schedule { id: String, generation: u64 },
}

#[derive(Debug, Clone)]
struct Timer {
    due: u64,
    kind: TimerKind,
}

fn parse_timer(localtime: &str) -> Option<u64> {
    let hms = localtime.strip_prefix("PT")?;
    let time = NaiveTime::parse_from_str(hms, "%H:%M:%S").ok()?;
    Some(time.signed_duration_since(NaiveTime::MIN).num_seconds() as u64)
}

fn merge<T: Serialize + DeserializeOwned>(object: &mut T, body: &Value) -> Result<(), HubError> {
    let mut value = serde_json::to_value(&*object)?;
    if let (Some(target), Some(changes)) = (value.as_object_mut(), body.as_object()) {
        for (key, change) in changes {
            target.insert(key.clone(), change.clone());
        }
    }
    *object = serde_json::from_value(value)?;
    Ok(())
}

pub struct SimHub {
    key: String,
    state: HubState,
    next_id: usize,
    /// Creates, updates and deletes made through [`HubClient`]
    pub writes: usize,
    fail_on: Option<String>,
    start: NaiveTime,
    now: u64,
    changed_at: HashMap<String, u64>,
    timers: Vec<Timer>,
    generations: HashMap<String, u64>,
    queue: VecDeque<Event>,
    effects: Vec<String>,
}

impl SimHub {
    pub fn new(key: &str) -> Self {
        Self {
            key: key.to_string(),
            state: HubState::default(),
            next_id: 1,
            writes: 0,
            fail_on: None,
            start: NaiveTime::MIN,
            now: 0,
            changed_at: HashMap::new(),
            timers: Vec::new(),
            generations: HashMap::new(),
            queue: VecDeque::new(),
            effects: Vec::new(),
        }
    }

    /// Start the clock at `hour:minute`.
    pub fn at(mut self, hour: u32, minute: u32) -> Self {
        self.start = NaiveTime::from_hms_opt(hour, minute, 0).unwrap();
        self
    }

    /// Reject writes to the object called `name`.
    pub fn fail_on(&mut self, name: &str) {
        self.fail_on = Some(name.to_string());
    }

    fn id(&mut self) -> String {
        let id = self.next_id.to_string();
        self.next_id += 1;
        id
    }

    pub fn state(&self) -> &HubState {
        &self.state
    }

    pub fn add_light(&mut self, name: &str) -> String {
        let id = self.id();
        let light = Light {
            name: name.to_string(),
            state: json!({ "on": false }).as_object().cloned().unwrap(),
        };
        self.state.lights.insert(id.clone(), light);
        id
    }

    pub fn add_group(&mut self, name: &str, lights: &[&str]) -> String {
        let id = self.id();
        let group = Group {
            name: name.to_string(),
            lights: lights.iter().map(|l| l.to_string()).collect(),
            kind: Some("Room".to_string()),
        };
        self.state.groups.insert(id.clone(), group);
        id
    }

    /// Add a group with one light of the same name and the given scenes.
    pub fn add_room(&mut self, name: &str, scenes: &[&str]) -> String {
        let light = self.add_light(name);
        let gid = self.add_group(name, &[&light]);
        for scene in scenes {
            self.add_scene(scene, &gid, "app");
        }
        gid
    }

    /// Add a group scene owned by `owner`.
    pub fn add_scene(&mut self, name: &str, group: &str, owner: &str) -> String {
        let id = format!("scene{}", self.id());
        let lights = self.state.groups[group].lights.clone();
        let scene = Scene {
            name: name.to_string(),
            kind: Some("GroupScene".to_string()),
            group: Some(group.to_string()),
            lights,
            owner: Some(owner.to_string()),
        };
        self.state.scenes.insert(id.clone(), scene);
        id
    }

    fn add_sensor(&mut self, name: &str, kind: &str, state: Value) -> String {
        let id = self.id();
        let sensor = Sensor {
            name: name.to_string(),
            kind: kind.to_string(),
            modelid: None,
            manufacturername: None,
            swversion: None,
            uniqueid: None,
            state: state.as_object().cloned().unwrap(),
        };
        self.state.sensors.insert(id.clone(), sensor);
        id
    }

    pub fn add_switch(&mut self, name: &str) -> String {
        self.add_sensor(name, "ZGPSwitch", json!({ "buttonevent": 0, "lastupdated": "0" }))
    }

    pub fn add_presence(&mut self, name: &str) -> String {
        self.add_sensor(name, "ZLLPresence", json!({ "presence": false, "lastupdated": "0" }))
    }

    pub fn add_rule(&mut self, name: &str, owner: &str) -> String {
        let id = self.id();
        let rule = Rule {
            name: name.to_string(),
            owner: Some(owner.to_string()),
            status: Some("enabled".to_string()),
            conditions: Vec::new(),
            actions: Vec::new(),
        };
        self.state.rules.insert(id.clone(), rule);
        id
    }

    pub fn sensor_id(&self, name: &str) -> String {
        self.state
            .sensors
            .iter()
            .find(|(_, s)| s.name == name)
            .map(|(id, _)| id.clone())
            .unwrap_or_else(|| panic!("no sensor '{}'", name))
    }

    pub fn status(&self, sensor: &str) -> Option<i64> {
        self.state.sensors[&self.sensor_id(sensor)].status()
    }

    pub fn flag(&self, sensor: &str) -> Option<bool> {
        self.state.sensors[&self.sensor_id(sensor)]
            .state
            .get("flag")
            .and_then(Value::as_bool)
    }

    /// Effects on lights since the last call, e.g. `Küche: scene Tag`.
    pub fn take_effects(&mut self) -> Vec<String> {
        std::mem::take(&mut self.effects)
    }

    pub fn time(&self) -> NaiveTime {
        self.start + Duration::seconds(self.now as i64)
    }

    // =========================================================================
    // Inputs
    // =========================================================================

    pub fn press(&mut self, switch: &str, event: i64) {
        let id = self.sensor_id(switch);
        self.write_sensor(&id, &json!({ "buttonevent": event }));
        self.run();
    }

    pub fn presence(&mut self, sensor: &str, present: bool) {
        let id = self.sensor_id(sensor);
        self.write_sensor(&id, &json!({ "presence": present }));
        self.run();
    }

    /// Write an event code into a status sensor, as an external gateway does.
    pub fn external(&mut self, sensor: &str, code: i64) {
        let id = self.sensor_id(sensor);
        self.write_sensor(&id, &json!({ "status": code }));
        self.run();
    }

    /// Move the clock forward, firing timers in order.
    pub fn advance(&mut self, secs: u64) {
        let until = self.now + secs;
        loop {
            let next = self
                .timers
                .iter()
                .enumerate()
                .filter(|(_, t)| t.due <= until)
                .min_by_key(|(_, t)| t.due)
                .map(|(i, _)| i);
            let Some(index) = next else {
                break;
            };
            let timer = self.timers.remove(index);
            self.now = timer.due;
            self.fire(timer.kind);
            self.run();
        }
        self.now = until;
    }

    fn fire(&mut self, timer: TimerKind) {
        match timer {
            TimerKind::Stable { address, armed_at } => {
                if self.changed_at.get(&address) == Some(&armed_at) {
                    self.queue.push_back(Event {
                        changed: BTreeSet::new(),
                        stable: Some(address),
                    });
                }
            }
            TimerKind::Schedule { id, generation } => {
                if self.generations.get(&id) != Some(&generation) {
                    return;
                }
                let Some(schedule) = self.state.schedules.get_mut(&id) else {
                    return;
                };
                schedule.status = Some("disabled".to_string());
                let command = schedule.command.clone();
                let prefix = format!("/api/{}", self.key);
                let address = command
                    .address
                    .strip_prefix(&prefix)
                    .unwrap_or(&command.address);
                self.execute(address, &command.body);
            }
        }
    }

    // =========================================================================
    // State changes
    // =========================================================================

    fn touch(&mut self, changed: &mut BTreeSet<String>, address: String) {
        self.changed_at.insert(address.clone(), self.now);
        let delays: BTreeSet<u64> = self
            .state
            .rules
            .values()
            .filter(|r| r.is_enabled())
            .flat_map(|r| &r.conditions)
            .filter(|c| c.operator == Operator::Ddx && c.address == address)
            .filter_map(|c| c.value.as_deref().and_then(parse_timer))
            .collect();
        for delay in delays {
            self.timers.push(Timer {
                due: self.now + delay,
                kind: TimerKind::Stable {
                    address: address.clone(),
                    armed_at: self.now,
                },
            });
        }
        changed.insert(address);
    }

    fn write_sensor(&mut self, id: &str, body: &Value) {
        let Some(values) = body.as_object() else {
            return;
        };
        let mut changed = BTreeSet::new();
        for (key, value) in values {
            let Some(sensor) = self.state.sensors.get_mut(id) else {
                return;
            };
            if sensor.state.get(key) != Some(value) {
                sensor.state.insert(key.clone(), value.clone());
                self.touch(&mut changed, format!("/sensors/{}/state/{}", id, key));
            }
        }
        if let Some(sensor) = self.state.sensors.get_mut(id) {
            sensor
                .state
                .insert("lastupdated".to_string(), json!(self.now.to_string()));
        }
        self.touch(&mut changed, format!("/sensors/{}/state/lastupdated", id));
        self.queue.push_back(Event {
            changed,
            stable: None,
        });
    }

    fn write_light(&mut self, id: &str, on: bool) {
        let Some(light) = self.state.lights.get_mut(id) else {
            return;
        };
        if light.state.get("on") == Some(&json!(on)) {
            return;
        }
        light.state.insert("on".to_string(), json!(on));
        let mut changed = BTreeSet::new();
        self.touch(&mut changed, format!("/lights/{}/state/on", id));
        self.queue.push_back(Event {
            changed,
            stable: None,
        });
    }

    fn group_action(&mut self, gid: &str, body: &Value) {
        let (name, lights) = if gid == "0" {
            ("All Lights".to_string(), self.state.lights.keys().cloned().collect())
        } else {
            match self.state.groups.get(gid) {
                Some(group) => (group.name.clone(), group.lights.clone()),
                None => return,
            }
        };
        if let Some(scene) = body.get("scene").and_then(Value::as_str) {
            let scene = self
                .state
                .scenes
                .get(scene)
                .map(|s| s.name.clone())
                .unwrap_or_else(|| scene.to_string());
            self.effects.push(format!("{}: scene {}", name, scene));
            for light in &lights {
                self.write_light(light, true);
            }
        }
        if body.get("on") == Some(&json!(false)) {
            self.effects.push(format!("{}: off", name));
            for light in &lights {
                self.write_light(light, false);
            }
        }
        if let Some(step) = body.get("bri_inc") {
            self.effects.push(format!("{}: bri_inc {}", name, step));
        }
    }

    fn update_schedule(&mut self, id: &str, body: &Value) -> Result<(), HubError> {
        let schedule = self
            .state
            .schedules
            .get_mut(id)
            .ok_or_else(|| HubError::NotFound {
                kind: ObjectKind::Schedule,
                id: id.to_string(),
            })?;
        merge(schedule, body)?;
        if body.get("status").is_none() && body.get("localtime").is_none() {
            return Ok(());
        }

        let generation = self.generations.entry(id.to_string()).or_default();
        *generation += 1;
        let generation = *generation;
        if schedule.status.as_deref() == Some("enabled") {
            if let Some(delay) = schedule.localtime.as_deref().and_then(parse_timer) {
                self.timers.push(Timer {
                    due: self.now + delay,
                    kind: TimerKind::Schedule {
                        id: id.to_string(),
                        generation,
                    },
                });
            }
        }
        Ok(())
    }

    /// Run a rule action or schedule command.
    fn execute(&mut self, address: &str, body: &Value) {
        let parts: Vec<&str> = address.trim_start_matches('/').split('/').collect();
        match parts.as_slice() {
            ["sensors", id, "state"] => self.write_sensor(id, body),
            ["groups", id, "action"] => self.group_action(id, body),
            ["lights", id, "state"] => {
                if let Some(on) = body.get("on").and_then(Value::as_bool) {
                    let name = self.state.lights.get(*id).map(|l| l.name.clone());
                    if let Some(name) = name {
                        self.effects
                            .push(format!("{}: {}", name, if on { "on" } else { "off" }));
                    }
                    self.write_light(id, on);
                }
            }
            ["schedules", id] => {
                let _ = self.update_schedule(id, body);
            }
            _ => panic!("simulator cannot execute {}", address),
        }
    }

    // =========================================================================
    // Rule engine
    // =========================================================================

    fn attribute(&self, address: &str) -> Option<Value> {
        let parts: Vec<&str> = address.trim_start_matches('/').split('/').collect();
        match parts.as_slice() {
            ["sensors", id, "state", key] => self.state.sensors.get(*id)?.state.get(*key).cloned(),
            ["lights", id, "state", key] => self.state.lights.get(*id)?.state.get(*key).cloned(),
            _ => None,
        }
    }

    fn holds(&self, condition: &super::model::Condition, event: &Event) -> bool {
        let value = condition.value.as_deref().unwrap_or_default();
        match condition.operator {
            Operator::Dx => event.changed.contains(&condition.address),
            Operator::Ddx => event.stable.as_deref() == Some(condition.address.as_str()),
            Operator::In => {
                condition.address == "/config/localtime"
                    && value
                        .parse::<TimeWindow>()
                        .is_ok_and(|w| w.contains(self.time()))
            }
            Operator::Eq => match self.attribute(&condition.address) {
                Some(Value::Bool(b)) => b.to_string() == value,
                Some(Value::Number(n)) => {
                    n.as_i64().map(|n| n.to_string()).as_deref() == Some(value)
                }
                Some(Value::String(s)) => s == value,
                _ => false,
            },
            Operator::Gt | Operator::Lt => {
                let Some(actual) = self
                    .attribute(&condition.address)
                    .and_then(|v| v.as_i64())
                else {
                    return false;
                };
                let Ok(expected) = value.parse::<i64>() else {
                    return false;
                };
                if condition.operator == Operator::Gt {
                    actual > expected
                } else {
                    actual < expected
                }
            }
        }
    }

    fn triggered(&self, rule: &Rule, event: &Event) -> bool {
        let has_event_condition = rule
            .conditions
            .iter()
            .any(|c| matches!(c.operator, Operator::Dx | Operator::Ddx));
        let touched = rule
            .conditions
            .iter()
            .any(|c| event.changed.contains(&c.address));
        rule.is_enabled()
            && (has_event_condition || touched)
            && rule.conditions.iter().all(|c| self.holds(c, event))
    }

    /// Process queued events until the bridge is quiet.
    fn run(&mut self) {
        let mut processed = 0;
        while let Some(event) = self.queue.pop_front() {
            processed += 1;
            assert!(processed < MAX_EVENTS, "rules do not settle");

            let mut ids: Vec<&String> = self.state.rules.keys().collect();
            ids.sort_by(|a, b| id_order(a, b));
            let fired: Vec<Rule> = ids
                .into_iter()
                .map(|id| &self.state.rules[id])
                .filter(|rule| self.triggered(rule, &event))
                .cloned()
                .collect();
            for rule in fired {
                for action in &rule.actions {
                    self.execute(&action.address, &action.body);
                }
            }
        }
    }

    fn check_failure(&self, body: &Value) -> Result<(), HubError> {
        let name = body.get("name").and_then(Value::as_str);
        if name.is_some() && name == self.fail_on.as_deref() {
            return Err(HubError::Api {
                address: "/".to_string(),
                description: "internal error, 404".to_string(),
            });
        }
        Ok(())
    }

    fn object_name(&self, kind: ObjectKind, id: &str) -> Option<&str> {
        match kind {
            ObjectKind::Sensor => self.state.sensors.get(id).map(|s| s.name.as_str()),
            ObjectKind::Schedule => self.state.schedules.get(id).map(|s| s.name.as_str()),
            ObjectKind::Rule => self.state.rules.get(id).map(|r| r.name.as_str()),
            _ => None,
        }
    }
}

impl HubClient for SimHub {
    fn fetch(&mut self) -> Result<HubState, HubError> {
        Ok(self.state.clone())
    }

    fn create(&mut self, kind: ObjectKind, body: &Value) -> Result<String, HubError> {
        self.check_failure(body)?;
        self.writes += 1;
        let id = self.id();
        match kind {
            ObjectKind::Sensor => {
                let mut sensor: Sensor = serde_json::from_value(body.clone())?;
                let initial = match sensor.kind.as_str() {
                    "CLIPGenericFlag" => json!({ "flag": false, "lastupdated": "none" }),
                    _ => json!({ "status": 0, "lastupdated": "none" }),
                };
                if let Some(initial) = initial.as_object() {
                    sensor.state = initial.clone();
                }
                self.state.sensors.insert(id.clone(), sensor);
            }
            ObjectKind::Schedule => {
                let mut schedule: Schedule = serde_json::from_value(body.clone())?;
                schedule.owner = Some(self.key.clone());
                self.state.schedules.insert(id.clone(), schedule);
            }
            ObjectKind::Rule => {
                let mut rule: Rule = serde_json::from_value(body.clone())?;
                rule.owner = Some(self.key.clone());
                rule.status.get_or_insert_with(|| "enabled".to_string());
                self.state.rules.insert(id.clone(), rule);
            }
            ObjectKind::Light | ObjectKind::Group | ObjectKind::Scene => {
                return Err(HubError::Api {
                    address: format!("/{}", kind.collection()),
                    description: "not supported by the simulator".to_string(),
                })
            }
        }
        Ok(id)
    }

    fn update(&mut self, kind: ObjectKind, id: &str, body: &Value) -> Result<(), HubError> {
        if let Some(name) = self.object_name(kind, id) {
            self.check_failure(&json!({ "name": name }))?;
        }
        self.writes += 1;
        let not_found = || HubError::NotFound {
            kind,
            id: id.to_string(),
        };
        match kind {
            ObjectKind::Rule => merge(self.state.rules.get_mut(id).ok_or_else(not_found)?, body),
            ObjectKind::Schedule => self.update_schedule(id, body),
            ObjectKind::Sensor => {
                let sensor = self.state.sensors.get_mut(id).ok_or_else(not_found)?;
                merge(sensor, body)
            }
            _ => Err(not_found()),
        }
    }

    fn delete(&mut self, kind: ObjectKind, id: &str) -> Result<(), HubError> {
        self.writes += 1;
        let removed = match kind {
            ObjectKind::Rule => self.state.rules.remove(id).is_some(),
            ObjectKind::Schedule => self.state.schedules.remove(id).is_some(),
            ObjectKind::Sensor => self.state.sensors.remove(id).is_some(),
            ObjectKind::Scene => self.state.scenes.remove(id).is_some(),
            ObjectKind::Light | ObjectKind::Group => false,
        };
        if removed {
            Ok(())
        } else {
            Err(HubError::NotFound {
                kind,
                id: id.to_string(),
            })
        }
    }

    fn read_sensor(&mut self, id: &str) -> Result<Sensor, HubError> {
        self.state
            .sensors
            .get(id)
            .cloned()
            .ok_or_else(|| HubError::NotFound {
                kind: ObjectKind::Sensor,
                id: id.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schedule_fires_once_after_timer() {
        let mut hub = SimHub::new("key");
        let sensor = hub.add_sensor("Counter", "CLIPGenericStatus", json!({ "status": 0 }));
        let id = hub
            .create(
                ObjectKind::Schedule,
                &json!({
                    "name": "revert",
                    "command": { "address": format!("/api/key/sensors/{}/state", sensor), "method": "PUT", "body": { "status": -1 } },
                    "localtime": "PT00:00:10",
                    "status": "disabled",
                }),
            )
            .unwrap();

        hub.execute(
            &format!("/schedules/{}", id),
            &json!({ "status": "enabled", "localtime": "PT00:00:10" }),
        );
        hub.advance(9);
        assert_eq!(hub.status("Counter"), Some(0));
        hub.advance(1);
        assert_eq!(hub.status("Counter"), Some(-1));
        assert_eq!(hub.state.schedules[&id].status.as_deref(), Some("disabled"));
    }

    #[test]
    fn test_restarting_schedule_cancels_pending_timer() {
        let mut hub = SimHub::new("key");
        let sensor = hub.add_sensor("Counter", "CLIPGenericStatus", json!({ "status": 0 }));
        let id = hub
            .create(
                ObjectKind::Schedule,
                &json!({
                    "name": "revert",
                    "command": { "address": format!("/api/key/sensors/{}/state", sensor), "method": "PUT", "body": { "status": -1 } },
                    "localtime": "PT00:00:10",
                    "status": "disabled",
                }),
            )
            .unwrap();
        let enable = json!({ "status": "enabled", "localtime": "PT00:00:10" });

        hub.execute(&format!("/schedules/{}", id), &enable);
        hub.advance(5);
        hub.execute(&format!("/schedules/{}", id), &enable);
        hub.advance(5);
        assert_eq!(hub.status("Counter"), Some(0));
        hub.advance(5);
        assert_eq!(hub.status("Counter"), Some(-1));
    }
}
