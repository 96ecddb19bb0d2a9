//! Reconciles compiled programs with the bridge.
//!
//! The synchronizer keeps a snapshot of the bridge's objects, read once on
//! [`Synchronizer::connect`] and updated with every write it makes. Each
//! [`Synchronizer::configure`] call compiles one room, links it against the
//! snapshot and then writes only what differs: sensors first, then
//! schedules, then rules.

use std::collections::BTreeSet;
use std::collections::HashSet;

use hueforge_config::Block;
use hueforge_config::Settings;
use serde_json::json;

mod link;
mod report;


pub use link::hub_name;
pub use link::ALL_LIGHTS;
use link::Linker;
pub use report::ConfigureReport;
pub use report::DriftReason;
pub use report::DriftWarning;
pub use report::ObjectRef;

use crate::compile::ir::Program;
use crate::compile::ir::SensorSpec;
use crate::compile::ir::VirtualKind;
use crate::compile::Compiler;
use crate::compile::PrettyPrint;
use crate::error::ConfigError;
use crate::error::SyncError;
use crate::hub::model::Rule;
use crate::hub::model::Schedule;
use crate::hub::model::MANUFACTURER;
use crate::hub::HubClient;
use crate::hub::HubError;
use crate::hub::HubState;
use crate::hub::ObjectKind;
use crate::hub::Sensor;

/// Model id of virtual sensors made by the engine.
const MODEL_ID: &str = "hueforge-virtual";
const SW_VERSION: &str = "1.0";

/// Unique id of a virtual sensor, stable across runs.
fn unique_id(name: &str) -> String {
    let hash = name
        .bytes()
        .fold(0xcbf2_9ce4_8422_2325_u64, |hash, b| {
            (hash ^ u64::from(b)).wrapping_mul(0x0000_0100_0000_01b3)
        });
    format!("hueforge-{:016x}", hash)
}

enum ApplyError {
    Link(ConfigError),
    Write {
        kind: ObjectKind,
        name: String,
        source: HubError,
    },
}

impl From<ConfigError> for ApplyError {
    fn from(err: ConfigError) -> Self {
        ApplyError::Link(err)
    }
}

/// Bridge names of everything compiled since connecting.
#[derive(Debug, Default)]
struct Compiled {
    sensors: HashSet<String>,
    schedules: HashSet<String>,
    rules: HashSet<String>,
}

pub struct Synchronizer<H> {
    hub: H,
    api_key: String,
    compiler: Compiler,
    snapshot: HubState,
    compiled: Compiled,
}

impl<H: HubClient> Synchronizer<H> {
    /// Read the bridge's objects and start with an empty registry.
    pub fn connect(mut hub: H, settings: &Settings) -> Result<Self, SyncError> {
        let snapshot = hub.fetch().map_err(SyncError::Fetch)?;
        tracing::info!(
            lights = snapshot.lights.len(),
            groups = snapshot.groups.len(),
            scenes = snapshot.scenes.len(),
            sensors = snapshot.sensors.len(),
            schedules = snapshot.schedules.len(),
            rules = snapshot.rules.len(),
            "read bridge"
        );
        Ok(Self {
            hub,
            api_key: settings.api_key.clone(),
            compiler: Compiler::new(&settings.external_sensor),
            snapshot,
            compiled: Compiled::default(),
        })
    }

    pub fn hub(&self) -> &H {
        &self.hub
    }

    pub fn hub_mut(&mut self) -> &mut H {
        &mut self.hub
    }

    pub fn snapshot(&self) -> &HubState {
        &self.snapshot
    }

    /// Compile the blocks of one room and bring the bridge in line with them.
    ///
    /// Configuration and link errors abort before anything is written. A
    /// failing write aborts the call; the error carries what was written
    /// until then.
    pub fn configure(
        &mut self,
        blocks: &[Block],
        label: &str,
    ) -> Result<ConfigureReport, SyncError> {
        let compilation = self.compiler.compile(blocks, label)?;
        Linker::new(&self.snapshot, label, &self.api_key).check(&compilation.program)?;
        let program = self.compiler.commit(compilation);
        tracing::trace!(program = %program.to_pretty_string(), "compiled");

        self.compiled
            .sensors
            .extend(program.sensors.iter().map(|s| link::shorten(&s.name)));
        self.compiled
            .schedules
            .extend(program.schedules.iter().map(|s| hub_name(label, &s.name)));
        self.compiled
            .rules
            .extend(program.rules.iter().map(|r| hub_name(label, &r.name)));

        let mut report = ConfigureReport::new(label);
        match self.apply(&program, &mut report) {
            Ok(()) => {
                tracing::info!(%report, "configured room");
                Ok(report)
            }
            Err(ApplyError::Link(err)) => Err(err.into()),
            Err(ApplyError::Write { kind, name, source }) => {
                tracing::error!(label, %kind, %name, error = %source, "write failed");
                Err(SyncError::Remote {
                    kind,
                    name,
                    source,
                    report: Box::new(report),
                })
            }
        }
    }

    fn apply(&mut self, program: &Program, report: &mut ConfigureReport) -> Result<(), ApplyError> {
        for sensor in &program.sensors {
            self.ensure_sensor(sensor, report)?;
        }

        let mut schedules = Vec::new();
        for spec in &program.schedules {
            let name = hub_name(&program.label, &spec.name);
            let command = Linker::new(&self.snapshot, &program.label, &self.api_key)
                .schedule_command(&spec.command)?;
            let desired = Schedule {
                name: name.clone(),
                description: MANUFACTURER.to_string(),
                command,
                localtime: Some(spec.timer.to_timer()),
                status: Some("disabled".to_string()),
                autodelete: Some(false),
                owner: None,
            };
            let id = self.ensure_schedule(desired, report)?;
            schedules.push((spec.name.as_str(), id));
        }

        let mut linker = Linker::new(&self.snapshot, &program.label, &self.api_key);
        for (local, id) in &schedules {
            linker.add_schedule(local, id);
        }
        let mut rules = Vec::new();
        for spec in &program.rules {
            rules.push(Rule {
                name: hub_name(&program.label, &spec.name),
                owner: None,
                status: None,
                conditions: spec
                    .conditions
                    .iter()
                    .map(|c| linker.condition(c))
                    .collect::<Result<_, _>>()?,
                actions: spec
                    .actions
                    .iter()
                    .map(|a| linker.command(a))
                    .collect::<Result<_, _>>()?,
            });
        }
        for rule in rules {
            self.ensure_rule(rule, report)?;
        }
        Ok(())
    }

    fn write_failed(kind: ObjectKind, name: &str) -> impl FnOnce(HubError) -> ApplyError + '_ {
        move |source| ApplyError::Write {
            kind,
            name: name.to_string(),
            source,
        }
    }

    fn ensure_sensor(
        &mut self,
        spec: &SensorSpec,
        report: &mut ConfigureReport,
    ) -> Result<(), ApplyError> {
        let name = link::shorten(&spec.name);
        let kind = spec.kind.hub_type();
        if self
            .snapshot
            .sensors
            .values()
            .any(|s| s.name == name && s.kind == kind)
        {
            report.unchanged += 1;
            return Ok(());
        }

        let sensor = Sensor {
            name: name.clone(),
            kind: kind.to_string(),
            modelid: Some(MODEL_ID.to_string()),
            manufacturername: Some(MANUFACTURER.to_string()),
            swversion: Some(SW_VERSION.to_string()),
            uniqueid: Some(unique_id(&name)),
            state: Default::default(),
        };
        let fail = Self::write_failed(ObjectKind::Sensor, &name);
        let body = serde_json::to_value(&sensor).map_err(|e| fail(e.into()))?;
        let id = self
            .hub
            .create(ObjectKind::Sensor, &body)
            .map_err(Self::write_failed(ObjectKind::Sensor, &name))?;
        tracing::debug!(%id, %name, "created sensor");
        report.created.push(ObjectRef {
            kind: ObjectKind::Sensor,
            name,
        });
        self.snapshot.sensors.insert(id, sensor);
        Ok(())
    }

    /// Create or update a schedule and return its id.
    fn ensure_schedule(
        &mut self,
        desired: Schedule,
        report: &mut ConfigureReport,
    ) -> Result<String, ApplyError> {
        let existing = self.snapshot.schedules.iter_mut().find(|(_, s)| {
            s.name == desired.name
                && (s.description == MANUFACTURER
                    || s.owner.as_deref() == Some(self.api_key.as_str()))
        });
        let object = ObjectRef {
            kind: ObjectKind::Schedule,
            name: desired.name.clone(),
        };

        if let Some((id, schedule)) = existing {
            if schedule.command == desired.command && schedule.description == desired.description {
                report.unchanged += 1;
                return Ok(id.clone());
            }
            let body = json!({
                "command": desired.command,
                "description": desired.description,
            });
            self.hub
                .update(ObjectKind::Schedule, id, &body)
                .map_err(Self::write_failed(ObjectKind::Schedule, &desired.name))?;
            tracing::debug!(%id, name = %desired.name, "updated schedule");
            schedule.command = desired.command;
            schedule.description = desired.description;
            report.updated.push(object);
            return Ok(id.clone());
        }

        let fail = Self::write_failed(ObjectKind::Schedule, &desired.name);
        let body = serde_json::to_value(&desired).map_err(|e| fail(e.into()))?;
        let id = self
            .hub
            .create(ObjectKind::Schedule, &body)
            .map_err(Self::write_failed(ObjectKind::Schedule, &desired.name))?;
        tracing::debug!(%id, name = %desired.name, "created schedule");
        report.created.push(object);
        self.snapshot.schedules.insert(
            id.clone(),
            Schedule {
                owner: Some(self.api_key.clone()),
                ..desired
            },
        );
        Ok(id)
    }

    fn ensure_rule(
        &mut self,
        desired: Rule,
        report: &mut ConfigureReport,
    ) -> Result<(), ApplyError> {
        let existing = self
            .snapshot
            .rules
            .iter_mut()
            .find(|(_, r)| {
                r.name == desired.name && r.owner.as_deref() == Some(self.api_key.as_str())
            });
        let object = ObjectRef {
            kind: ObjectKind::Rule,
            name: desired.name.clone(),
        };

        if let Some((id, rule)) = existing {
            if rule.conditions == desired.conditions
                && rule.actions == desired.actions
                && rule.is_enabled()
            {
                report.unchanged += 1;
                return Ok(());
            }
            let body = json!({
                "conditions": desired.conditions,
                "actions": desired.actions,
                "status": "enabled",
            });
            self.hub
                .update(ObjectKind::Rule, id, &body)
                .map_err(Self::write_failed(ObjectKind::Rule, &desired.name))?;
            tracing::debug!(%id, name = %desired.name, "updated rule");
            rule.conditions = desired.conditions;
            rule.actions = desired.actions;
            rule.status = Some("enabled".to_string());
            report.updated.push(object);
            return Ok(());
        }

        let fail = Self::write_failed(ObjectKind::Rule, &desired.name);
        let body = serde_json::to_value(&desired).map_err(|e| fail(e.into()))?;
        let id = self
            .hub
            .create(ObjectKind::Rule, &body)
            .map_err(Self::write_failed(ObjectKind::Rule, &desired.name))?;
        tracing::debug!(%id, name = %desired.name, "created rule");
        report.created.push(object);
        self.snapshot.rules.insert(
            id,
            Rule {
                owner: Some(self.api_key.clone()),
                status: Some("enabled".to_string()),
                ..desired
            },
        );
        Ok(())
    }

    /// Re-read the bridge's objects.
    pub fn refresh(&mut self) -> Result<(), SyncError> {
        self.snapshot = self.hub.fetch().map_err(SyncError::Fetch)?;
        Ok(())
    }

    /// Report objects neither made by this engine nor owned by a trusted key,
    /// and objects made by this engine that no room compiled.
    pub fn find_foreign_data(&self, trusted: &BTreeSet<String>) -> Vec<DriftWarning> {
        let ours = |owner: Option<&str>| owner == Some(self.api_key.as_str());
        let trusted = |owner: Option<&str>| owner.is_some_and(|o| trusted.contains(o));
        let reason = |mine: bool, compiled: bool, owner: Option<&str>| {
            if mine {
                (!compiled).then_some(DriftReason::Stale)
            } else if trusted(owner) {
                None
            } else {
                Some(DriftReason::Foreign)
            }
        };

        let mut warnings = Vec::new();
        let mut warn = |kind, id: &String, name: &String, owner: Option<&str>, reason| {
            warnings.push(DriftWarning {
                kind,
                id: id.clone(),
                name: name.clone(),
                owner: owner.map(str::to_string),
                reason,
            });
        };

        for (id, rule) in &self.snapshot.rules {
            let owner = rule.owner.as_deref();
            let compiled = self.compiled.rules.contains(&rule.name);
            if let Some(reason) = reason(ours(owner), compiled, owner) {
                warn(ObjectKind::Rule, id, &rule.name, owner, reason);
            }
        }
        for (id, schedule) in &self.snapshot.schedules {
            let owner = schedule.owner.as_deref();
            let mine = ours(owner) || schedule.description == MANUFACTURER;
            let compiled = self.compiled.schedules.contains(&schedule.name);
            if let Some(reason) = reason(mine, compiled, owner) {
                warn(ObjectKind::Schedule, id, &schedule.name, owner, reason);
            }
        }
        for (id, scene) in &self.snapshot.scenes {
            let owner = scene.owner.as_deref();
            if let Some(reason) = reason(ours(owner), true, owner) {
                warn(ObjectKind::Scene, id, &scene.name, owner, reason);
            }
        }
        for (id, sensor) in &self.snapshot.sensors {
            if sensor.is_engine_made() && !self.compiled.sensors.contains(&sensor.name) {
                warn(ObjectKind::Sensor, id, &sensor.name, None, DriftReason::Stale);
            }
        }

        for warning in &warnings {
            tracing::warn!(%warning, "unexpected object on bridge");
        }
        warnings
    }

    /// Current value of a counter or other status sensor made by the engine.
    pub fn read_counter(&mut self, name: &str) -> Result<Option<i64>, SyncError> {
        let name = link::shorten(name);
        let Some(id) = self
            .snapshot
            .sensors
            .iter()
            .find(|(_, s)| s.name == name && s.kind == VirtualKind::Status.hub_type())
            .map(|(id, _)| id.clone())
        else {
            return Ok(None);
        };
        let sensor = self.hub.read_sensor(&id).map_err(SyncError::Fetch)?;
        Ok(sensor.status())
    }
}
