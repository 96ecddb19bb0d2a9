use serde_json::Value;

use super::HubClient;
use super::HubError;
use super::HubState;
use super::ObjectKind;
use super::Sensor;

/// Reads from the wrapped bridge but only logs writes.
pub struct DryRun<H> {
    inner: H,
    created: usize,
    pub writes: usize,
}

impl<H: HubClient> DryRun<H> {
    pub fn new(inner: H) -> Self {
        Self {
            inner,
            created: 0,
            writes: 0,
        }
    }
}

impl<H: HubClient> HubClient for DryRun<H> {
    fn fetch(&mut self) -> Result<HubState, HubError> {
        self.inner.fetch()
    }

    fn create(&mut self, kind: ObjectKind, body: &Value) -> Result<String, HubError> {
        self.created += 1;
        self.writes += 1;
        tracing::info!(%kind, %body, "dry run: would create");
        Ok(format!("dry-run-{}", self.created))
    }

    fn update(&mut self, kind: ObjectKind, id: &str, body: &Value) -> Result<(), HubError> {
        self.writes += 1;
        tracing::info!(%kind, id, %body, "dry run: would update");
        Ok(())
    }

    fn delete(&mut self, kind: ObjectKind, id: &str) -> Result<(), HubError> {
        self.writes += 1;
        tracing::info!(%kind, id, "dry run: would delete");
        Ok(())
    }

    fn read_sensor(&mut self, id: &str) -> Result<Sensor, HubError> {
        self.inner.read_sensor(id)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::hub::sim::SimHub;

    #[test]
    fn test_writes_are_counted_not_sent() {
        let mut sim = SimHub::new("key");
        let switch = sim.add_switch("Bad switch");
        let mut hub = DryRun::new(&mut sim);

        let rule = json!({ "name": "r", "conditions": [], "actions": [] });
        assert_eq!(hub.create(ObjectKind::Rule, &rule).unwrap(), "dry-run-1");
        hub.update(ObjectKind::Sensor, &switch, &json!({ "name": "x" }))
            .unwrap();
        assert_eq!(hub.writes, 2);
        assert_eq!(hub.read_sensor(&switch).unwrap().name, "Bad switch");

        assert_eq!(sim.writes, 0);
        assert!(sim.state().rules.is_empty());
    }
}
