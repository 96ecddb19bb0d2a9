//! Access to the bridge.
//!
//! The engine talks to the bridge only through [`HubClient`], so tests can run
//! compiled rules against the in-process simulator instead of real hardware.

mod dry_run;
mod http;
pub mod model;
#[cfg(test)]
pub(crate) mod sim;

use serde_json::Value;

pub use dry_run::DryRun;
pub use http::HttpHub;
pub use model::HubState;
pub use model::ObjectKind;
pub use model::Sensor;

#[derive(Debug, thiserror::Error)]
pub enum HubError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("bridge answered with HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("bridge rejected {address}: {description}")]
    Api {
        address: String,
        description: String,
    },

    #[error("unexpected response from bridge: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("bridge response carried no object id")]
    MissingId,

    #[error("{kind} {id} does not exist")]
    NotFound { kind: ObjectKind, id: String },
}

/// Operations the engine needs from a bridge.
pub trait HubClient {
    /// Read every light, group, scene, sensor, schedule and rule.
    fn fetch(&mut self) -> Result<HubState, HubError>;

    /// Create an object and return its id.
    fn create(&mut self, kind: ObjectKind, body: &Value) -> Result<String, HubError>;

    /// Change attributes of an existing object.
    fn update(&mut self, kind: ObjectKind, id: &str, body: &Value) -> Result<(), HubError>;

    fn delete(&mut self, kind: ObjectKind, id: &str) -> Result<(), HubError>;

    /// Read the current value of one sensor.
    fn read_sensor(&mut self, id: &str) -> Result<Sensor, HubError>;
}

impl<H: HubClient + ?Sized> HubClient for &mut H {
    fn fetch(&mut self) -> Result<HubState, HubError> {
        (**self).fetch()
    }

    fn create(&mut self, kind: ObjectKind, body: &Value) -> Result<String, HubError> {
        (**self).create(kind, body)
    }

    fn update(&mut self, kind: ObjectKind, id: &str, body: &Value) -> Result<(), HubError> {
        (**self).update(kind, id, body)
    }

    fn delete(&mut self, kind: ObjectKind, id: &str) -> Result<(), HubError> {
        (**self).delete(kind, id)
    }

    fn read_sensor(&mut self, id: &str) -> Result<Sensor, HubError> {
        (**self).read_sensor(id)
    }
}
