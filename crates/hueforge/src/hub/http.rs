//! Blocking HTTP client for the Hue v1 REST API.

use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::blocking::RequestBuilder;
use serde::Deserialize;
use serde_json::Value;

use super::HubClient;
use super::HubError;
use super::HubState;
use super::ObjectKind;
use super::Sensor;

const TIMEOUT: Duration = Duration::from_secs(10);

pub struct HttpHub {
    client: Client,
    base_url: String,
}

impl HttpHub {
    /// `bridge` is a host name or address, optionally with a scheme.
    pub fn new(bridge: &str, api_key: &str) -> Result<Self, HubError> {
        let client = Client::builder().timeout(TIMEOUT).build()?;
        let bridge = bridge.trim_end_matches('/');
        let base_url = if bridge.starts_with("http://") || bridge.starts_with("https://") {
            format!("{}/api/{}", bridge, api_key)
        } else {
            format!("http://{}/api/{}", bridge, api_key)
        };
        Ok(Self { client, base_url })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn send(&self, request: RequestBuilder) -> Result<Value, HubError> {
        let response = request.send()?;
        let status = response.status();
        let body = response.text()?;
        if !status.is_success() {
            return Err(HubError::Status {
                status: status.as_u16(),
                body,
            });
        }
        let value: Value = serde_json::from_str(&body)?;
        check_errors(&value)?;
        Ok(value)
    }
}

/// One entry of the result array the bridge returns for writes.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "lowercase")]
enum ApiResult {
    Success(Value),
    Error(ApiError),
}

#[derive(Debug, Deserialize)]
struct ApiError {
    #[serde(default)]
    address: String,
    description: String,
}

/// The bridge reports failures inside a 200 response as `[{"error": ...}]`.
fn check_errors(value: &Value) -> Result<(), HubError> {
    let Some(results) = value.as_array() else {
        return Ok(());
    };
    for result in results {
        if let Ok(ApiResult::Error(error)) = ApiResult::deserialize(result) {
            return Err(HubError::Api {
                address: error.address,
                description: error.description,
            });
        }
    }
    Ok(())
}

fn created_id(value: Value) -> Result<String, HubError> {
    let results: Vec<ApiResult> = serde_json::from_value(value)?;
    results
        .into_iter()
        .find_map(|result| match result {
            ApiResult::Success(success) => success
                .get("id")
                .and_then(Value::as_str)
                .map(str::to_string),
            ApiResult::Error(_) => None,
        })
        .ok_or(HubError::MissingId)
}

impl HubClient for HttpHub {
    fn fetch(&mut self) -> Result<HubState, HubError> {
        let value = self.send(self.client.get(self.url("")))?;
        Ok(serde_json::from_value(value)?)
    }

    fn create(&mut self, kind: ObjectKind, body: &Value) -> Result<String, HubError> {
        let url = self.url(&format!("/{}", kind.collection()));
        tracing::debug!(%url, %body, "POST");
        let value = self.send(self.client.post(url).json(body))?;
        created_id(value)
    }

    fn update(&mut self, kind: ObjectKind, id: &str, body: &Value) -> Result<(), HubError> {
        let url = self.url(&format!("/{}/{}", kind.collection(), id));
        tracing::debug!(%url, %body, "PUT");
        self.send(self.client.put(url).json(body))?;
        Ok(())
    }

    fn delete(&mut self, kind: ObjectKind, id: &str) -> Result<(), HubError> {
        let url = self.url(&format!("/{}/{}", kind.collection(), id));
        tracing::debug!(%url, "DELETE");
        self.send(self.client.delete(url))?;
        Ok(())
    }

    fn read_sensor(&mut self, id: &str) -> Result<Sensor, HubError> {
        let value = self.send(self.client.get(self.url(&format!("/sensors/{}", id))))?;
        Ok(serde_json::from_value(value)?)
    }
}
