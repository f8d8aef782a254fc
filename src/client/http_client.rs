//! HTTP implementation of the Domoticz JSON API
//!
//! Each operation builds one URL-encoded GET against
//! `http://<address>:<port><path>/<api_endpoint>` and parses the JSON object
//! the server returns.

use super::{
    DeviceRecord, DomoticzApi, HardwareRecord, HARDWARE_TYPE_DUMMY, SENSOR_NAME,
    SENSOR_TYPE_TEMP_HUM,
};
use crate::discovery::ServiceLocation;
use crate::error::{NodeError, Result};
use async_trait::async_trait;
use reqwest::{Client, ClientBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;
use url::Url;

/// Stateless Domoticz request builder/executor
#[derive(Debug, Clone)]
pub struct DomoticzClient {
    /// HTTP client instance
    client: Client,

    /// Endpoint appended to the advertised path (usually `json.htm`)
    api_endpoint: String,
}

impl DomoticzClient {
    /// Create a new client with a per-request timeout
    pub fn new(timeout: Duration, api_endpoint: impl Into<String>) -> Result<Self> {
        let client = ClientBuilder::new()
            .timeout(timeout)
            .user_agent(format!("domoticz-sensor-node/{}", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| NodeError::connection(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            api_endpoint: api_endpoint.into(),
        })
    }

    /// Build the request URL for `params`
    pub fn request_url(&self, location: &ServiceLocation, params: &[(&str, &str)]) -> Result<Url> {
        let mut url = location.base_url()?;

        let endpoint = self.api_endpoint.trim_matches('/');
        if !endpoint.is_empty() {
            let path = format!("{}/{endpoint}", url.path().trim_end_matches('/'));
            url.set_path(&path);
        }

        url.query_pairs_mut().extend_pairs(params);
        Ok(url)
    }

    /// Issue one GET and parse the JSON object body
    async fn execute(&self, url: Url) -> Result<Value> {
        debug!("GET {url}");

        let response = self.client.get(url.clone()).send().await.map_err(|e| {
            if e.is_timeout() {
                NodeError::timeout(format!("Request to {url} timed out"))
            } else if e.is_connect() {
                NodeError::connection(format!("Failed to connect to {url}: {e}"))
            } else {
                NodeError::Request(e)
            }
        })?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| NodeError::connection(format!("Failed to read response: {e}")))?;

        if status != StatusCode::OK {
            return Err(NodeError::http(status.as_u16(), text));
        }

        let body: Value = serde_json::from_str(&text)?;
        if !body.is_object() {
            return Err(NodeError::malformed(format!("Expected JSON object, got {text}")));
        }
        check_status(&body)?;
        Ok(body)
    }

    async fn list<T: DeserializeOwned>(&self, url: Url) -> Result<Vec<T>> {
        let body = self.execute(url).await?;
        Ok(parse_result_list(&body))
    }
}

#[async_trait]
impl DomoticzApi for DomoticzClient {
    async fn list_hardware(&self, location: &ServiceLocation) -> Result<Vec<HardwareRecord>> {
        let url = self.request_url(location, &[("type", "hardware")])?;
        self.list(url).await
    }

    async fn create_hardware(&self, location: &ServiceLocation, name: &str) -> Result<String> {
        let htype = HARDWARE_TYPE_DUMMY.to_string();
        let url = self.request_url(
            location,
            &[
                ("type", "command"),
                ("param", "addhardware"),
                ("htype", &htype),
                ("enabled", "true"),
                ("datatimeout", "0"),
                ("name", name),
            ],
        )?;
        let body = self.execute(url).await?;
        extract_idx(&body)
    }

    async fn list_devices(&self, location: &ServiceLocation, filter: &str) -> Result<Vec<DeviceRecord>> {
        let url = self.request_url(location, &[("type", "devices"), ("filter", filter)])?;
        self.list(url).await
    }

    async fn create_device(&self, location: &ServiceLocation, hardware_idx: &str) -> Result<String> {
        let sensor_type = SENSOR_TYPE_TEMP_HUM.to_string();
        let url = self.request_url(
            location,
            &[
                ("type", "createvirtualsensor"),
                ("sensorname", SENSOR_NAME),
                ("sensortype", &sensor_type),
                ("idx", hardware_idx),
            ],
        )?;
        let body = self.execute(url).await?;
        extract_idx(&body)
    }

    async fn update_sensor(
        &self,
        location: &ServiceLocation,
        device_idx: &str,
        temperature: f32,
        humidity: f32,
    ) -> Result<()> {
        let svalue = sensor_value(temperature, humidity);
        let url = self.request_url(
            location,
            &[
                ("type", "command"),
                ("param", "udevice"),
                ("idx", device_idx),
                ("nvalue", "0"),
                ("svalue", &svalue),
            ],
        )?;
        self.execute(url).await.map(|_| ())
    }
}

/// `<temperature>;<humidity>;<humidity status>` with normal humidity status
pub fn sensor_value(temperature: f32, humidity: f32) -> String {
    format!("{temperature:.1};{humidity:.1};0")
}

/// Domoticz reports application errors as `{"status": "ERR"}` with HTTP 200
fn check_status(body: &Value) -> Result<()> {
    match body.get("status").and_then(Value::as_str) {
        None | Some("OK") => Ok(()),
        Some(status) => Err(NodeError::malformed(format!(
            "Server returned status {status}: {}",
            body.get("message")
                .or_else(|| body.get("title"))
                .and_then(Value::as_str)
                .unwrap_or("no message")
        ))),
    }
}

/// Entries of the `result` array; an absent array is an empty listing and
/// entries that do not parse are skipped
fn parse_result_list<T: DeserializeOwned>(body: &Value) -> Vec<T> {
    let Some(entries) = body.get("result").and_then(Value::as_array) else {
        return Vec::new();
    };

    entries
        .iter()
        .filter_map(|entry| match serde_json::from_value(entry.clone()) {
            Ok(record) => Some(record),
            Err(e) => {
                debug!("Skipping unparseable entry {entry}: {e}");
                None
            }
        })
        .collect()
}

fn extract_idx(body: &Value) -> Result<String> {
    match body.get("idx") {
        Some(Value::String(idx)) if !idx.is_empty() => Ok(idx.clone()),
        Some(Value::Number(idx)) => Ok(idx.to_string()),
        _ => Err(NodeError::malformed(format!("Response has no idx: {body}"))),
    }
}
