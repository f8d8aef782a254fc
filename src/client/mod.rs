//! Domoticz JSON API client
//!
//! [`DomoticzApi`] is the seam between the provisioning logic and the HTTP
//! transport; [`http_client::DomoticzClient`] is the real implementation.

pub mod http_client;

use crate::discovery::ServiceLocation;
use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Deserializer, Serialize};

pub use http_client::DomoticzClient;

/// Hardware type used for registration (Dummy / virtual sensors)
pub const HARDWARE_TYPE_DUMMY: u32 = 15;

/// Virtual sensor type: temperature + humidity
pub const SENSOR_TYPE_TEMP_HUM: u32 = 82;

/// Name given to the created sensor, also used to recognize it
pub const SENSOR_NAME: &str = "Temperature";

/// Device list filter
pub const DEVICE_FILTER: &str = "all";

/// Hardware entry from `type=hardware`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HardwareRecord {
    /// Server-assigned identifier
    #[serde(deserialize_with = "string_or_number")]
    pub idx: String,
    /// Display name
    #[serde(rename = "Name", default)]
    pub name: String,
}

/// Device entry from `type=devices`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceRecord {
    /// Server-assigned identifier
    #[serde(deserialize_with = "string_or_number")]
    pub idx: String,
    /// Display name
    #[serde(rename = "Name", default)]
    pub name: String,
    /// Owning hardware idx
    #[serde(rename = "HardwareID", default, deserialize_with = "string_or_number")]
    pub hardware_idx: String,
}

/// Hardware name derived from the node identity, e.g. `ESP_12345`
pub fn hardware_name(prefix: &str, node_id: &str) -> String {
    format!("{prefix}_{node_id}")
}

/// First hardware record whose name contains the node identifier
pub fn find_hardware<'a>(records: &'a [HardwareRecord], node_id: &str) -> Option<&'a HardwareRecord> {
    records.iter().find(|record| record.name.contains(node_id))
}

/// First temperature device attached to `hardware_idx`
pub fn find_device<'a>(records: &'a [DeviceRecord], hardware_idx: &str) -> Option<&'a DeviceRecord> {
    records
        .iter()
        .find(|record| record.hardware_idx == hardware_idx && record.name.contains(SENSOR_NAME))
}

/// Operations the node needs from the Domoticz server.
///
/// Every call is a single request/response exchange against `location`.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DomoticzApi: Send + Sync {
    /// `type=hardware`
    async fn list_hardware(&self, location: &ServiceLocation) -> Result<Vec<HardwareRecord>>;

    /// `param=addhardware`; returns the new idx
    async fn create_hardware(&self, location: &ServiceLocation, name: &str) -> Result<String>;

    /// `type=devices`
    async fn list_devices(&self, location: &ServiceLocation, filter: &str) -> Result<Vec<DeviceRecord>>;

    /// `type=createvirtualsensor`; returns the new idx
    async fn create_device(&self, location: &ServiceLocation, hardware_idx: &str) -> Result<String>;

    /// `param=udevice` with `<temperature>;<humidity>;0`
    async fn update_sensor(
        &self,
        location: &ServiceLocation,
        device_idx: &str,
        temperature: f32,
        humidity: f32,
    ) -> Result<()>;
}

/// Domoticz is inconsistent about quoting numeric ids
pub(crate) fn string_or_number<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(s) => Ok(s),
        serde_json::Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected string or number, got {other}"
        ))),
    }
}
