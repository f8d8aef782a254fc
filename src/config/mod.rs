//! Node configuration
//!
//! Defaults suit a node on a home network with Domoticz advertising itself
//! over mDNS. Every field can be overridden from the environment.

use crate::client::hardware_name;
use crate::discovery::records::MAX_RECORD_NAME_LEN;
use crate::discovery::{ServiceLocation, ServiceLocator};
use crate::error::{NodeError, Result};
use crate::error_recovery::{BackoffPolicy, MAX_BACKOFF_DELAY};
use crate::provisioning::NodeIdentity;
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use url::Url;

/// Service type Domoticz is advertised under
pub const DEFAULT_SERVICE_NAME: &str = "_domoticz._tcp.local";

/// Upper bound for timeouts and loop intervals
pub const MAX_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);

/// Main node configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Stable identifier; hardware records are matched on it
    pub node_id: String,

    /// Hardware name prefix, giving `<prefix>_<node_id>`
    pub hardware_prefix: String,

    /// Access point name prefix for network provisioning
    pub ap_name_prefix: String,

    /// Discovery service name
    pub service_name: String,

    /// Fixed server URL; skips discovery when set
    pub static_url: Option<Url>,

    /// API endpoint below the advertised path
    pub api_endpoint: String,

    /// Per-request HTTP timeout
    #[serde(with = "humantime_serde")]
    pub http_timeout: Duration,

    /// Tick period while provisioning
    #[serde(with = "humantime_serde")]
    pub provisioning_interval: Duration,

    /// Tick period while reporting
    #[serde(with = "humantime_serde")]
    pub reporting_interval: Duration,

    /// How long to wait for discovery answers before querying again
    #[serde(with = "humantime_serde")]
    pub requery_interval: Duration,

    /// Retry backoff for failed provisioning steps
    pub backoff: BackoffPolicy,

    /// Sensor settings
    pub sensor: SensorConfig,
}

/// Sensor configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorConfig {
    /// IIO device directory
    pub iio_device: PathBuf,

    /// Read attempts per sample
    pub read_attempts: u32,

    /// Pause between read attempts
    #[serde(with = "humantime_serde")]
    pub retry_pause: Duration,
}

impl Default for SensorConfig {
    fn default() -> Self {
        Self {
            iio_device: PathBuf::from("/sys/bus/iio/devices/iio:device0"),
            read_attempts: 3,
            retry_pause: Duration::from_secs(2),
        }
    }
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            node_id: default_node_id(),
            hardware_prefix: "ESP".to_string(),
            ap_name_prefix: "ESP8622-".to_string(),
            service_name: DEFAULT_SERVICE_NAME.to_string(),
            static_url: None,
            api_endpoint: "json.htm".to_string(),
            http_timeout: Duration::from_secs(10),
            provisioning_interval: Duration::from_secs(1),
            reporting_interval: Duration::from_secs(300),
            requery_interval: Duration::from_secs(30),
            backoff: BackoffPolicy::default(),
            sensor: SensorConfig::default(),
        }
    }
}

impl NodeConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(node_id) = env::var("NODE_ID") {
            config.node_id = sanitize_node_id(&node_id);
        }
        if let Ok(prefix) = env::var("NODE_HARDWARE_PREFIX") {
            config.hardware_prefix = prefix;
        }
        if let Ok(prefix) = env::var("NODE_AP_PREFIX") {
            config.ap_name_prefix = prefix;
        }
        if let Ok(service_name) = env::var("DOMOTICZ_SERVICE_NAME") {
            config.service_name = service_name;
        }
        if let Ok(url) = env::var("DOMOTICZ_URL") {
            if !url.is_empty() {
                config.static_url = Some(
                    url.parse()
                        .map_err(|e| NodeError::config(format!("Invalid DOMOTICZ_URL: {e}")))?,
                );
            }
        }
        if let Ok(endpoint) = env::var("DOMOTICZ_API_ENDPOINT") {
            config.api_endpoint = endpoint;
        }

        if let Some(timeout) = env_secs("DOMOTICZ_HTTP_TIMEOUT")? {
            config.http_timeout = timeout;
        }
        if let Some(interval) = env_secs("NODE_PROVISIONING_INTERVAL")? {
            config.provisioning_interval = interval;
        }
        if let Some(interval) = env_secs("NODE_REPORTING_INTERVAL")? {
            config.reporting_interval = interval;
        }
        if let Some(interval) = env_secs("NODE_REQUERY_INTERVAL")? {
            config.requery_interval = interval;
        }
        if let Some(delay) = env_secs("NODE_BACKOFF_INITIAL")? {
            config.backoff.initial_delay = delay;
        }
        if let Some(delay) = env_secs("NODE_BACKOFF_MAX")? {
            config.backoff.max_delay = delay;
        }

        if let Ok(device) = env::var("NODE_SENSOR_DEVICE") {
            config.sensor.iio_device = PathBuf::from(device);
        }
        if let Some(attempts) = env_parse("NODE_SENSOR_ATTEMPTS")? {
            config.sensor.read_attempts = attempts;
        }

        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.node_id.is_empty() {
            return Err(NodeError::config("Node id cannot be empty"));
        }

        if self.service_name.is_empty() {
            return Err(NodeError::config("Service name cannot be empty"));
        }
        if self.service_name.len() > MAX_RECORD_NAME_LEN {
            return Err(NodeError::config(format!(
                "Service name exceeds {MAX_RECORD_NAME_LEN} bytes"
            )));
        }

        for (name, value) in [
            ("HTTP timeout", self.http_timeout),
            ("Provisioning interval", self.provisioning_interval),
            ("Reporting interval", self.reporting_interval),
            ("Re-query interval", self.requery_interval),
        ] {
            if value.is_zero() {
                return Err(NodeError::config(format!("{name} must be greater than zero")));
            }
            if value > MAX_INTERVAL {
                return Err(NodeError::config(format!("{name} must not exceed {MAX_INTERVAL:?}")));
            }
        }

        if self.reporting_interval < self.provisioning_interval {
            return Err(NodeError::config(
                "Reporting interval must not be shorter than the provisioning interval",
            ));
        }

        if self.backoff.max_delay < self.backoff.initial_delay {
            return Err(NodeError::config("Backoff maximum is below the initial delay"));
        }
        if self.backoff.max_delay > MAX_BACKOFF_DELAY {
            return Err(NodeError::config(format!(
                "Backoff maximum must not exceed {MAX_BACKOFF_DELAY:?}"
            )));
        }
        if !self.backoff.is_monotonic() {
            return Err(NodeError::config(
                "Backoff multiplier must be at least 1 and exceed the jitter factor by 1",
            ));
        }

        if let Some(url) = &self.static_url {
            if url.scheme() != "http" {
                return Err(NodeError::config("DOMOTICZ_URL must use the http scheme"));
            }
            if url.host_str().is_none() {
                return Err(NodeError::config("DOMOTICZ_URL must include a host"));
            }
        }

        if self.sensor.read_attempts == 0 {
            return Err(NodeError::config("Sensor read attempts must be at least 1"));
        }

        Ok(())
    }

    /// `<prefix>_<node_id>`
    pub fn hardware_name(&self) -> String {
        hardware_name(&self.hardware_prefix, &self.node_id)
    }

    /// `<ap prefix><node_id>`
    pub fn ap_name(&self) -> String {
        format!("{}{}", self.ap_name_prefix, self.node_id)
    }

    pub fn identity(&self) -> NodeIdentity {
        NodeIdentity {
            node_id: self.node_id.clone(),
            hardware_name: self.hardware_name(),
        }
    }

    pub fn locator(&self) -> Result<ServiceLocator> {
        ServiceLocator::new(&self.service_name, self.requery_interval)
    }

    /// Location pre-seeded from `static_url`
    pub fn static_location(&self) -> Result<Option<ServiceLocation>> {
        self.static_url.as_ref().map(ServiceLocation::from_url).transpose()
    }
}

/// Host name, reduced to characters safe inside a hardware name
fn default_node_id() -> String {
    hostname::get()
        .map(|name| sanitize_node_id(&name.to_string_lossy()))
        .ok()
        .filter(|id| !id.is_empty())
        .unwrap_or_else(|| "node".to_string())
}

fn sanitize_node_id(raw: &str) -> String {
    raw.trim()
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '-' || *c == '_')
        .collect()
}

/// Whole seconds from `name`, if set
fn env_secs(name: &str) -> Result<Option<Duration>> {
    Ok(env_parse::<u64>(name)?.map(Duration::from_secs))
}

fn env_parse<T>(name: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| NodeError::config(format!("Invalid {name}: {e}"))),
        Err(_) => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> NodeConfig {
        NodeConfig {
            node_id: "12345".to_string(),
            ..NodeConfig::default()
        }
    }

    #[test]
    fn test_default_config_is_valid() {
        let config = config();
        config.validate().unwrap();
        assert_eq!(config.hardware_name(), "ESP_12345");
        assert_eq!(config.ap_name(), "ESP8622-12345");
        assert_eq!(config.service_name, DEFAULT_SERVICE_NAME);
        assert!(config.static_location().unwrap().is_none());
    }

    #[test]
    fn test_sanitize_node_id() {
        assert_eq!(sanitize_node_id(" sensor.kitchen-1 "), "sensorkitchen-1");
        assert_eq!(sanitize_node_id("..."), "");
    }

    #[test]
    fn test_rejects_zero_interval() {
        let config = NodeConfig {
            provisioning_interval: Duration::ZERO,
            ..config()
        };
        assert!(matches!(config.validate(), Err(NodeError::Config(_))));
    }

    #[test]
    fn test_rejects_reporting_faster_than_provisioning() {
        let config = NodeConfig {
            provisioning_interval: Duration::from_secs(10),
            reporting_interval: Duration::from_secs(5),
            ..config()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_long_service_name() {
        let config = NodeConfig {
            service_name: "x".repeat(MAX_RECORD_NAME_LEN + 1),
            ..config()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_static_url_rules() {
        let mut config = config();
        config.static_url = Some(Url::parse("https://nas.local/domoticz").unwrap());
        assert!(config.validate().is_err());

        config.static_url = Some(Url::parse("http://10.0.0.4:8080/domoticz").unwrap());
        config.validate().unwrap();
        let location = config.static_location().unwrap().unwrap();
        assert!(location.is_complete());
        assert_eq!(location.port, 8080);
    }

    #[test]
    fn test_rejects_non_monotonic_backoff() {
        let mut config = config();
        config.backoff.multiplier = 1.1;
        config.backoff.jitter_factor = 0.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_unbounded_durations() {
        let mut config = config();
        config.backoff.initial_delay = Duration::from_secs(u64::MAX);
        config.backoff.max_delay = Duration::from_secs(u64::MAX);
        assert!(matches!(config.validate(), Err(NodeError::Config(_))));

        let config = NodeConfig {
            reporting_interval: MAX_INTERVAL + Duration::from_secs(1),
            ..self::config()
        };
        assert!(config.validate().is_err());
    }
}
