//! Test fixtures and utilities for consistent test setup
//!
//! Provides reusable node configuration and environment helpers using
//! rstest fixtures.

#![allow(dead_code)]

use domoticz_sensor_node::config::NodeConfig;
use domoticz_sensor_node::error_recovery::BackoffPolicy;
use domoticz_sensor_node::provisioning::NodeIdentity;
use rstest::*;
use std::time::Duration;

pub const NODE_ID: &str = "12345";
pub const HARDWARE_NAME: &str = "ESP_12345";

/// Identity of the node under test
#[fixture]
pub fn identity() -> NodeIdentity {
    NodeIdentity {
        node_id: NODE_ID.to_string(),
        hardware_name: HARDWARE_NAME.to_string(),
    }
}

/// Backoff short enough for tests
#[fixture]
pub fn fast_backoff() -> BackoffPolicy {
    BackoffPolicy {
        initial_delay: Duration::from_millis(10),
        max_delay: Duration::from_millis(50),
        multiplier: 2.0,
        jitter_factor: 0.0,
    }
}

/// Configuration for a node with a fixed id
#[fixture]
pub fn test_node_config(fast_backoff: BackoffPolicy) -> NodeConfig {
    NodeConfig {
        node_id: NODE_ID.to_string(),
        http_timeout: Duration::from_secs(2),
        backoff: fast_backoff,
        ..NodeConfig::default()
    }
}

/// Every variable `NodeConfig::from_env` reads, unset
pub fn cleared_node_env() -> Vec<(&'static str, Option<&'static str>)> {
    [
        "NODE_ID",
        "NODE_HARDWARE_PREFIX",
        "NODE_AP_PREFIX",
        "DOMOTICZ_SERVICE_NAME",
        "DOMOTICZ_URL",
        "DOMOTICZ_API_ENDPOINT",
        "DOMOTICZ_HTTP_TIMEOUT",
        "NODE_PROVISIONING_INTERVAL",
        "NODE_REPORTING_INTERVAL",
        "NODE_REQUERY_INTERVAL",
        "NODE_BACKOFF_INITIAL",
        "NODE_BACKOFF_MAX",
        "NODE_SENSOR_DEVICE",
        "NODE_SENSOR_ATTEMPTS",
    ]
    .into_iter()
    .map(|name| (name, None))
    .collect()
}

/// `cleared_node_env` with `overrides` applied
pub fn node_env(overrides: &[(&'static str, &'static str)]) -> Vec<(&'static str, Option<&'static str>)> {
    let mut vars = cleared_node_env();
    for (name, value) in overrides {
        if let Some(slot) = vars.iter_mut().find(|(n, _)| n == name) {
            slot.1 = Some(*value);
        }
    }
    vars
}
