//! Domoticz sensor node
//!
//! Finds a Domoticz home-automation server on the local network over
//! mDNS/DNS-SD, registers itself idempotently as a Dummy hardware record with
//! one temperature/humidity device, and then reports sensor samples at a
//! fixed interval.
//!
//! # Features
//!
//! - `discovery` (default): mDNS transport backed by `mdns-sd`
//! - `test-utils`: scripted discovery transport and sensor in [`mock`]

// Core modules
pub mod client;
pub mod config;
pub mod discovery;
pub mod error;
pub mod error_recovery;
pub mod logging;
pub mod network;
pub mod node;
pub mod provisioning;
pub mod reporting;
pub mod sensor;

// Test support modules - available for both unit tests and integration tests
#[cfg(any(test, feature = "test-utils"))]
pub mod mock;

// Re-export main types for convenience
pub use client::{DomoticzApi, DomoticzClient};
pub use config::NodeConfig;
pub use discovery::{DiscoveryTransport, ServiceLocation, ServiceLocator};
pub use error::{NodeError, Result};
pub use node::Node;
pub use provisioning::{ProvisioningState, ProvisioningStateMachine, Registration};
