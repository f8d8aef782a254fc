//! Where the Domoticz server lives, as learned from discovery or configuration

use super::records::LocationUpdate;
use crate::error::{NodeError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::Ipv6Addr;
use url::Url;

/// Server location assembled field by field from discovery answers.
///
/// Empty strings and a zero port mean "not yet known".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceLocation {
    /// Advertised host name
    pub host: String,
    /// Advertised TCP port
    pub port: u16,
    /// API base path (e.g. `/domoticz`)
    pub path: String,
    /// Resolved address for `host`
    pub address: String,
}

impl ServiceLocation {
    /// All four fields are known; reporting may begin
    pub fn is_complete(&self) -> bool {
        !self.host.is_empty() && self.port != 0 && !self.path.is_empty() && !self.address.is_empty()
    }

    /// Names of the fields still missing
    pub fn missing_fields(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.host.is_empty() {
            missing.push("host");
        }
        if self.port == 0 {
            missing.push("port");
        }
        if self.path.is_empty() {
            missing.push("path");
        }
        if self.address.is_empty() {
            missing.push("address");
        }
        missing
    }

    /// Apply a field update; returns whether anything changed
    pub fn apply(&mut self, update: LocationUpdate) -> bool {
        match update {
            LocationUpdate::HostPort { host, port } => {
                let changed = self.host != host || self.port != port;
                // The address belongs to the old host and must be resolved again
                if self.host != host {
                    self.address.clear();
                }
                self.host = host;
                self.port = port;
                changed
            }
            LocationUpdate::Path(path) => {
                let changed = self.path != path;
                self.path = path;
                changed
            }
            LocationUpdate::Address(address) => {
                let changed = self.address != address;
                self.address = address;
                changed
            }
        }
    }

    /// Build a complete location from a statically configured URL
    pub fn from_url(url: &Url) -> Result<Self> {
        let host = url
            .host_str()
            .ok_or_else(|| NodeError::config(format!("URL {url} has no host")))?
            .trim_start_matches('[')
            .trim_end_matches(']')
            .to_string();
        let port = url
            .port_or_known_default()
            .ok_or_else(|| NodeError::config(format!("URL {url} has no port")))?;

        Ok(Self {
            address: host.clone(),
            host,
            port,
            path: url.path().to_string(),
        })
    }

    /// `http://<address>:<port><path>`
    pub fn base_url(&self) -> Result<Url> {
        if !self.is_complete() {
            return Err(NodeError::invalid_input(format!(
                "Service location incomplete, missing {}",
                self.missing_fields().join(", ")
            )));
        }

        let address = if self.address.parse::<Ipv6Addr>().is_ok() {
            format!("[{}]", self.address)
        } else {
            self.address.clone()
        };
        let path = if self.path.starts_with('/') {
            self.path.clone()
        } else {
            format!("/{}", self.path)
        };

        Ok(Url::parse(&format!("http://{address}:{}{path}", self.port))?)
    }
}

impl fmt::Display for ServiceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}{} ({})",
            self.host,
            self.port,
            self.path,
            if self.address.is_empty() {
                "unresolved"
            } else {
                self.address.as_str()
            }
        )
    }
}
