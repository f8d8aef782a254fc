//! mDNS/DNS-SD transport backed by `mdns-sd`
//!
//! `mdns-sd` resolves services rather than handing out raw records, so each
//! resolved service is flattened back into the SRV, TXT and A answers the
//! locator understands.

use super::records::{DiscoveryAnswer, RecordKind};
use super::DiscoveryTransport;
use crate::error::{NodeError, Result};
use mdns_sd::{Receiver, ServiceDaemon, ServiceEvent, ServiceInfo};
use std::net::IpAddr;
use tracing::{debug, warn};

/// Discovery transport using the system's multicast DNS
pub struct MdnsTransport {
    daemon: ServiceDaemon,
    browse: Option<(String, Receiver<ServiceEvent>)>,
}

impl MdnsTransport {
    /// Start the mDNS daemon
    pub fn new() -> Result<Self> {
        let daemon = ServiceDaemon::new()
            .map_err(|e| NodeError::discovery(format!("Failed to start mDNS daemon: {e}")))?;
        Ok(Self {
            daemon,
            browse: None,
        })
    }

    fn stop_browse(&mut self) {
        if let Some((service_type, _)) = self.browse.take() {
            if let Err(e) = self.daemon.stop_browse(&service_type) {
                debug!("Stopping browse for {service_type} failed: {e}");
            }
        }
    }
}

impl DiscoveryTransport for MdnsTransport {
    fn send(&mut self, query_name: &str) -> Result<()> {
        self.stop_browse();

        let service_type = fully_qualified(query_name);
        let receiver = self.daemon.browse(&service_type).map_err(|e| {
            NodeError::discovery(format!("mDNS browse for {service_type} failed: {e}"))
        })?;
        self.browse = Some((service_type, receiver));
        Ok(())
    }

    fn poll_answers(&mut self) -> Vec<DiscoveryAnswer> {
        let Some((_, receiver)) = &self.browse else {
            return Vec::new();
        };

        let mut answers = Vec::new();
        while let Ok(event) = receiver.try_recv() {
            match event {
                ServiceEvent::ServiceResolved(info) => answers.extend(answers_for(&info)),
                ServiceEvent::ServiceFound(service_type, fullname) => {
                    debug!("Found {fullname} for {service_type}, awaiting resolution");
                }
                other => debug!("mDNS event: {other:?}"),
            }
        }
        answers
    }
}

impl Drop for MdnsTransport {
    fn drop(&mut self) {
        self.stop_browse();
        if let Err(e) = self.daemon.shutdown() {
            warn!("mDNS daemon shutdown failed: {e}");
        }
    }
}

/// `mdns-sd` expects service types terminated by a dot
fn fully_qualified(name: &str) -> String {
    if name.ends_with('.') {
        name.to_string()
    } else {
        format!("{name}.")
    }
}

/// Flatten a resolved service into SRV, TXT and A answers
fn answers_for(info: &ServiceInfo) -> Vec<DiscoveryAnswer> {
    let instance = info.get_fullname().trim_end_matches('.');
    let host = info.get_hostname().trim_end_matches('.');

    let mut answers = vec![DiscoveryAnswer::new(
        instance,
        RecordKind::Srv,
        format!(
            "p={};w={};port={};host={host}",
            info.get_priority(),
            info.get_weight(),
            info.get_port()
        ),
    )];

    if let Some(path) = info.get_property_val_str("path") {
        answers.push(DiscoveryAnswer::new(
            instance,
            RecordKind::Txt,
            format!("path={path}"),
        ));
    }

    answers.extend(info.get_addresses().iter().filter_map(|ip| match ip {
        IpAddr::V4(v4) => Some(DiscoveryAnswer::new(host, RecordKind::A, v4.to_string())),
        IpAddr::V6(_) => None,
    }));

    answers
}
