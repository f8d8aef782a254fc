//! Discovery answer records and their interpretation
//!
//! A discovery transport hands us one [`DiscoveryAnswer`] per inbound record.
//! [`interpret_answer`] turns a single answer into at most one
//! [`LocationUpdate`] without touching any shared state, so the parsing rules
//! can be exercised in isolation.

use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use tracing::debug;

/// Longest record name the node will query for
pub const MAX_RECORD_NAME_LEN: usize = 255;

/// DNS resource record types the locator cares about
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RecordKind {
    /// Service locator (host + port)
    Srv,
    /// Free-text attributes (API path)
    Txt,
    /// IPv4 address for a host name
    A,
    /// Anything else, carrying the raw rrtype
    Other(u16),
}

impl RecordKind {
    /// Map a raw DNS rrtype onto a record kind
    pub fn from_rrtype(rrtype: u16) -> Self {
        match rrtype {
            0x01 => RecordKind::A,
            0x10 => RecordKind::Txt,
            0x21 => RecordKind::Srv,
            other => RecordKind::Other(other),
        }
    }
}

/// One answer record as delivered by the discovery transport
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveryAnswer {
    /// Record owner name (service instance or host name)
    pub name: String,
    /// Record kind
    pub kind: RecordKind,
    /// Raw record payload rendered as text
    pub payload: String,
}

impl DiscoveryAnswer {
    pub fn new(name: impl Into<String>, kind: RecordKind, payload: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind,
            payload: payload.into(),
        }
    }
}

/// Field update derived from a single answer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LocationUpdate {
    /// SRV answer: advertised host and port
    HostPort { host: String, port: u16 },
    /// TXT answer: API base path
    Path(String),
    /// A answer matching the advertised host
    Address(String),
}

/// Interpret one answer for `service_name`.
///
/// `known_host` is the host learned from an earlier SRV answer (empty when
/// unknown); address records are only accepted for that host.
pub fn interpret_answer(
    service_name: &str,
    known_host: &str,
    answer: &DiscoveryAnswer,
) -> Option<LocationUpdate> {
    match answer.kind {
        RecordKind::Srv | RecordKind::Txt => {
            if !names_service(&answer.name, service_name) {
                debug!("Ignoring unrelated answer for {}", answer.name);
                return None;
            }
            if answer.kind == RecordKind::Srv {
                parse_srv(&answer.payload)
            } else {
                parse_txt(&answer.payload)
            }
        }
        RecordKind::A => {
            if known_host.is_empty() || !same_host(&answer.name, known_host) {
                debug!("Ignoring address record for {}", answer.name);
                return None;
            }
            let address = answer.payload.trim();
            match address.parse::<IpAddr>() {
                Ok(ip) => Some(LocationUpdate::Address(ip.to_string())),
                Err(_) => {
                    debug!("Address record for {} has unusable data {:?}", answer.name, address);
                    None
                }
            }
        }
        RecordKind::Other(rrtype) => {
            debug!("Ignoring record type {rrtype:#x} for {}", answer.name);
            None
        }
    }
}

/// Iterate over `key=value` pairs of a `;`-delimited attribute string.
///
/// Keys are located independently, so attribute order does not matter.
/// Leading non-printable bytes (TXT length prefixes) are stripped from keys.
pub fn attributes(payload: &str) -> impl Iterator<Item = (&str, &str)> {
    payload.split(';').filter_map(|pair| {
        let (key, value) = pair.split_once('=')?;
        let key = key.trim_start_matches(|c: char| !c.is_ascii_graphic()).trim();
        Some((key, value.trim()))
    })
}

fn attribute<'a>(payload: &'a str, wanted: &str) -> Option<&'a str> {
    attributes(payload)
        .find(|(key, _)| key.eq_ignore_ascii_case(wanted))
        .map(|(_, value)| value)
}

fn parse_srv(payload: &str) -> Option<LocationUpdate> {
    let port = attribute(payload, "port").and_then(|p| p.parse::<u16>().ok());
    let host = attribute(payload, "host").map(|h| h.trim_end_matches('.'));

    match (host, port) {
        (Some(host), Some(port)) if !host.is_empty() && port != 0 => {
            Some(LocationUpdate::HostPort {
                host: host.to_string(),
                port,
            })
        }
        _ => {
            debug!("SRV payload without usable host/port: {payload:?}");
            None
        }
    }
}

fn parse_txt(payload: &str) -> Option<LocationUpdate> {
    match attribute(payload, "path") {
        Some(path) if !path.is_empty() => Some(LocationUpdate::Path(path.to_string())),
        _ => {
            debug!("TXT payload without path: {payload:?}");
            None
        }
    }
}

fn names_service(name: &str, service_name: &str) -> bool {
    let service = service_name.trim_end_matches('.').to_ascii_lowercase();
    !service.is_empty() && name.to_ascii_lowercase().contains(&service)
}

fn same_host(a: &str, b: &str) -> bool {
    a.trim_end_matches('.')
        .eq_ignore_ascii_case(b.trim_end_matches('.'))
}
