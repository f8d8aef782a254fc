//! Service discovery for locating the Domoticz server
//!
//! The transport sends queries and collects raw answer records; the
//! [`ServiceLocator`] interprets them into a [`ServiceLocation`].

pub mod location;
pub mod locator;
pub mod records;

#[cfg(feature = "discovery")]
pub mod mdns;

use crate::error::Result;

pub use location::ServiceLocation;
pub use locator::ServiceLocator;
pub use records::{DiscoveryAnswer, LocationUpdate, RecordKind};

#[cfg(feature = "discovery")]
pub use mdns::MdnsTransport;

/// Packet-level discovery collaborator.
///
/// Implementations never interpret records; they only deliver them.
pub trait DiscoveryTransport: Send {
    /// Send one query for `query_name`, dropping state of any earlier query
    fn send(&mut self, query_name: &str) -> Result<()>;

    /// Answers received since the previous poll, in arrival order
    fn poll_answers(&mut self) -> Vec<DiscoveryAnswer>;
}
