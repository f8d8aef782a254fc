//! Service locator: issues discovery queries and folds answers into a location

use super::location::ServiceLocation;
use super::records::{interpret_answer, DiscoveryAnswer, MAX_RECORD_NAME_LEN};
use super::DiscoveryTransport;
use crate::error::{NodeError, Result};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info};

/// Locates one named service on the local network
#[derive(Debug, Clone)]
pub struct ServiceLocator {
    service_name: String,
    requery_interval: Duration,
    queried_at: Option<Instant>,
}

impl ServiceLocator {
    /// Create a locator for `service_name` (e.g. `_domoticz._tcp.local`)
    pub fn new(service_name: impl Into<String>, requery_interval: Duration) -> Result<Self> {
        let service_name = service_name.into();
        if service_name.is_empty() {
            return Err(NodeError::invalid_input("Service name cannot be empty"));
        }
        if service_name.len() > MAX_RECORD_NAME_LEN {
            return Err(NodeError::invalid_input(format!(
                "Service name is {} bytes, limit is {MAX_RECORD_NAME_LEN}",
                service_name.len()
            )));
        }

        Ok(Self {
            service_name,
            requery_interval,
            queried_at: None,
        })
    }

    pub fn service_name(&self) -> &str {
        &self.service_name
    }

    /// True when no query is in flight or the last one went unanswered for
    /// longer than the re-query interval
    pub fn query_due(&self) -> bool {
        match self.queried_at {
            None => true,
            Some(at) => at.elapsed() >= self.requery_interval,
        }
    }

    /// Emit one discovery query, replacing any in-flight query
    pub fn begin_query(&mut self, transport: &mut dyn DiscoveryTransport) -> Result<()> {
        info!("Querying for {}", self.service_name);
        // Marked before sending so a failing transport is retried on the
        // re-query interval rather than every tick.
        self.queried_at = Some(Instant::now());
        transport.send(&self.service_name)
    }

    /// Apply one answer to `location`; returns whether a field changed
    pub fn on_answer(&self, location: &mut ServiceLocation, answer: &DiscoveryAnswer) -> bool {
        match interpret_answer(&self.service_name, &location.host, answer) {
            Some(update) => {
                debug!("Answer {} ({:?}) -> {:?}", answer.name, answer.kind, update);
                location.apply(update)
            }
            None => false,
        }
    }

    /// Drain the transport and apply every pending answer in arrival order
    pub fn process_pending(
        &self,
        transport: &mut dyn DiscoveryTransport,
        location: &mut ServiceLocation,
    ) -> usize {
        transport
            .poll_answers()
            .iter()
            .filter(|answer| self.on_answer(location, answer))
            .count()
    }

    /// Forget the in-flight query
    pub fn reset(&mut self) {
        self.queried_at = None;
    }
}
