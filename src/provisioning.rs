//! Provisioning state machine
//!
//! Drives the node from "server unknown" to "registered and reporting", one
//! step per [`ProvisioningStateMachine::tick`]:
//!
//! 1. `UNRESOLVED`: query discovery until host, port, path and address are known
//! 2. `HARDWARE_UNKNOWN`: find this node's hardware record or create it
//! 3. `DEVICE_UNKNOWN`: find the temperature device on that hardware or create it
//! 4. `REPORTING`: terminal; the reporting loop takes over
//!
//! Lookups always precede creates, so a rebooted node adopts its existing
//! records instead of registering duplicates. Failed steps keep the current
//! state and are retried after a growing backoff.

use crate::client::{find_device, find_hardware, DomoticzApi, DEVICE_FILTER};
use crate::discovery::{DiscoveryTransport, ServiceLocation, ServiceLocator};
use crate::error::{NodeError, Result};
use crate::error_recovery::{Backoff, BackoffPolicy, MAX_BACKOFF_DELAY};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

/// Provisioning progress; ordered so that later states compare greater
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProvisioningState {
    Unresolved,
    HardwareUnknown,
    DeviceUnknown,
    Reporting,
}

impl fmt::Display for ProvisioningState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Unresolved => "UNRESOLVED",
            Self::HardwareUnknown => "HARDWARE_UNKNOWN",
            Self::DeviceUnknown => "DEVICE_UNKNOWN",
            Self::Reporting => "REPORTING",
        };
        f.write_str(name)
    }
}

/// How this node identifies itself to the server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeIdentity {
    /// Stable per-device identifier (chip id, host name)
    pub node_id: String,
    /// Name used when creating the hardware record
    pub hardware_name: String,
}

/// Everything the reporting loop needs once provisioning is done
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Registration {
    pub location: ServiceLocation,
    pub hardware_idx: String,
    pub device_idx: String,
}

/// Owns the server location and the identifiers learned during provisioning
#[derive(Debug)]
pub struct ProvisioningStateMachine {
    state: ProvisioningState,
    locator: ServiceLocator,
    identity: NodeIdentity,
    location: ServiceLocation,
    static_location: Option<ServiceLocation>,
    hardware_idx: String,
    device_idx: String,
    backoff: Backoff,
    retry_at: Option<Instant>,
}

impl ProvisioningStateMachine {
    pub fn new(locator: ServiceLocator, identity: NodeIdentity, backoff: BackoffPolicy) -> Self {
        Self {
            state: ProvisioningState::Unresolved,
            locator,
            identity,
            location: ServiceLocation::default(),
            static_location: None,
            hardware_idx: String::new(),
            device_idx: String::new(),
            backoff: Backoff::new(backoff),
            retry_at: None,
        }
    }

    /// Skip discovery and start at `HARDWARE_UNKNOWN` with a known location.
    /// Incomplete locations are ignored and discovery runs as usual.
    pub fn with_static_location(mut self, location: ServiceLocation) -> Self {
        if location.is_complete() {
            info!("Using configured server location {location}");
            self.location = location.clone();
            self.static_location = Some(location);
            self.state = ProvisioningState::HardwareUnknown;
        } else {
            warn!(
                "Configured location {location} is missing {:?}, falling back to discovery",
                location.missing_fields()
            );
        }
        self
    }

    pub fn state(&self) -> ProvisioningState {
        self.state
    }

    pub fn location(&self) -> &ServiceLocation {
        &self.location
    }

    pub fn identity(&self) -> &NodeIdentity {
        &self.identity
    }

    /// Empty until `DEVICE_UNKNOWN` is reached
    pub fn hardware_idx(&self) -> &str {
        &self.hardware_idx
    }

    /// Empty until `REPORTING` is reached
    pub fn device_idx(&self) -> &str {
        &self.device_idx
    }

    /// Consecutive failed HTTP steps
    pub fn failures(&self) -> u32 {
        self.backoff.failures()
    }

    /// Available once the machine reached `REPORTING`
    pub fn registration(&self) -> Option<Registration> {
        (self.state == ProvisioningState::Reporting).then(|| Registration {
            location: self.location.clone(),
            hardware_idx: self.hardware_idx.clone(),
            device_idx: self.device_idx.clone(),
        })
    }

    /// Forget everything learned and start over
    pub fn reset(&mut self) {
        info!("Provisioning reset from {}", self.state);
        self.locator.reset();
        self.hardware_idx.clear();
        self.device_idx.clear();
        self.backoff.reset();
        self.retry_at = None;

        match &self.static_location {
            Some(location) => {
                self.location = location.clone();
                self.state = ProvisioningState::HardwareUnknown;
            }
            None => {
                self.location = ServiceLocation::default();
                self.state = ProvisioningState::Unresolved;
            }
        }
    }

    /// Advance at most one step; returns the state after the step
    pub async fn tick(
        &mut self,
        api: &dyn DomoticzApi,
        transport: &mut dyn DiscoveryTransport,
    ) -> ProvisioningState {
        match self.state {
            ProvisioningState::Unresolved => self.resolve_location(transport),
            ProvisioningState::HardwareUnknown => {
                if self.backing_off() {
                    return self.state;
                }
                match self.resolve_hardware(api).await {
                    Ok(idx) => {
                        info!("Hardware idx {idx}");
                        self.hardware_idx = idx;
                        self.step_succeeded(ProvisioningState::DeviceUnknown);
                    }
                    Err(e) => self.step_failed("Hardware lookup", &e),
                }
            }
            ProvisioningState::DeviceUnknown => {
                if self.backing_off() {
                    return self.state;
                }
                match self.resolve_device(api).await {
                    Ok(idx) => {
                        info!("Device idx {idx}");
                        self.device_idx = idx;
                        self.step_succeeded(ProvisioningState::Reporting);
                    }
                    Err(e) => self.step_failed("Device lookup", &e),
                }
            }
            ProvisioningState::Reporting => {}
        }
        self.state
    }

    fn resolve_location(&mut self, transport: &mut dyn DiscoveryTransport) {
        if !self.location.is_complete() {
            if self.locator.query_due() {
                if let Err(e) = self.locator.begin_query(transport) {
                    warn!("Discovery query failed: {e}");
                }
            }
            self.locator.process_pending(transport, &mut self.location);
        }

        if self.location.is_complete() {
            info!("Domoticz server located at {}", self.location);
            self.advance(ProvisioningState::HardwareUnknown);
        } else {
            debug!("Server location missing {:?}", self.location.missing_fields());
        }
    }

    /// Listing failures are errors rather than empty listings so an outage
    /// can never lead to a duplicate create. List and create share a tick so
    /// the create always acts on a listing from the same attempt.
    async fn resolve_hardware(&self, api: &dyn DomoticzApi) -> Result<String> {
        let records = api.list_hardware(&self.location).await?;
        if let Some(record) = find_hardware(&records, &self.identity.node_id) {
            info!("Found existing hardware {:?} ({})", record.name, record.idx);
            return Ok(record.idx.clone());
        }

        info!("No hardware for {}, creating {:?}", self.identity.node_id, self.identity.hardware_name);
        let idx = api.create_hardware(&self.location, &self.identity.hardware_name).await?;
        non_empty(idx, "hardware")
    }

    async fn resolve_device(&self, api: &dyn DomoticzApi) -> Result<String> {
        let records = api.list_devices(&self.location, DEVICE_FILTER).await?;
        if let Some(record) = find_device(&records, &self.hardware_idx) {
            info!("Found existing device {:?} ({})", record.name, record.idx);
            return Ok(record.idx.clone());
        }

        info!("No device on hardware {}, creating one", self.hardware_idx);
        let idx = api.create_device(&self.location, &self.hardware_idx).await?;
        non_empty(idx, "device")
    }

    fn backing_off(&self) -> bool {
        matches!(self.retry_at, Some(at) if Instant::now() < at)
    }

    fn step_succeeded(&mut self, next: ProvisioningState) {
        self.backoff.reset();
        self.retry_at = None;
        self.advance(next);
    }

    fn step_failed(&mut self, step: &str, err: &NodeError) {
        if err.is_retryable() {
            let delay = self.backoff.next_delay();
            self.schedule_retry(delay);
            warn!(
                "{step} failed in {} (attempt {}), retrying in {delay:?}: {err}",
                self.state,
                self.backoff.failures()
            );
        } else {
            // Retrying soon cannot fix a bad location or request
            let delay = self.backoff.max_out();
            self.schedule_retry(delay);
            error!("{step} failed in {}, retrying in {delay:?}: {err}", self.state);
        }
    }

    fn schedule_retry(&mut self, delay: Duration) {
        let now = Instant::now();
        self.retry_at = Some(now.checked_add(delay).unwrap_or(now + MAX_BACKOFF_DELAY));
    }

    fn advance(&mut self, next: ProvisioningState) {
        debug_assert!(next > self.state, "provisioning must move forward");
        info!("Provisioning {} -> {next}", self.state);
        self.state = next;
    }
}

fn non_empty(idx: String, what: &str) -> Result<String> {
    if idx.is_empty() {
        Err(NodeError::malformed(format!("Server returned an empty {what} idx")))
    } else {
        Ok(idx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{DeviceRecord, HardwareRecord, MockDomoticzApi};
    use crate::discovery::{DiscoveryAnswer, RecordKind};
    use crate::mock::ScriptedTransport;

    const SERVICE: &str = "_domoticz._tcp.local";

    fn identity() -> NodeIdentity {
        NodeIdentity {
            node_id: "12345".to_string(),
            hardware_name: "ESP_12345".to_string(),
        }
    }

    fn location() -> ServiceLocation {
        ServiceLocation {
            host: "nas.local".to_string(),
            port: 8181,
            path: "/domoticz".to_string(),
            address: "10.0.0.4".to_string(),
        }
    }

    fn policy() -> BackoffPolicy {
        BackoffPolicy {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(8),
            multiplier: 2.0,
            jitter_factor: 0.0,
        }
    }

    fn machine() -> ProvisioningStateMachine {
        let locator = ServiceLocator::new(SERVICE, Duration::from_secs(30)).unwrap();
        ProvisioningStateMachine::new(locator, identity(), policy())
    }

    fn located() -> ProvisioningStateMachine {
        machine().with_static_location(location())
    }

    fn hardware(idx: &str, name: &str) -> HardwareRecord {
        HardwareRecord {
            idx: idx.to_string(),
            name: name.to_string(),
        }
    }

    fn device(idx: &str, name: &str, hardware_idx: &str) -> DeviceRecord {
        DeviceRecord {
            idx: idx.to_string(),
            name: name.to_string(),
            hardware_idx: hardware_idx.to_string(),
        }
    }

    fn push_server_answers(transport: &mut ScriptedTransport) {
        transport.push_answer(DiscoveryAnswer::new(
            "nas._domoticz._tcp.local",
            RecordKind::Srv,
            "p=0;w=0;port=8181;host=nas.local",
        ));
        transport.push_answer(DiscoveryAnswer::new(
            "nas._domoticz._tcp.local",
            RecordKind::Txt,
            "\x0epath=/domoticz",
        ));
        transport.push_answer(DiscoveryAnswer::new("nas.local", RecordKind::A, "10.0.0.4"));
    }

    #[tokio::test]
    async fn test_discovery_leaves_unresolved_once() {
        let api = MockDomoticzApi::new();
        let mut transport = ScriptedTransport::new();
        let mut sm = machine();

        assert_eq!(sm.tick(&api, &mut transport).await, ProvisioningState::Unresolved);
        assert_eq!(transport.queries(), vec![SERVICE.to_string()]);

        push_server_answers(&mut transport);
        assert_eq!(sm.tick(&api, &mut transport).await, ProvisioningState::HardwareUnknown);
        assert_eq!(sm.location(), &location());
        // One query only while the answers were pending
        assert_eq!(transport.queries().len(), 1);
    }

    #[tokio::test]
    async fn test_static_location_skips_discovery() {
        let sm = located();
        assert_eq!(sm.state(), ProvisioningState::HardwareUnknown);

        let incomplete = ServiceLocation {
            port: 0,
            ..location()
        };
        assert_eq!(machine().with_static_location(incomplete).state(), ProvisioningState::Unresolved);
    }

    #[tokio::test]
    async fn test_existing_hardware_is_adopted() {
        let mut api = MockDomoticzApi::new();
        api.expect_list_hardware()
            .times(2)
            .returning(|_| Ok(vec![hardware("1", "ESP_12345")]));
        api.expect_create_hardware().times(0);

        let mut transport = ScriptedTransport::new();
        let mut sm = located();
        assert_eq!(sm.tick(&api, &mut transport).await, ProvisioningState::DeviceUnknown);
        assert_eq!(sm.hardware_idx(), "1");

        // A second pass over the same listing still creates nothing
        sm.reset();
        sm.tick(&api, &mut transport).await;
        assert_eq!(sm.hardware_idx(), "1");
    }

    #[tokio::test]
    async fn test_missing_hardware_is_created_once() {
        let mut api = MockDomoticzApi::new();
        api.expect_list_hardware()
            .times(1)
            .returning(|_| Ok(vec![hardware("3", "Weather")]));
        api.expect_create_hardware()
            .withf(|_, name| name == "ESP_12345")
            .times(1)
            .returning(|_, _| Ok("7".to_string()));

        let mut transport = ScriptedTransport::new();
        let mut sm = located();
        assert_eq!(sm.tick(&api, &mut transport).await, ProvisioningState::DeviceUnknown);
        assert_eq!(sm.hardware_idx(), "7");
    }

    #[tokio::test]
    async fn test_device_found_without_create() {
        let mut api = MockDomoticzApi::new();
        api.expect_list_hardware()
            .returning(|_| Ok(vec![hardware("7", "ESP_12345")]));
        api.expect_list_devices()
            .withf(|_, filter| filter == "all")
            .times(1)
            .returning(|_, _| Ok(vec![device("42", "Temperature", "7")]));
        api.expect_create_device().times(0);

        let mut transport = ScriptedTransport::new();
        let mut sm = located();
        sm.tick(&api, &mut transport).await;
        assert_eq!(sm.tick(&api, &mut transport).await, ProvisioningState::Reporting);

        let registration = sm.registration().unwrap();
        assert_eq!(registration.hardware_idx, "7");
        assert_eq!(registration.device_idx, "42");
        assert_eq!(registration.location, location());
    }

    #[tokio::test]
    async fn test_missing_device_is_created() {
        let mut api = MockDomoticzApi::new();
        api.expect_list_hardware()
            .returning(|_| Ok(vec![hardware("7", "ESP_12345")]));
        api.expect_list_devices()
            .returning(|_, _| Ok(vec![device("40", "Temperature", "6")]));
        api.expect_create_device()
            .withf(|_, hardware_idx| hardware_idx == "7")
            .times(1)
            .returning(|_, _| Ok("43".to_string()));

        let mut transport = ScriptedTransport::new();
        let mut sm = located();
        sm.tick(&api, &mut transport).await;
        sm.tick(&api, &mut transport).await;
        assert_eq!(sm.device_idx(), "43");
        assert_eq!(sm.state(), ProvisioningState::Reporting);
    }

    #[tokio::test(start_paused = true)]
    async fn test_list_failure_never_creates_and_backs_off() {
        let mut api = MockDomoticzApi::new();
        let mut calls = 0;
        api.expect_list_hardware().times(2).returning(move |_| {
            calls += 1;
            if calls == 1 {
                Err(NodeError::http(500, "Internal Server Error"))
            } else {
                Ok(vec![hardware("1", "ESP_12345")])
            }
        });
        api.expect_create_hardware().times(0);

        let mut transport = ScriptedTransport::new();
        let mut sm = located();
        assert_eq!(sm.tick(&api, &mut transport).await, ProvisioningState::HardwareUnknown);
        assert!(sm.hardware_idx().is_empty());
        assert_eq!(sm.failures(), 1);

        // Inside the backoff window no request is made
        assert_eq!(sm.tick(&api, &mut transport).await, ProvisioningState::HardwareUnknown);

        tokio::time::advance(Duration::from_secs(1)).await;
        assert_eq!(sm.tick(&api, &mut transport).await, ProvisioningState::DeviceUnknown);
        assert_eq!(sm.failures(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_permanent_failure_waits_for_the_cap() {
        let mut api = MockDomoticzApi::new();
        let mut calls = 0;
        api.expect_list_hardware().times(2).returning(move |_| {
            calls += 1;
            if calls == 1 {
                Err(NodeError::invalid_input("Service location incomplete"))
            } else {
                Ok(vec![hardware("1", "ESP_12345")])
            }
        });

        let mut transport = ScriptedTransport::new();
        let mut sm = located();
        assert_eq!(sm.tick(&api, &mut transport).await, ProvisioningState::HardwareUnknown);
        assert_eq!(sm.failures(), 1);

        // A transient failure would retry after 1s; this one waits for max_delay
        tokio::time::advance(Duration::from_secs(1)).await;
        assert_eq!(sm.tick(&api, &mut transport).await, ProvisioningState::HardwareUnknown);

        tokio::time::advance(Duration::from_secs(7)).await;
        assert_eq!(sm.tick(&api, &mut transport).await, ProvisioningState::DeviceUnknown);
    }

    #[tokio::test(start_paused = true)]
    async fn test_huge_backoff_does_not_panic() {
        let mut api = MockDomoticzApi::new();
        api.expect_list_hardware()
            .times(1)
            .returning(|_| Err(NodeError::connection("refused")));

        let policy = BackoffPolicy {
            initial_delay: Duration::from_secs(u64::MAX),
            max_delay: Duration::from_secs(u64::MAX),
            multiplier: 2.0,
            jitter_factor: 0.25,
        };
        let locator = ServiceLocator::new(SERVICE, Duration::from_secs(30)).unwrap();
        let mut sm = ProvisioningStateMachine::new(locator, identity(), policy).with_static_location(location());

        let mut transport = ScriptedTransport::new();
        assert_eq!(sm.tick(&api, &mut transport).await, ProvisioningState::HardwareUnknown);
        assert_eq!(sm.tick(&api, &mut transport).await, ProvisioningState::HardwareUnknown);
        assert_eq!(sm.failures(), 1);
    }

    #[tokio::test]
    async fn test_create_failure_keeps_idx_empty() {
        let mut api = MockDomoticzApi::new();
        api.expect_list_hardware().returning(|_| Ok(Vec::new()));
        api.expect_create_hardware()
            .times(1)
            .returning(|_, _| Err(NodeError::malformed("Response has no idx")));

        let mut transport = ScriptedTransport::new();
        let mut sm = located();
        assert_eq!(sm.tick(&api, &mut transport).await, ProvisioningState::HardwareUnknown);
        assert!(sm.hardware_idx().is_empty());
        assert!(sm.registration().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_state_never_regresses() {
        let mut api = MockDomoticzApi::new();
        let mut hw_calls = 0;
        api.expect_list_hardware().returning(move |_| {
            hw_calls += 1;
            if hw_calls % 3 == 0 {
                Ok(vec![hardware("1", "ESP_12345")])
            } else {
                Err(NodeError::connection("refused"))
            }
        });
        let mut dev_calls = 0;
        api.expect_list_devices().returning(move |_, _| {
            dev_calls += 1;
            if dev_calls % 2 == 0 {
                Ok(vec![device("42", "Temperature", "1")])
            } else {
                Err(NodeError::timeout("slow"))
            }
        });

        let mut transport = ScriptedTransport::new();
        let mut sm = machine();
        let mut previous = sm.state();
        for tick in 0..60 {
            if tick == 5 {
                push_server_answers(&mut transport);
            }
            let state = sm.tick(&api, &mut transport).await;
            assert!(state >= previous, "{state} after {previous}");
            previous = state;
            tokio::time::advance(Duration::from_secs(10)).await;
        }
        assert_eq!(previous, ProvisioningState::Reporting);
    }

    #[tokio::test]
    async fn test_reset_returns_to_start() {
        let mut api = MockDomoticzApi::new();
        api.expect_list_hardware()
            .returning(|_| Ok(vec![hardware("1", "ESP_12345")]));

        let mut transport = ScriptedTransport::new();
        let mut sm = located();
        sm.tick(&api, &mut transport).await;
        sm.reset();
        assert_eq!(sm.state(), ProvisioningState::HardwareUnknown);
        assert!(sm.hardware_idx().is_empty());

        let mut sm = machine();
        sm.reset();
        assert_eq!(sm.state(), ProvisioningState::Unresolved);
        assert_eq!(sm.location(), &ServiceLocation::default());
    }

    #[test]
    fn test_state_display_and_order() {
        assert_eq!(ProvisioningState::HardwareUnknown.to_string(), "HARDWARE_UNKNOWN");
        assert!(ProvisioningState::Unresolved < ProvisioningState::Reporting);
    }
}
