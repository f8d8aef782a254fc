//! Node runtime
//!
//! A single task alternates between one step and a sleep. Provisioning steps
//! run on the short provisioning cadence; once registered the node switches
//! to the reporting cadence and sends its first sample right away.

use crate::client::DomoticzApi;
use crate::config::NodeConfig;
use crate::discovery::DiscoveryTransport;
use crate::error::Result;
use crate::provisioning::{ProvisioningState, ProvisioningStateMachine};
use crate::reporting::{ReportOutcome, ReportingLoop};
use crate::sensor::SensorDriver;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval, Interval, MissedTickBehavior};
use tracing::{debug, info};

/// What one step did
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StepOutcome {
    /// Provisioning tick; carries the state after the tick
    Provisioning(ProvisioningState),
    /// Reporting cycle
    Reported(ReportOutcome),
}

/// Provisioning state machine plus reporting loop on one schedule
pub struct Node {
    api: Arc<dyn DomoticzApi>,
    transport: Box<dyn DiscoveryTransport>,
    provisioning: ProvisioningStateMachine,
    sensor: Option<Box<dyn SensorDriver>>,
    reporting: Option<ReportingLoop>,
    provisioning_interval: Duration,
    reporting_interval: Duration,
}

impl Node {
    pub fn new(
        api: Arc<dyn DomoticzApi>,
        transport: Box<dyn DiscoveryTransport>,
        provisioning: ProvisioningStateMachine,
        sensor: Box<dyn SensorDriver>,
        provisioning_interval: Duration,
        reporting_interval: Duration,
    ) -> Self {
        Self {
            api,
            transport,
            provisioning,
            sensor: Some(sensor),
            reporting: None,
            provisioning_interval,
            reporting_interval,
        }
    }

    /// Wire a node from validated configuration
    pub fn from_config(
        config: &NodeConfig,
        api: Arc<dyn DomoticzApi>,
        transport: Box<dyn DiscoveryTransport>,
        sensor: Box<dyn SensorDriver>,
    ) -> Result<Self> {
        let mut provisioning =
            ProvisioningStateMachine::new(config.locator()?, config.identity(), config.backoff.clone());
        if let Some(location) = config.static_location()? {
            provisioning = provisioning.with_static_location(location);
        }

        Ok(Self::new(
            api,
            transport,
            provisioning,
            sensor,
            config.provisioning_interval,
            config.reporting_interval,
        ))
    }

    pub fn state(&self) -> ProvisioningState {
        self.provisioning.state()
    }

    pub fn provisioning(&self) -> &ProvisioningStateMachine {
        &self.provisioning
    }

    /// Present once the node is reporting
    pub fn reporting(&self) -> Option<&ReportingLoop> {
        self.reporting.as_ref()
    }

    /// Period until the next step
    pub fn cadence(&self) -> Duration {
        if self.reporting.is_some() {
            self.reporting_interval
        } else {
            self.provisioning_interval
        }
    }

    /// Run one provisioning tick or one reporting cycle
    pub async fn step(&mut self) -> StepOutcome {
        if let Some(reporting) = &mut self.reporting {
            return StepOutcome::Reported(reporting.report_once(self.api.as_ref()).await);
        }

        let state = self
            .provisioning
            .tick(self.api.as_ref(), self.transport.as_mut())
            .await;

        if state == ProvisioningState::Reporting {
            if let (Some(registration), Some(sensor)) =
                (self.provisioning.registration(), self.sensor.take())
            {
                self.reporting = Some(ReportingLoop::new(registration, sensor));
            }
        }

        StepOutcome::Provisioning(state)
    }

    /// Step on schedule until `shutdown` resolves. Shutdown is only observed
    /// between steps; a step in progress runs to completion.
    pub async fn run_until<F>(&mut self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);

        let mut cadence = self.cadence();
        let mut ticker = schedule(cadence);
        info!("Node started in {}, ticking every {cadence:?}", self.state());

        loop {
            tokio::select! {
                biased;
                _ = &mut shutdown => {
                    info!("Shutdown requested in {}", self.state());
                    break;
                }
                _ = ticker.tick() => {}
            }

            let outcome = self.step().await;
            debug!("Step: {outcome:?}");

            let next = self.cadence();
            if next != cadence {
                info!("Switching cadence from {cadence:?} to {next:?}");
                cadence = next;
                // A fresh interval fires immediately
                ticker = schedule(cadence);
            }
        }
    }
}

fn schedule(period: Duration) -> Interval {
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker
}
