//! Steady-state reporting of sensor samples
//!
//! One sample per invocation. Failed reads and failed updates are logged
//! and dropped; the next scheduled invocation tries again.

use crate::client::DomoticzApi;
use crate::provisioning::Registration;
use crate::sensor::{SensorDriver, SensorReading};
use tracing::{debug, info, warn};

/// Result of one reporting cycle
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ReportOutcome {
    /// Sample read and accepted by the server
    Sent(SensorReading),
    /// Sensor read failed; nothing was sent
    SensorFailed,
    /// Sample read but the update request failed
    UpdateFailed(SensorReading),
}

/// Reads the sensor and pushes samples to the registered device
pub struct ReportingLoop {
    registration: Registration,
    sensor: Box<dyn SensorDriver>,
    sent: u64,
}

impl ReportingLoop {
    pub fn new(registration: Registration, sensor: Box<dyn SensorDriver>) -> Self {
        info!(
            "Reporting to device {} on hardware {} at {}",
            registration.device_idx, registration.hardware_idx, registration.location
        );
        Self {
            registration,
            sensor,
            sent: 0,
        }
    }

    pub fn registration(&self) -> &Registration {
        &self.registration
    }

    /// Samples accepted by the server so far
    pub fn sent(&self) -> u64 {
        self.sent
    }

    /// Run one cycle
    pub async fn report_once(&mut self, api: &dyn DomoticzApi) -> ReportOutcome {
        let reading = match self.sensor.read().await {
            Ok(reading) => reading,
            Err(e) => {
                warn!("Skipping report, sensor read failed: {e}");
                return ReportOutcome::SensorFailed;
            }
        };

        let registration = &self.registration;
        match api
            .update_sensor(
                &registration.location,
                &registration.device_idx,
                reading.temperature,
                reading.humidity,
            )
            .await
        {
            Ok(()) => {
                self.sent += 1;
                debug!("Reported {reading} to device {}", registration.device_idx);
                ReportOutcome::Sent(reading)
            }
            Err(e) => {
                warn!("Update of device {} failed: {e}", registration.device_idx);
                ReportOutcome::UpdateFailed(reading)
            }
        }
    }
}
