//! Temperature/humidity sensor access

pub mod iio;

use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

pub use iio::IioSensor;

/// One temperature/humidity sample
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SensorReading {
    /// Degrees Celsius
    pub temperature: f32,
    /// Relative humidity in percent
    pub humidity: f32,
}

impl SensorReading {
    pub fn new(temperature: f32, humidity: f32) -> Self {
        Self {
            temperature,
            humidity,
        }
    }
}

impl fmt::Display for SensorReading {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.1}°C {:.1}%RH", self.temperature, self.humidity)
    }
}

/// Sensor driver collaborator
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SensorDriver: Send {
    /// Take one sample; any retrying is the driver's business
    async fn read(&mut self) -> Result<SensorReading>;
}
