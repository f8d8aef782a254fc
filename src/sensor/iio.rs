//! Linux IIO temperature/humidity sensor
//!
//! Kernel drivers such as `dht11` expose processed channels under
//! `/sys/bus/iio/devices/iio:deviceN/` in milli-units. Single-wire sensors
//! fail individual reads fairly often, so a read is attempted a few times
//! before it is reported as failed.

use super::{SensorDriver, SensorReading};
use crate::config::SensorConfig;
use crate::error::{NodeError, Result};
use async_trait::async_trait;
use std::ops::RangeInclusive;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

const TEMPERATURE_CHANNEL: &str = "in_temp_input";
const HUMIDITY_CHANNEL: &str = "in_humidityrelative_input";

const TEMPERATURE_RANGE: RangeInclusive<f32> = -40.0..=125.0;
const HUMIDITY_RANGE: RangeInclusive<f32> = 0.0..=100.0;

/// Sensor read through sysfs
#[derive(Debug, Clone)]
pub struct IioSensor {
    device: PathBuf,
    attempts: u32,
    retry_pause: Duration,
}

impl IioSensor {
    pub fn new(device: impl Into<PathBuf>, attempts: u32, retry_pause: Duration) -> Self {
        Self {
            device: device.into(),
            attempts: attempts.max(1),
            retry_pause,
        }
    }

    pub fn from_config(config: &SensorConfig) -> Self {
        Self::new(&config.iio_device, config.read_attempts, config.retry_pause)
    }

    pub fn device(&self) -> &Path {
        &self.device
    }

    async fn read_once(&self) -> Result<SensorReading> {
        let temperature = read_channel(&self.device, TEMPERATURE_CHANNEL, &TEMPERATURE_RANGE).await?;
        let humidity = read_channel(&self.device, HUMIDITY_CHANNEL, &HUMIDITY_RANGE).await?;
        Ok(SensorReading::new(temperature, humidity))
    }
}

#[async_trait]
impl SensorDriver for IioSensor {
    async fn read(&mut self) -> Result<SensorReading> {
        let mut attempt = 1;
        loop {
            match self.read_once().await {
                Ok(reading) => return Ok(reading),
                Err(e) if attempt < self.attempts => {
                    debug!("Sensor read {attempt}/{} failed: {e}", self.attempts);
                    attempt += 1;
                    tokio::time::sleep(self.retry_pause).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// Read one milli-unit channel and scale it
async fn read_channel(device: &Path, channel: &str, range: &RangeInclusive<f32>) -> Result<f32> {
    let path = device.join(channel);
    let raw = tokio::fs::read_to_string(&path)
        .await
        .map_err(|e| NodeError::sensor(format!("Reading {}: {e}", path.display())))?;

    let milli: i64 = raw
        .trim()
        .parse()
        .map_err(|e| NodeError::sensor(format!("{} holds {:?}: {e}", path.display(), raw.trim())))?;

    let value = milli as f32 / 1000.0;
    if !range.contains(&value) {
        return Err(NodeError::sensor(format!("{channel} value {value} outside {range:?}")));
    }
    Ok(value)
}
