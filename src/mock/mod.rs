//! Mock collaborators for testing
//!
//! Scripted stand-ins for the discovery transport and the sensor driver.
//! Clones share their script, so a test can keep a handle after moving the
//! mock into a [`crate::node::Node`].

use crate::discovery::{DiscoveryAnswer, DiscoveryTransport};
use crate::error::{NodeError, Result};
use crate::sensor::{SensorDriver, SensorReading};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Debug, Default)]
struct TransportScript {
    queries: Vec<String>,
    pending: VecDeque<DiscoveryAnswer>,
    fail_sends: bool,
}

/// Discovery transport that records queries and replays queued answers
#[derive(Debug, Clone, Default)]
pub struct ScriptedTransport {
    script: Arc<Mutex<TransportScript>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue an answer for the next poll
    pub fn push_answer(&self, answer: DiscoveryAnswer) {
        self.lock().pending.push_back(answer);
    }

    /// Make every subsequent `send` fail
    pub fn fail_sends(&self, fail: bool) {
        self.lock().fail_sends = fail;
    }

    /// Query names sent so far, oldest first
    pub fn queries(&self) -> Vec<String> {
        self.lock().queries.clone()
    }

    fn lock(&self) -> MutexGuard<'_, TransportScript> {
        // A test that panicked while holding the lock already failed
        self.script.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl DiscoveryTransport for ScriptedTransport {
    fn send(&mut self, query_name: &str) -> Result<()> {
        let mut script = self.lock();
        script.queries.push(query_name.to_string());
        if script.fail_sends {
            return Err(NodeError::discovery("scripted send failure"));
        }
        Ok(())
    }

    fn poll_answers(&mut self) -> Vec<DiscoveryAnswer> {
        self.lock().pending.drain(..).collect()
    }
}

#[derive(Debug, Default)]
struct SensorScript {
    samples: VecDeque<Option<SensorReading>>,
    reads: usize,
}

/// Sensor returning scripted samples; `None` entries and an exhausted
/// script produce read errors
#[derive(Debug, Clone, Default)]
pub struct ScriptedSensor {
    script: Arc<Mutex<SensorScript>>,
}

impl ScriptedSensor {
    pub fn new(samples: impl IntoIterator<Item = Option<SensorReading>>) -> Self {
        Self {
            script: Arc::new(Mutex::new(SensorScript {
                samples: samples.into_iter().collect(),
                reads: 0,
            })),
        }
    }

    /// Sensor yielding `reading` for the first `count` reads
    pub fn repeating(reading: SensorReading, count: usize) -> Self {
        Self::new(std::iter::repeat(Some(reading)).take(count))
    }

    /// Number of `read` calls so far
    pub fn reads(&self) -> usize {
        self.lock().reads
    }

    fn lock(&self) -> MutexGuard<'_, SensorScript> {
        self.script.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl SensorDriver for ScriptedSensor {
    async fn read(&mut self) -> Result<SensorReading> {
        let mut script = self.lock();
        script.reads += 1;
        match script.samples.pop_front() {
            Some(Some(reading)) => Ok(reading),
            Some(None) => Err(NodeError::sensor("scripted read failure")),
            None => Err(NodeError::sensor("script exhausted")),
        }
    }
}
