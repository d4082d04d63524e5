//! ==============================================================================
//! scheduler.rs - periodic sensor polling
//! ==============================================================================
//!
//! purpose:
//!     once per tick, walks the active non-virtual sensors in configuration
//!     order and reads the ones that are due.
//!
//! rules:
//!     - nothing happens unless the agent is Online.
//!     - interval: global_read_frequency_seconds when > 0, else the sensor's
//!       own read_frequency.
//!     - the last-read time is stamped BEFORE the read starts, so a slow or
//!       hung read is not re-triggered by the next tick.
//!     - due sensors are read strictly one after another: open, read, decode,
//!       report, close, then the next one. shared buses (one i2c bus, one
//!       rs485 line) corrupt overlapping transactions, so this loop must never
//!       be parallelized.
//!     - a failing sensor is logged and skipped; the rest of the tick goes on.
//!
//! relationships:
//!     - reads: context.rs (config snapshot, state, bus guard)
//!     - uses: registry.rs, reporter.rs
//!
//! ==============================================================================

use crate::context::AgentContext;
use crate::domain::{Id, Reading, SensorConfig};
use crate::drivers::DriverError;
use crate::registry::{DriverRegistry, RegistryError};
use crate::reporter::Reporter;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, thiserror::Error)]
pub enum SensorReadError {
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error(transparent)]
    Driver(#[from] DriverError),
}

/// What happened to one due sensor during a tick
#[derive(Debug, Clone, PartialEq)]
pub enum ReadOutcome {
    Reported(Reading),
    /// the driver timed out, failed to parse, or had nothing to say
    NoValue(String),
    UnknownDriver(String),
    /// decoded fine but the server did not take it
    ReportFailed(Reading),
}

#[derive(Debug, Clone, PartialEq)]
pub struct SensorRead {
    pub sensor: Id,
    pub outcome: ReadOutcome,
}

/// Resolves the sensor's driver and performs one read while holding the bus
/// guard. Used by the scheduler and by FORCE_READ_SENSOR.
pub async fn read_sensor(
    ctx: &AgentContext,
    registry: &DriverRegistry,
    sensor: &SensorConfig,
) -> Result<Reading, SensorReadError> {
    let driver = registry.get_or_create(sensor.driver())?;
    let _bus = ctx.lock_bus().await;
    tracing::debug!(sensor = %sensor.id, driver = driver.name(), "read started: {}", sensor.name);
    let result = driver.read(&sensor.config).await;
    tracing::debug!(sensor = %sensor.id, "read finished: {}", sensor.name);
    Ok(result?)
}

pub struct PollScheduler {
    ctx: Arc<AgentContext>,
    registry: Arc<DriverRegistry>,
    reporter: Reporter,
    last_read: HashMap<Id, Instant>,
}

impl PollScheduler {
    pub fn new(ctx: Arc<AgentContext>, registry: Arc<DriverRegistry>, reporter: Reporter) -> Self {
        Self {
            ctx,
            registry,
            reporter,
            last_read: HashMap::new(),
        }
    }

    fn is_due(&self, id: &Id, interval: Duration, now: Instant) -> bool {
        match self.last_read.get(id) {
            None => true,
            Some(last) => now.saturating_duration_since(*last) >= interval,
        }
    }

    /// One scheduler tick. Returns what happened to every sensor that was due.
    pub async fn tick(&mut self, now: Instant) -> Vec<SensorRead> {
        if !self.ctx.state.is_online() {
            return Vec::new();
        }
        let Some(config) = self.ctx.config() else {
            return Vec::new();
        };
        // sensors dropped or deactivated since the last tick start over when they return
        self.last_read
            .retain(|id, _| config.pollable_sensors().any(|s| &s.id == id));

        let mut reads = Vec::new();
        for sensor in config.pollable_sensors() {
            let interval = config.effective_interval(sensor);
            if !self.is_due(&sensor.id, interval, now) {
                continue;
            }
            self.last_read.insert(sensor.id.clone(), now);

            let outcome = self.poll_sensor(sensor).await;
            reads.push(SensorRead {
                sensor: sensor.id.clone(),
                outcome,
            });
        }
        reads
    }

    async fn poll_sensor(&self, sensor: &SensorConfig) -> ReadOutcome {
        match read_sensor(&self.ctx, &self.registry, sensor).await {
            Ok(reading) => match self.reporter.submit(&sensor.id, &reading).await {
                Ok(()) => ReadOutcome::Reported(reading),
                Err(_) => ReadOutcome::ReportFailed(reading),
            },
            Err(SensorReadError::Registry(e)) => {
                tracing::warn!(sensor = %sensor.id, "skipping {}: {}", sensor.name, e);
                ReadOutcome::UnknownDriver(sensor.driver().to_string())
            }
            Err(SensorReadError::Driver(e)) => {
                tracing::warn!(sensor = %sensor.id, driver = sensor.driver(), "no data from {}: {}", sensor.name, e);
                ReadOutcome::NoValue(e.to_string())
            }
        }
    }
}
