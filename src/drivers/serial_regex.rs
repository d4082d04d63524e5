//! Generic line-oriented serial sensors.
//!
//! Config keys:
//! - `pattern`: regex whose named groups become reading fields. Without it
//!   the first number in a line is reported under `key` (default `value`).
//! - `trigger` (string, newline appended) or `trigger_byte` (integer): sent
//!   once the port is open, for sensors that answer on request.
//! - `timeout_secs`: overrides the 5 s default.
//!
//! `serial_temp_humidity` is the same driver preset to `t,h` lines.

use super::line::{captures_to_reading, first_float, LineSession};
use super::{as_u64, duration_param, run_blocking, serial_params, str_param, Driver, DriverError};
use crate::domain::Reading;
use crate::hal::HardwareProvider;
use async_trait::async_trait;
use regex::Regex;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

pub const READ_TIMEOUT: Duration = Duration::from_secs(5);

pub const TEMP_HUMIDITY_PATTERN: &str =
    r"(?P<temperature>[-+]?\d+(?:\.\d+)?)\s*,\s*(?P<humidity>[-+]?\d+(?:\.\d+)?)";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Preset {
    Configurable,
    TempHumidity,
}

pub struct SerialRegexDriver {
    hal: Arc<dyn HardwareProvider>,
    preset: Preset,
}

/// how a line turns into a reading
enum LineRule {
    FirstFloat(String),
    Pattern(Regex),
}

impl LineRule {
    fn apply(&self, line: &str) -> Option<Reading> {
        match self {
            LineRule::FirstFloat(key) => first_float(line).map(|v| Reading::single(key, v)),
            LineRule::Pattern(re) => captures_to_reading(re, line),
        }
    }
}

impl SerialRegexDriver {
    pub fn new(hal: Arc<dyn HardwareProvider>) -> Self {
        Self { hal, preset: Preset::Configurable }
    }

    pub fn temp_humidity(hal: Arc<dyn HardwareProvider>) -> Self {
        Self { hal, preset: Preset::TempHumidity }
    }

    fn rule(&self, config: &Value) -> Result<LineRule, DriverError> {
        let pattern = match (self.preset, str_param(config, "pattern")) {
            (_, Some(p)) => Some(p),
            (Preset::TempHumidity, None) => Some(TEMP_HUMIDITY_PATTERN),
            (Preset::Configurable, None) => None,
        };
        match pattern {
            Some(p) => Regex::new(p)
                .map(LineRule::Pattern)
                .map_err(|e| DriverError::Config(format!("bad pattern: {}", e))),
            None => Ok(LineRule::FirstFloat(
                str_param(config, "key").unwrap_or("value").to_string(),
            )),
        }
    }
}

fn trigger_bytes(config: &Value) -> Result<Option<Vec<u8>>, DriverError> {
    if let Some(cmd) = str_param(config, "trigger") {
        let mut bytes = cmd.as_bytes().to_vec();
        bytes.push(b'\n');
        return Ok(Some(bytes));
    }
    match config.get("trigger_byte") {
        None | Some(Value::Null) => Ok(None),
        Some(v) => as_u64(v)
            .and_then(|b| u8::try_from(b).ok())
            .map(|b| Some(vec![b]))
            .ok_or_else(|| DriverError::Config(format!("invalid trigger_byte {}", v))),
    }
}

#[async_trait]
impl Driver for SerialRegexDriver {
    fn name(&self) -> &'static str {
        match self.preset {
            Preset::Configurable => "serial_regex",
            Preset::TempHumidity => "serial_temp_humidity",
        }
    }

    async fn read(&self, config: &Value) -> Result<Reading, DriverError> {
        let (port, baud) = serial_params(config)?;
        let rule = self.rule(config)?;
        let mut session = LineSession::new(port, baud, duration_param(config, "timeout_secs", READ_TIMEOUT));
        session.trigger = trigger_bytes(config)?;

        let hal = self.hal.clone();
        let tag = self.name();
        let deadline = session.timeout;
        run_blocking(deadline, move || session.run(hal.as_ref(), tag, |line| rule.apply(line))).await
    }
}
