//! HX711 load cell behind a microcontroller that prints `= 12.34` lines.
//!
//! The board resets when the port opens, so the session waits two seconds
//! before listening. A `-` anywhere in a line is the board's tare /
//! under-range indicator and is reported as a zero weight.

use super::line::{first_float, LineSession};
use super::{duration_param, run_blocking, serial_params, Driver, DriverError};
use crate::domain::Reading;
use crate::hal::HardwareProvider;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

pub const READ_TIMEOUT: Duration = Duration::from_secs(7);
pub const SETTLE: Duration = Duration::from_secs(2);

pub struct Hx711LoadCellDriver {
    hal: Arc<dyn HardwareProvider>,
}

impl Hx711LoadCellDriver {
    pub fn new(hal: Arc<dyn HardwareProvider>) -> Self {
        Self { hal }
    }
}

/// `{weight_kg}` from one line, if the line carries a weight
pub fn parse_weight_line(line: &str) -> Option<Reading> {
    if line.contains('-') {
        return Some(Reading::single("weight_kg", 0.0));
    }
    let rest = line.strip_prefix('=')?;
    first_float(rest).map(|kg| Reading::single("weight_kg", kg))
}

#[async_trait]
impl Driver for Hx711LoadCellDriver {
    fn name(&self) -> &'static str {
        "hx711_load_cell"
    }

    async fn read(&self, config: &Value) -> Result<Reading, DriverError> {
        let (port, baud) = serial_params(config)?;
        let mut session = LineSession::new(port, baud, duration_param(config, "timeout_secs", READ_TIMEOUT));
        session.settle = duration_param(config, "settle_secs", SETTLE);

        let hal = self.hal.clone();
        let deadline = session.timeout;
        run_blocking(deadline, move || session.run(hal.as_ref(), "hx711", parse_weight_line)).await
    }
}
