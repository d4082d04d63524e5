//! ==============================================================================
//! drivers - one bounded read of one physical (or virtual) sensor
//! ==============================================================================
//!
//! contract:
//!     `read(config) -> Reading | DriverError`. every driver enforces its own
//!     deadline and returns instead of hanging. a driver opens its hardware
//!     handle at the start of a read and the handle is dropped before the
//!     read returns, whatever the outcome.
//!
//! relationships:
//!     - instantiated by: registry.rs
//!     - called by: scheduler.rs, commands/mod.rs (force read)
//!     - uses: hal.rs for serial and i2c handles
//!
//! ==============================================================================

pub mod dfrobot_ult;
pub mod frame;
pub mod hx711;
pub mod json_file;
pub mod line;
pub mod openweather;
pub mod serial_regex;
pub mod sht3x;
pub mod virtual_sensor;

use crate::domain::Reading;
use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;

pub use dfrobot_ult::DfrobotUltDriver;
pub use hx711::Hx711LoadCellDriver;
pub use json_file::DailyJsonFileDriver;
pub use openweather::OpenWeatherDriver;
pub use serial_regex::SerialRegexDriver;
pub use sht3x::Sht3xDriver;
pub use virtual_sensor::VirtualDriver;

pub const DEFAULT_BAUD_RATE: u32 = 9600;

/// extra time granted on top of a driver's own deadline before the
/// blocking session is abandoned from the async side
const BLOCKING_GRACE: Duration = Duration::from_secs(1);

#[derive(Debug, thiserror::Error)]
pub enum DriverError {
    #[error("invalid driver config: {0}")]
    Config(String),
    #[error("port error: {0:#}")]
    Port(anyhow::Error),
    #[error("no valid data within {0:?}")]
    Timeout(Duration),
    #[error("unparseable data: {0}")]
    Parse(String),
    #[error("no value: {0}")]
    NoValue(String),
    #[error("read task failed: {0}")]
    Join(String),
}

#[async_trait]
pub trait Driver: Send + Sync {
    /// registry name, used in logs
    fn name(&self) -> &'static str;

    async fn read(&self, config: &Value) -> Result<Reading, DriverError>;
}

/// runs a blocking port session off the async threads. `deadline` is the
/// session's own timeout; the join is abandoned shortly after it so a wedged
/// syscall cannot hold up the caller.
pub(crate) async fn run_blocking<F>(deadline: Duration, session: F) -> Result<Reading, DriverError>
where
    F: FnOnce() -> Result<Reading, DriverError> + Send + 'static,
{
    let handle = tokio::task::spawn_blocking(session);
    match tokio::time::timeout(deadline + BLOCKING_GRACE, handle).await {
        Ok(Ok(result)) => result,
        Ok(Err(e)) => Err(DriverError::Join(e.to_string())),
        Err(_) => Err(DriverError::Timeout(deadline)),
    }
}

/// `port` and `baudrate` from a serial sensor's config
pub(crate) fn serial_params(config: &Value) -> Result<(String, u32), DriverError> {
    let port = config
        .get("port")
        .and_then(Value::as_str)
        .filter(|p| !p.is_empty())
        .ok_or_else(|| DriverError::Config("'port' is not set".into()))?;
    let baud = match config.get("baudrate") {
        None | Some(Value::Null) => DEFAULT_BAUD_RATE,
        Some(v) => as_u64(v)
            .and_then(|b| u32::try_from(b).ok())
            .ok_or_else(|| DriverError::Config(format!("invalid baudrate {}", v)))?,
    };
    Ok((port.to_string(), baud))
}

/// optional seconds override, e.g. `timeout_secs`
pub(crate) fn duration_param(config: &Value, key: &str, default: Duration) -> Duration {
    config
        .get(key)
        .and_then(Value::as_f64)
        .filter(|s| *s > 0.0)
        .map(Duration::from_secs_f64)
        .unwrap_or(default)
}

pub(crate) fn str_param<'a>(config: &'a Value, key: &str) -> Option<&'a str> {
    config.get(key).and_then(Value::as_str)
}

/// integers may arrive as json numbers or as strings ("9600", "0x44")
pub(crate) fn as_u64(v: &Value) -> Option<u64> {
    match v {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => {
            let s = s.trim();
            match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
                Some(hex) => u64::from_str_radix(hex, 16).ok(),
                None => s.parse().ok(),
            }
        }
        _ => None,
    }
}

pub(crate) fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}
