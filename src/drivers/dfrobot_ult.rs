//! DFRobot ultrasonic / TF-Luna style distance sensor on a serial port.
//!
//! Streams 4-byte frames `[0xFF, mm_hi, mm_lo, sum]`; see `frame.rs`.

use super::frame::FrameDecoder;
use super::{run_blocking, serial_params, round_to, Driver, DriverError};
use crate::domain::Reading;
use crate::hal::HardwareProvider;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use std::time::{Duration, Instant};

pub const READ_TIMEOUT: Duration = Duration::from_secs(3);

pub struct DfrobotUltDriver {
    hal: Arc<dyn HardwareProvider>,
}

impl DfrobotUltDriver {
    pub fn new(hal: Arc<dyn HardwareProvider>) -> Self {
        Self { hal }
    }
}

/// millimetres to centimetres, one decimal
pub fn mm_to_cm(mm: u16) -> f64 {
    round_to(f64::from(mm) / 10.0, 1)
}

fn read_session(
    hal: &dyn HardwareProvider,
    port: &str,
    baud: u32,
    timeout: Duration,
) -> Result<Reading, DriverError> {
    let started = Instant::now();
    let mut link = hal.open_serial(port, baud).map_err(DriverError::Port)?;
    let mut decoder = FrameDecoder::new();
    let mut chunk = [0u8; 64];

    while started.elapsed() < timeout {
        let n = link.read(&mut chunk).map_err(DriverError::Port)?;
        if n == 0 {
            continue;
        }
        tracing::trace!("[dfrobot_ult] {} <- {}", port, hex::encode(&chunk[..n]));
        decoder.extend(&chunk[..n]);

        if let Some(mm) = decoder.next_value() {
            let cm = mm_to_cm(mm);
            tracing::debug!("[dfrobot_ult] {} mm -> {} cm", mm, cm);
            return Ok(Reading::single("distance_cm", cm));
        }
    }

    tracing::warn!(
        "[dfrobot_ult] no valid frame from {} ({} checksum failures)",
        port,
        decoder.checksum_failures()
    );
    Err(DriverError::Timeout(timeout))
}

#[async_trait]
impl Driver for DfrobotUltDriver {
    fn name(&self) -> &'static str {
        "dfrobot_ult"
    }

    async fn read(&self, config: &Value) -> Result<Reading, DriverError> {
        let (port, baud) = serial_params(config)?;
        let hal = self.hal.clone();
        run_blocking(READ_TIMEOUT, move || read_session(hal.as_ref(), &port, baud, READ_TIMEOUT)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mm_to_cm() {
        assert_eq!(mm_to_cm(1234), 123.4);
        assert_eq!(mm_to_cm(258), 25.8);
        assert_eq!(mm_to_cm(0), 0.0);
    }
}
