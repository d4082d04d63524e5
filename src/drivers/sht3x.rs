//! Sensirion SHT3x (SHT30/31/35) temperature and humidity over I2C.
//!
//! Request/response: a single-shot measurement command (high repeatability,
//! no clock stretching) is written, the sensor is given time to convert, and
//! six bytes are read back: `[t_hi, t_lo, t_crc, rh_hi, rh_lo, rh_crc]`.
//! A response is only accepted when both CRCs check out.

use super::{as_u64, round_to, run_blocking, Driver, DriverError};
use crate::domain::Reading;
use crate::hal::HardwareProvider;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

pub const READ_TIMEOUT: Duration = Duration::from_secs(3);
pub const DEFAULT_ADDRESS: u16 = 0x44;
pub const DEFAULT_BUS: u8 = 1;

const SINGLE_SHOT_HIGH: [u8; 2] = [0x24, 0x00];
const CONVERSION_TIME: Duration = Duration::from_millis(16);

pub struct Sht3xDriver {
    hal: Arc<dyn HardwareProvider>,
}

impl Sht3xDriver {
    pub fn new(hal: Arc<dyn HardwareProvider>) -> Self {
        Self { hal }
    }
}

/// CRC-8, polynomial 0x31, init 0xFF
pub fn crc8(data: &[u8]) -> u8 {
    let mut crc: u8 = 0xFF;
    for &byte in data {
        crc ^= byte;
        for _ in 0..8 {
            crc = if crc & 0x80 != 0 { (crc << 1) ^ 0x31 } else { crc << 1 };
        }
    }
    crc
}

/// Decodes a 6-byte measurement into `{temperature, humidity}`
pub fn decode_measurement(raw: &[u8]) -> Result<Reading, DriverError> {
    if raw.len() != 6 {
        return Err(DriverError::Parse(format!("expected 6 bytes, got {}", raw.len())));
    }
    for word in raw.chunks(3) {
        if crc8(&word[..2]) != word[2] {
            return Err(DriverError::Parse(format!("crc mismatch in {}", hex::encode(raw))));
        }
    }

    let t_raw = f64::from(u16::from_be_bytes([raw[0], raw[1]]));
    let rh_raw = f64::from(u16::from_be_bytes([raw[3], raw[4]]));
    let temperature = -45.0 + 175.0 * t_raw / 65535.0;
    let humidity = 100.0 * rh_raw / 65535.0;

    let mut reading = Reading::new();
    reading.insert_number("temperature", round_to(temperature, 2));
    reading.insert_number("humidity", round_to(humidity, 2));
    Ok(reading)
}

fn address(config: &Value) -> Result<u16, DriverError> {
    match config.get("address") {
        None | Some(Value::Null) => Ok(DEFAULT_ADDRESS),
        Some(v) => as_u64(v)
            .and_then(|a| u16::try_from(a).ok())
            .filter(|a| *a <= 0x7F)
            .ok_or_else(|| DriverError::Config(format!("invalid i2c address {} (expected e.g. \"0x44\")", v))),
    }
}

fn bus(config: &Value) -> Result<u8, DriverError> {
    match config.get("bus") {
        None | Some(Value::Null) => Ok(DEFAULT_BUS),
        Some(v) => as_u64(v)
            .and_then(|b| u8::try_from(b).ok())
            .ok_or_else(|| DriverError::Config(format!("invalid i2c bus {}", v))),
    }
}

#[async_trait]
impl Driver for Sht3xDriver {
    fn name(&self) -> &'static str {
        "sht3x"
    }

    async fn read(&self, config: &Value) -> Result<Reading, DriverError> {
        let addr = address(config)?;
        let bus = bus(config)?;
        let hal = self.hal.clone();

        run_blocking(READ_TIMEOUT, move || {
            let raw = hal
                .i2c_transfer(bus, addr, &SINGLE_SHOT_HIGH, CONVERSION_TIME, 6)
                .map_err(|e| {
                    DriverError::Port(e.context(format!(
                        "i2c bus {} address 0x{:02X} (check with 'i2cdetect -y {}')",
                        bus, addr, bus
                    )))
                })?;
            decode_measurement(&raw)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_crc8_datasheet_vector() {
        // Sensirion datasheet example: 0xBEEF -> 0x92
        assert_eq!(crc8(&[0xBE, 0xEF]), 0x92);
    }

    #[test]
    fn test_decode_measurement() {
        let t = [0x66, 0x66];
        let rh = [0x80, 0x00];
        let raw = [t[0], t[1], crc8(&t), rh[0], rh[1], crc8(&rh)];
        let r = decode_measurement(&raw).unwrap();
        // 0x6666 = 26214 -> -45 + 175 * 0.4 = 25.0
        assert_eq!(r.number("temperature"), Some(25.0));
        assert_eq!(r.number("humidity"), Some(50.0));
    }

    #[test]
    fn test_decode_rejects_bad_crc() {
        let raw = [0x66, 0x66, 0x00, 0x80, 0x00, 0x00];
        assert!(matches!(decode_measurement(&raw), Err(DriverError::Parse(_))));
    }

    #[test]
    fn test_address_parsing() {
        assert_eq!(address(&json!({})).unwrap(), 0x44);
        assert_eq!(address(&json!({"address": "0x45"})).unwrap(), 0x45);
        assert_eq!(address(&json!({"address": 69})).unwrap(), 0x45);
        assert!(address(&json!({"address": "banana"})).is_err());
        assert!(address(&json!({"address": "0x1FF"})).is_err());
    }
}
