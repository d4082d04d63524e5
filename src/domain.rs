//! ==============================================================================
//! domain.rs - data exchanged with the control server
//! ==============================================================================
//!
//! purpose:
//!     the device configuration snapshot (sensors, cameras, global interval),
//!     the reading value object produced by drivers, and queued commands.
//!
//! relationships:
//!     - produced by: client.rs (deserialized from server json)
//!     - read by: scheduler.rs, commands/mod.rs
//!     - produced by drivers: Reading
//!
//! ==============================================================================

use serde::de::{self, DeserializeOwned};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::time::Duration;

/// read interval used when the server sends none for a sensor
pub const DEFAULT_READ_FREQUENCY_SECS: u64 = 300;

/// server-side identifier; the dashboard emits sqlite integer ids but older
/// configs carry strings, so both are accepted and echoed back unchanged
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Id {
    Num(i64),
    Text(String),
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Id::Num(n) => write!(f, "{}", n),
            Id::Text(s) => f.write_str(s),
        }
    }
}

impl From<i64> for Id {
    fn from(n: i64) -> Self {
        Id::Num(n)
    }
}

impl From<&str> for Id {
    fn from(s: &str) -> Self {
        Id::Text(s.to_string())
    }
}

/// authoritative snapshot of what this device should do.
///
/// rows that cannot be understood are dropped with a warning; the rest of the
/// snapshot still applies.
/// replaced wholesale on every successful sync, never patched in place.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeviceConfig {
    #[serde(default, deserialize_with = "lenient_sensors")]
    pub sensors: Vec<SensorConfig>,
    #[serde(default, deserialize_with = "lenient_cameras")]
    pub cameras: Vec<CameraConfig>,
    /// when positive, overrides every sensor's own read_frequency
    #[serde(default, alias = "global_read_frequency", deserialize_with = "global_frequency")]
    pub global_read_frequency_seconds: Option<u64>,
}

impl DeviceConfig {
    pub fn sensor(&self, id: &Id) -> Option<&SensorConfig> {
        self.sensors.iter().find(|s| &s.id == id)
    }

    pub fn camera(&self, id: &Id) -> Option<&CameraConfig> {
        self.cameras.iter().find(|c| &c.id == id)
    }

    /// active sensors that are read by periodic polling, in config order
    pub fn pollable_sensors(&self) -> impl Iterator<Item = &SensorConfig> {
        self.sensors
            .iter()
            .filter(|s| s.is_active && s.interface != Interface::Virtual)
    }

    /// interval after which `sensor` is due again
    pub fn effective_interval(&self, sensor: &SensorConfig) -> Duration {
        match self.global_read_frequency_seconds {
            Some(global) if global > 0 => Duration::from_secs(global),
            _ => Duration::from_secs(sensor.read_frequency),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Interface {
    Serial,
    I2c,
    Http,
    Virtual,
    #[serde(other)]
    Other,
}

/// names the driver used to decode a sensor's output
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ParserConfig {
    #[serde(default, deserialize_with = "null_as_default")]
    pub driver: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SensorConfig {
    pub id: Id,
    #[serde(default, deserialize_with = "null_as_default")]
    pub name: String,
    /// sqlite has no boolean column type, so 0/1 arrive here too
    #[serde(default, deserialize_with = "truthy")]
    pub is_active: bool,
    pub interface: Interface,
    #[serde(default, deserialize_with = "null_as_default")]
    pub parser_config: ParserConfig,
    /// driver-specific settings (port/baud, bus/address, url, ...)
    #[serde(default)]
    pub config: Value,
    #[serde(default = "default_read_frequency", deserialize_with = "frequency_secs")]
    pub read_frequency: u64,
}

fn default_read_frequency() -> u64 {
    DEFAULT_READ_FREQUENCY_SECS
}

// ------------------------------------------------------------------------------
// server json is loosely typed
// ------------------------------------------------------------------------------

fn lenient_sensors<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<SensorConfig>, D::Error> {
    lenient_rows(d, "sensor")
}

fn lenient_cameras<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<CameraConfig>, D::Error> {
    lenient_rows(d, "camera")
}

/// Decodes a list row by row, skipping the rows that do not decode.
fn lenient_rows<'de, D, T>(d: D, kind: &str) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let rows = Option::<Vec<Value>>::deserialize(d)?.unwrap_or_default();
    Ok(rows
        .into_iter()
        .filter_map(|row| {
            let id = row.get("id").cloned().unwrap_or(Value::Null);
            match serde_json::from_value(row) {
                Ok(item) => Some(item),
                Err(e) => {
                    tracing::warn!("skipping {} {}: {}", kind, id, e);
                    None
                }
            }
        })
        .collect())
}

fn null_as_default<'de, D, T>(d: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Option::<T>::deserialize(d).map(Option::unwrap_or_default)
}

fn truthy<'de, D: Deserializer<'de>>(d: D) -> Result<bool, D::Error> {
    match Value::deserialize(d)? {
        Value::Null => Ok(false),
        Value::Bool(b) => Ok(b),
        Value::Number(n) => Ok(n.as_f64().is_some_and(|v| v != 0.0)),
        Value::String(s) => Ok(matches!(s.trim(), "1" | "true" | "TRUE" | "True")),
        other => Err(de::Error::custom(format!("expected a boolean or 0/1, got {}", other))),
    }
}

/// number of seconds as int, float or numeric string; null is None
fn seconds<E: de::Error>(value: Value) -> Result<Option<f64>, E> {
    let secs = match &value {
        Value::Null => return Ok(None),
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    match secs {
        Some(v) if v.is_finite() => Ok(Some(v)),
        _ => Err(E::custom(format!("expected a number of seconds, got {}", value))),
    }
}

fn frequency_secs<'de, D: Deserializer<'de>>(d: D) -> Result<u64, D::Error> {
    match seconds::<D::Error>(Value::deserialize(d)?)? {
        None => Ok(DEFAULT_READ_FREQUENCY_SECS),
        Some(v) if v >= 0.0 => Ok(v.round() as u64),
        Some(v) => Err(de::Error::custom(format!("negative read_frequency {}", v))),
    }
}

/// an unusable global interval means no override rather than a lost snapshot
fn global_frequency<'de, D: Deserializer<'de>>(d: D) -> Result<Option<u64>, D::Error> {
    match seconds::<D::Error>(Value::deserialize(d)?) {
        Ok(secs) => Ok(secs.filter(|v| *v > 0.0).map(|v| v.round() as u64)),
        Err(e) => {
            tracing::warn!("ignoring global read frequency: {}", e);
            Ok(None)
        }
    }
}

impl SensorConfig {
    pub fn driver(&self) -> &str {
        &self.parser_config.driver
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CameraConfig {
    pub id: Id,
    #[serde(default, deserialize_with = "null_as_default")]
    pub name: String,
    #[serde(default)]
    pub rtsp_url: Option<String>,
}

impl CameraConfig {
    /// the stream url, if one is configured and non-blank
    pub fn stream_url(&self) -> Option<&str> {
        self.rtsp_url
            .as_deref()
            .map(str::trim)
            .filter(|u| !u.is_empty())
    }
}

/// a generic sensor reading
/// flat key -> number/string payload, e.g.
/// - {"temperature": 22.5, "humidity": 45.0}
/// - {"distance_cm": 123.4}
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Reading(Map<String, Value>);

impl Reading {
    pub fn new() -> Self {
        Self::default()
    }

    /// single numeric field reading
    pub fn single(key: &str, value: f64) -> Self {
        let mut r = Self::new();
        r.insert_number(key, value);
        r
    }

    /// inserts a number; non-finite values are dropped since json cannot carry them
    pub fn insert_number(&mut self, key: &str, value: f64) {
        if let Some(n) = serde_json::Number::from_f64(value) {
            self.0.insert(key.to_string(), Value::Number(n));
        }
    }

    pub fn insert(&mut self, key: &str, value: Value) {
        self.0.insert(key.to_string(), value);
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn number(&self, key: &str) -> Option<f64> {
        self.0.get(key).and_then(Value::as_f64)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for Reading {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", Value::Object(self.0.clone()))
    }
}

/// body of POST /submit-reading
#[derive(Debug, Clone, Serialize)]
pub struct ReadingSubmission<'a> {
    pub sensor: &'a Id,
    pub value: &'a Reading,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CommandType {
    ForceReadSensor,
    CaptureImage,
    AnalyzeSnowDepth,
    #[serde(other)]
    Unknown,
}

impl fmt::Display for CommandType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CommandType::ForceReadSensor => "FORCE_READ_SENSOR",
            CommandType::CaptureImage => "CAPTURE_IMAGE",
            CommandType::AnalyzeSnowDepth => "ANALYZE_SNOW_DEPTH",
            CommandType::Unknown => "UNKNOWN",
        };
        f.write_str(s)
    }
}

/// a unit of remotely queued work; owned by the server, the agent only
/// reads pending ones and writes back a terminal status
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Command {
    pub id: Id,
    pub command_type: CommandType,
    #[serde(default)]
    pub payload: Value,
    #[serde(default)]
    pub status: Option<String>,
}

impl Command {
    /// id-valued payload field
    pub fn payload_id(&self, key: &str) -> Option<Id> {
        self.payload
            .get(key)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }
}

/// terminal status written back with POST /commands/{id}/{status}
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandStatus {
    Complete,
    Fail,
}

impl CommandStatus {
    pub fn as_path(&self) -> &'static str {
        match self {
            CommandStatus::Complete => "complete",
            CommandStatus::Fail => "fail",
        }
    }
}

impl fmt::Display for CommandStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_path())
    }
}

/// a jpeg prepared for upload
#[derive(Debug, Clone)]
pub struct Photo {
    pub filename: String,
    /// base64-encoded jpeg bytes
    pub image: String,
}
