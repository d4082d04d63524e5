//! Reads the newest record of a logger's daily JSON file.
//!
//! Some stations run their own logger that appends records to one JSON array
//! per day. The file for "today" is derived from a strftime pattern, the last
//! array element is taken, its scalar fields are copied as-is and the fields
//! listed in `fields` are additionally published under normalized names:
//!
//! ```json
//! { "path_pattern": "/var/lib/wx/%Y-%m-%d.json",
//!   "fields": { "TempOut": "temperature", "HumOut": "humidity" },
//!   "utc": false }
//! ```
//!
//! A missing file (nothing logged yet today) or malformed content is "no
//! value", never an error that escapes the read.

use super::{str_param, Driver, DriverError};
use crate::domain::Reading;
use async_trait::async_trait;
use chrono::{Local, NaiveDate, Utc};
use serde_json::Value;
use std::fmt::Write as _;
use std::path::PathBuf;

pub struct DailyJsonFileDriver;

impl DailyJsonFileDriver {
    pub fn new() -> Self {
        Self
    }
}

impl Default for DailyJsonFileDriver {
    fn default() -> Self {
        Self::new()
    }
}

/// File name for `date` under `pattern`
pub fn file_for_date(pattern: &str, date: NaiveDate) -> Result<PathBuf, DriverError> {
    let mut path = String::new();
    write!(path, "{}", date.format(pattern))
        .map_err(|_| DriverError::Config(format!("invalid path_pattern {:?}", pattern)))?;
    Ok(PathBuf::from(path))
}

/// Builds a reading from the last element of a JSON array document
pub fn latest_record(content: &str, fields: Option<&Value>) -> Result<Reading, DriverError> {
    let doc: Value = serde_json::from_str(content).map_err(|e| DriverError::Parse(e.to_string()))?;
    let records = doc
        .as_array()
        .ok_or_else(|| DriverError::Parse("document is not an array".into()))?;
    let last = records
        .last()
        .ok_or_else(|| DriverError::NoValue("file has no records yet".into()))?;
    let record = last
        .as_object()
        .ok_or_else(|| DriverError::Parse("last record is not an object".into()))?;

    let mut reading = Reading::new();
    for (key, value) in record {
        if !value.is_object() && !value.is_array() && !value.is_null() {
            reading.insert(key, value.clone());
        }
    }

    if let Some(map) = fields.and_then(Value::as_object) {
        for (original, normalized) in map {
            let (Some(normalized), Some(value)) = (normalized.as_str(), record.get(original)) else {
                continue;
            };
            match value {
                Value::Number(_) => reading.insert(normalized, value.clone()),
                // loggers often write numbers as strings
                Value::String(s) => match s.trim().parse::<f64>() {
                    Ok(v) => reading.insert_number(normalized, v),
                    Err(_) => reading.insert(normalized, value.clone()),
                },
                _ => {}
            }
        }
    }

    if reading.is_empty() {
        return Err(DriverError::NoValue("last record has no usable fields".into()));
    }
    Ok(reading)
}

#[async_trait]
impl Driver for DailyJsonFileDriver {
    fn name(&self) -> &'static str {
        "daily_json_file"
    }

    async fn read(&self, config: &Value) -> Result<Reading, DriverError> {
        let pattern = str_param(config, "path_pattern")
            .ok_or_else(|| DriverError::Config("'path_pattern' is not set".into()))?;
        let use_utc = config.get("utc").and_then(Value::as_bool).unwrap_or(false);
        let today = if use_utc {
            Utc::now().date_naive()
        } else {
            Local::now().date_naive()
        };
        let path = file_for_date(pattern, today)?;

        let content = match tokio::fs::read_to_string(&path).await {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(DriverError::NoValue(format!("{} not written yet", path.display())));
            }
            Err(e) => return Err(DriverError::Port(anyhow::Error::new(e).context(path.display().to_string()))),
        };
        latest_record(&content, config.get("fields"))
    }
}
