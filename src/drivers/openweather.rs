//! OpenWeatherMap current conditions as an `http` sensor.
//!
//! Config: `{ "apikey": "...", "lat": 39.9, "lon": 32.8 }`.

use super::{round_to, Driver, DriverError};
use crate::domain::Reading;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;

pub const READ_TIMEOUT: Duration = Duration::from_secs(8);
pub const API_URL: &str = "https://api.openweathermap.org/data/2.5/weather";

pub struct OpenWeatherDriver {
    http: reqwest::Client,
    url: String,
}

#[derive(Debug, Deserialize)]
struct WeatherResponse {
    main: Option<MainBlock>,
}

#[derive(Debug, Deserialize)]
struct MainBlock {
    temp: f64,
    humidity: f64,
}

impl OpenWeatherDriver {
    pub fn new(http: reqwest::Client) -> Self {
        Self::with_url(http, API_URL)
    }

    pub fn with_url(http: reqwest::Client, url: &str) -> Self {
        Self { http, url: url.to_string() }
    }
}

/// coordinates may be configured as numbers or strings
fn coordinate(config: &Value, key: &str) -> Option<String> {
    match config.get(key)? {
        Value::Number(n) => Some(n.to_string()),
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        _ => None,
    }
}

fn to_reading(body: WeatherResponse) -> Result<Reading, DriverError> {
    let main = body
        .main
        .ok_or_else(|| DriverError::Parse("response has no 'main' block".into()))?;
    let mut reading = Reading::new();
    reading.insert_number("temperature", round_to(main.temp, 2));
    reading.insert_number("humidity", round_to(main.humidity, 2));
    Ok(reading)
}

#[async_trait]
impl Driver for OpenWeatherDriver {
    fn name(&self) -> &'static str {
        "openweather"
    }

    async fn read(&self, config: &Value) -> Result<Reading, DriverError> {
        let api_key = config.get("apikey").and_then(Value::as_str).filter(|k| !k.is_empty());
        let (Some(api_key), Some(lat), Some(lon)) = (api_key, coordinate(config, "lat"), coordinate(config, "lon")) else {
            return Err(DriverError::Config("apikey, lat and lon are required".into()));
        };

        let response = self
            .http
            .get(&self.url)
            .query(&[("lat", lat.as_str()), ("lon", lon.as_str()), ("appid", api_key), ("units", "metric")])
            .timeout(READ_TIMEOUT)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    DriverError::Timeout(READ_TIMEOUT)
                } else {
                    DriverError::Port(e.into())
                }
            })?
            .error_for_status()
            .map_err(|e| DriverError::Port(e.into()))?;

        let body: WeatherResponse = response
            .json()
            .await
            .map_err(|e| DriverError::Parse(e.to_string()))?;
        to_reading(body)
    }
}
