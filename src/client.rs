//! ==============================================================================
//! client.rs - control server api
//! ==============================================================================
//!
//! purpose:
//!     every request the agent makes to its control server. all paths hang
//!     off `{base_url}{api_prefix}` and carry the fixed device token.
//!
//! ```text
//!     GET  /config/{deviceId}             -> DeviceConfig
//!     POST /submit-reading                {sensor, value}
//!     GET  /commands/{deviceId}           -> [Command] (404 = nothing queued)
//!     POST /commands/{id}/{status}        status: complete | fail
//!     POST /cameras/{cameraId}/upload-photo   {image, filename}
//!     POST /analysis/upload-photo         {cameraId, image, filename}
//! ```
//!
//! relationships:
//!     - implemented here with reqwest
//!     - faked in tests/ via the ControlPlane trait
//!
//! ==============================================================================

use crate::config::AgentSettings;
use crate::domain::{Command, CommandStatus, DeviceConfig, Id, Photo, Reading, ReadingSubmission};
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::StatusCode;
use serde_json::json;
use std::time::Duration;

/// uploads carry a full jpeg, give them more room than plain requests
const UPLOAD_TIMEOUT: Duration = Duration::from_secs(60);

#[async_trait]
pub trait ControlPlane: Send + Sync {
    async fn fetch_config(&self) -> Result<DeviceConfig>;
    async fn submit_reading(&self, sensor: &Id, value: &Reading) -> Result<()>;
    /// pending commands for this device; an empty list when none are queued
    async fn pending_commands(&self) -> Result<Vec<Command>>;
    async fn ack_command(&self, id: &Id, status: CommandStatus) -> Result<()>;
    async fn upload_camera_photo(&self, camera: &Id, photo: &Photo) -> Result<()>;
    async fn upload_analysis_photo(&self, camera: &Id, photo: &Photo) -> Result<()>;
}

pub struct HttpControlPlane {
    http: reqwest::Client,
    api_base: String,
    device_id: String,
}

impl HttpControlPlane {
    pub fn new(settings: &AgentSettings) -> Result<Self> {
        let mut token = HeaderValue::from_str(&format!("Token {}", settings.device.token))
            .context("device token contains invalid header characters")?;
        token.set_sensitive(true);
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, token);

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(settings.request_timeout())
            .build()
            .context("failed to build http client")?;

        Ok(Self {
            http,
            api_base: settings.api_base(),
            device_id: settings.device.id.clone(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.api_base, path.trim_start_matches('/'))
    }
}

#[async_trait]
impl ControlPlane for HttpControlPlane {
    async fn fetch_config(&self) -> Result<DeviceConfig> {
        let url = self.url(&format!("config/{}", self.device_id));
        let config = self
            .http
            .get(&url)
            .send()
            .await
            .with_context(|| format!("GET {}", url))?
            .error_for_status()?
            .json::<DeviceConfig>()
            .await
            .context("config response is not a valid device config")?;
        Ok(config)
    }

    async fn submit_reading(&self, sensor: &Id, value: &Reading) -> Result<()> {
        let url = self.url("submit-reading");
        self.http
            .post(&url)
            .json(&ReadingSubmission { sensor, value })
            .send()
            .await
            .with_context(|| format!("POST {}", url))?
            .error_for_status()?;
        Ok(())
    }

    async fn pending_commands(&self) -> Result<Vec<Command>> {
        let url = self.url(&format!("commands/{}", self.device_id));
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .with_context(|| format!("GET {}", url))?;

        if response.status() == StatusCode::NOT_FOUND || response.status() == StatusCode::NO_CONTENT {
            return Ok(Vec::new());
        }
        let commands = response
            .error_for_status()?
            .json::<Option<Vec<Command>>>()
            .await
            .context("commands response is not a command list")?;
        Ok(commands.unwrap_or_default())
    }

    async fn ack_command(&self, id: &Id, status: CommandStatus) -> Result<()> {
        let url = self.url(&format!("commands/{}/{}", id, status.as_path()));
        self.http
            .post(&url)
            .send()
            .await
            .with_context(|| format!("POST {}", url))?
            .error_for_status()?;
        Ok(())
    }

    async fn upload_camera_photo(&self, camera: &Id, photo: &Photo) -> Result<()> {
        let url = self.url(&format!("cameras/{}/upload-photo", camera));
        self.http
            .post(&url)
            .timeout(UPLOAD_TIMEOUT)
            .json(&json!({ "image": photo.image, "filename": photo.filename }))
            .send()
            .await
            .with_context(|| format!("POST {}", url))?
            .error_for_status()?;
        Ok(())
    }

    async fn upload_analysis_photo(&self, camera: &Id, photo: &Photo) -> Result<()> {
        let url = self.url("analysis/upload-photo");
        self.http
            .post(&url)
            .timeout(UPLOAD_TIMEOUT)
            .json(&json!({ "cameraId": camera, "image": photo.image, "filename": photo.filename }))
            .send()
            .await
            .with_context(|| format!("POST {}", url))?
            .error_for_status()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_urls() {
        let settings = AgentSettings::parse(
            r#"
            [server]
            base_url = "http://hub:3001/"
            [device]
            id = "st-9"
            token = "t"
            "#,
        )
        .unwrap();
        let plane = HttpControlPlane::new(&settings).unwrap();
        assert_eq!(plane.url("/submit-reading"), "http://hub:3001/api/submit-reading");
        assert_eq!(plane.url("config/st-9"), "http://hub:3001/api/config/st-9");
    }

    #[test]
    fn test_reading_submission_shape() {
        let id = Id::Num(4);
        let value = Reading::single("distance_cm", 12.5);
        let body = serde_json::to_value(ReadingSubmission { sensor: &id, value: &value }).unwrap();
        assert_eq!(body, json!({"sensor": 4, "value": {"distance_cm": 12.5}}));
    }
}
