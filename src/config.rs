//! ==============================================================================
//! config.rs - local agent configuration loader
//! ==============================================================================
//!
//! purpose:
//!     defines the schema for `agent.toml`.
//!     this is the only fatal input of the agent: a missing file or a missing
//!     server url / device id / device token stops the process at startup.
//!
//! structure:
//!     - ServerConfig: where the control server lives.
//!     - DeviceConfig: identity and fixed token.
//!     - TimingConfig: periods of the three background tasks.
//!     - CaptureConfig: ffmpeg still-frame extraction.
//!     - VisionConfig: optional image measurement endpoint.
//!     - LoggingConfig: default log level.
//!
//! ==============================================================================

use anyhow::{anyhow, bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// looked up relative to the working directory when no path is given
pub const DEFAULT_CONFIG_PATH: &str = "config/agent.toml";

/// Root configuration structure
#[derive(Debug, Deserialize, Clone)]
pub struct AgentSettings {
    pub server: ServerConfig,
    pub device: DeviceIdentity,
    #[serde(default)]
    pub timing: TimingConfig,
    #[serde(default)]
    pub capture: CaptureConfig,
    #[serde(default)]
    pub vision: Option<VisionConfig>,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default)]
    pub base_url: String,
    #[serde(default = "default_api_prefix")]
    pub api_prefix: String,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_seconds: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DeviceIdentity {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub token: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct TimingConfig {
    pub config_interval_seconds: u64,
    pub poll_tick_seconds: u64,
    pub command_interval_seconds: u64,
    pub command_timeout_seconds: u64,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct CaptureConfig {
    pub ffmpeg: String,
    pub width: u32,
    pub quality: u8,
    pub work_dir: PathBuf,
    pub timeout_seconds: u64,
    pub rtsp_transport: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct VisionConfig {
    pub endpoint: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_vision_timeout")]
    pub timeout_seconds: u64,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

fn default_api_prefix() -> String {
    "/api".to_string()
}

fn default_request_timeout() -> u64 {
    10
}

fn default_vision_timeout() -> u64 {
    45
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            config_interval_seconds: 60,
            poll_tick_seconds: 1,
            command_interval_seconds: 5,
            command_timeout_seconds: 60,
        }
    }
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            ffmpeg: "ffmpeg".to_string(),
            width: 1280,
            quality: 4,
            work_dir: PathBuf::from("uploads"),
            timeout_seconds: 30,
            rtsp_transport: "tcp".to_string(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: "info".to_string() }
    }
}

impl TimingConfig {
    pub fn config_interval(&self) -> Duration {
        Duration::from_secs(self.config_interval_seconds.max(1))
    }

    pub fn poll_tick(&self) -> Duration {
        Duration::from_secs(self.poll_tick_seconds.max(1))
    }

    pub fn command_interval(&self) -> Duration {
        Duration::from_secs(self.command_interval_seconds.max(1))
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_seconds.max(1))
    }
}

impl VisionConfig {
    /// the configured key, falling back to VISION_API_KEY
    pub fn resolved_api_key(&self) -> Option<String> {
        self.api_key
            .clone()
            .filter(|k| !k.is_empty())
            .or_else(|| std::env::var("VISION_API_KEY").ok())
    }
}

impl AgentSettings {
    /// Load configuration from file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("failed to read config file {}", path.as_ref().display()))?;
        Self::parse(&content)
    }

    /// Parse and validate a toml document
    pub fn parse(content: &str) -> Result<Self> {
        let settings: AgentSettings =
            toml::from_str(content).map_err(|e| anyhow!("failed to parse config: {}", e))?;
        settings.validate()?;
        Ok(settings)
    }

    /// Load the config named on the command line, or `config/agent.toml`
    /// relative to the working directory. Absence is an error, there is no
    /// default.
    pub fn locate_and_load(explicit: Option<&Path>) -> Result<(PathBuf, Self)> {
        let path = explicit
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH));
        let settings = Self::load(&path)?;
        Ok((path, settings))
    }

    pub fn validate(&self) -> Result<()> {
        if self.server.base_url.trim().is_empty() {
            bail!("server.base_url is missing");
        }
        if self.device.id.trim().is_empty() {
            bail!("device.id is missing");
        }
        if self.device.token.trim().is_empty() {
            bail!("device.token is missing");
        }
        Ok(())
    }

    /// `{base_url}{api_prefix}` without a trailing slash
    pub fn api_base(&self) -> String {
        let base = self.server.base_url.trim_end_matches('/');
        let prefix = self.server.api_prefix.trim_matches('/');
        if prefix.is_empty() {
            base.to_string()
        } else {
            format!("{}/{}", base, prefix)
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.server.request_timeout_seconds.max(1))
    }

    /// Log configuration summary
    pub fn log_summary(&self) {
        tracing::info!(
            device = %self.device.id,
            api = %self.api_base(),
            config_every = self.timing.config_interval_seconds,
            poll_tick = self.timing.poll_tick_seconds,
            commands_every = self.timing.command_interval_seconds,
            vision = self.vision.is_some(),
            "agent configuration"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
        [server]
        base_url = "http://hub.local:3001/"

        [device]
        id = "station-01"
        token = "secret"
    "#;

    #[test]
    fn test_minimal_config_uses_defaults() {
        let s = AgentSettings::parse(MINIMAL).unwrap();
        assert_eq!(s.api_base(), "http://hub.local:3001/api");
        assert_eq!(s.timing.config_interval(), Duration::from_secs(60));
        assert_eq!(s.timing.poll_tick(), Duration::from_secs(1));
        assert_eq!(s.timing.command_interval(), Duration::from_secs(5));
        assert_eq!(s.timing.command_timeout(), Duration::from_secs(60));
        assert_eq!(s.capture.width, 1280);
        assert!(s.vision.is_none());
        assert_eq!(s.logging.level, "info");
    }

    #[test]
    fn test_missing_token_is_fatal() {
        let doc = r#"
            [server]
            base_url = "http://hub"
            [device]
            id = "station-01"
        "#;
        let err = AgentSettings::parse(doc).unwrap_err();
        assert!(err.to_string().contains("device.token"));
    }

    #[test]
    fn test_missing_section_is_fatal() {
        let doc = r#"
            [server]
            base_url = "http://hub"
        "#;
        assert!(AgentSettings::parse(doc).is_err());
    }

    #[test]
    fn test_empty_prefix() {
        let doc = format!("{}\n", MINIMAL.replace("[device]", "api_prefix = \"\"\n[device]"));
        let s = AgentSettings::parse(&doc).unwrap();
        assert_eq!(s.api_base(), "http://hub.local:3001");
    }

    #[test]
    fn test_missing_file() {
        let err = AgentSettings::load("/definitely/not/here.toml").unwrap_err();
        assert!(format!("{:#}", err).contains("failed to read config file"));
    }

    #[test]
    fn test_shipped_config_loads() {
        let (path, s) = AgentSettings::locate_and_load(None).unwrap();
        assert_eq!(path, PathBuf::from(DEFAULT_CONFIG_PATH));
        assert_eq!(s.device.id, "station-01");
        assert_eq!(s.capture.rtsp_transport, "tcp");
    }

    #[test]
    fn test_explicit_path_wins() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("station.toml");
        std::fs::write(&path, MINIMAL.replace("station-01", "station-02")).unwrap();

        let (used, s) = AgentSettings::locate_and_load(Some(&path)).unwrap();
        assert_eq!(used, path);
        assert_eq!(s.device.id, "station-02");

        let missing = dir.path().join("config").join("agent.toml");
        let err = AgentSettings::locate_and_load(Some(&missing)).unwrap_err();
        assert!(format!("{:#}", err).contains(&missing.display().to_string()));
    }
}
