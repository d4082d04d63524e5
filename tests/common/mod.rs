#![allow(dead_code)]

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde_json::{json, Value};
use station_agent::client::ControlPlane;
use station_agent::commands::{FrameGrabber, VisionModel};
use station_agent::domain::{Command, CommandStatus, DeviceConfig, Id, Photo, Reading};
use station_agent::drivers::{Driver, DriverError};
use station_agent::hal::{HardwareProvider, SerialLink};
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;

pub fn device_config(value: Value) -> DeviceConfig {
    serde_json::from_value(value).unwrap()
}

pub fn sensor(id: i64, interface: &str, active: bool, freq: u64, config: Value) -> Value {
    json!({
        "id": id,
        "name": format!("sensor-{}", id),
        "is_active": active,
        "interface": interface,
        "parser_config": {"driver": "bench"},
        "config": config,
        "read_frequency": freq,
    })
}

pub fn command(id: i64, kind: &str, payload: Value) -> Command {
    serde_json::from_value(json!({
        "id": id,
        "command_type": kind,
        "payload": payload,
        "status": "pending",
    }))
    .unwrap()
}

// ------------------------------------------------------------------------------
// control plane
// ------------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    FetchConfig,
    Submit(Id, Reading),
    PendingCommands,
    Ack(Id, CommandStatus),
    CameraUpload(Id, String),
    AnalysisUpload(Id, String),
}

/// Scripted control server that records every call
#[derive(Default)]
pub struct FakePlane {
    configs: Mutex<VecDeque<Result<DeviceConfig, String>>>,
    commands: Mutex<VecDeque<Vec<Command>>>,
    fail_submit: Mutex<bool>,
    calls: Mutex<Vec<Call>>,
}

impl FakePlane {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn push_config(&self, config: DeviceConfig) {
        self.configs.lock().unwrap().push_back(Ok(config));
    }

    pub fn push_config_error(&self, msg: &str) {
        self.configs.lock().unwrap().push_back(Err(msg.to_string()));
    }

    pub fn push_commands(&self, commands: Vec<Command>) {
        self.commands.lock().unwrap().push_back(commands);
    }

    pub fn set_submit_failing(&self, failing: bool) {
        *self.fail_submit.lock().unwrap() = failing;
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn submissions(&self) -> Vec<(Id, Reading)> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Submit(id, r) => Some((id, r)),
                _ => None,
            })
            .collect()
    }

    pub fn acks(&self) -> Vec<(Id, CommandStatus)> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Ack(id, s) => Some((id, s)),
                _ => None,
            })
            .collect()
    }

    pub fn uploads(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, Call::CameraUpload(..) | Call::AnalysisUpload(..)))
            .count()
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl ControlPlane for FakePlane {
    async fn fetch_config(&self) -> Result<DeviceConfig> {
        self.record(Call::FetchConfig);
        match self.configs.lock().unwrap().pop_front() {
            Some(Ok(config)) => Ok(config),
            Some(Err(msg)) => Err(anyhow!(msg)),
            None => Err(anyhow!("connection refused")),
        }
    }

    async fn submit_reading(&self, sensor: &Id, value: &Reading) -> Result<()> {
        self.record(Call::Submit(sensor.clone(), value.clone()));
        if *self.fail_submit.lock().unwrap() {
            return Err(anyhow!("502 bad gateway"));
        }
        Ok(())
    }

    async fn pending_commands(&self) -> Result<Vec<Command>> {
        self.record(Call::PendingCommands);
        Ok(self.commands.lock().unwrap().pop_front().unwrap_or_default())
    }

    async fn ack_command(&self, id: &Id, status: CommandStatus) -> Result<()> {
        self.record(Call::Ack(id.clone(), status));
        Ok(())
    }

    async fn upload_camera_photo(&self, camera: &Id, photo: &Photo) -> Result<()> {
        self.record(Call::CameraUpload(camera.clone(), photo.filename.clone()));
        Ok(())
    }

    async fn upload_analysis_photo(&self, camera: &Id, photo: &Photo) -> Result<()> {
        self.record(Call::AnalysisUpload(camera.clone(), photo.filename.clone()));
        Ok(())
    }
}

// ------------------------------------------------------------------------------
// drivers
// ------------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct Span {
    pub tag: String,
    pub start: Instant,
    pub end: Instant,
}

/// Takes `delay_ms` of (tokio) time per read and returns `{value}` from the
/// sensor's config. Records when each read started and ended.
#[derive(Default)]
pub struct BenchDriver {
    pub spans: Mutex<Vec<Span>>,
}

impl BenchDriver {
    pub fn spans(&self) -> Vec<Span> {
        self.spans.lock().unwrap().clone()
    }

    pub fn tags(&self) -> Vec<String> {
        self.spans().into_iter().map(|s| s.tag).collect()
    }
}

#[async_trait]
impl Driver for BenchDriver {
    fn name(&self) -> &'static str {
        "bench"
    }

    async fn read(&self, config: &Value) -> Result<Reading, DriverError> {
        let tag = config["tag"].as_str().unwrap_or("?").to_string();
        let start = Instant::now();
        let delay = config["delay_ms"].as_u64().unwrap_or(0);
        tokio::time::sleep(Duration::from_millis(delay)).await;
        self.spans.lock().unwrap().push(Span {
            tag,
            start,
            end: Instant::now(),
        });
        match config["value"].as_f64() {
            Some(v) => Ok(Reading::single("value", v)),
            None => Err(DriverError::NoValue("bench sensor has no value".into())),
        }
    }
}

// ------------------------------------------------------------------------------
// serial
// ------------------------------------------------------------------------------

/// Serial port that plays back a fixed list of chunks, then stays silent
pub struct ScriptedSerial {
    chunks: VecDeque<Vec<u8>>,
    written: Arc<Mutex<Vec<u8>>>,
}

impl SerialLink for ScriptedSerial {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        match self.chunks.pop_front() {
            Some(chunk) => {
                let n = chunk.len().min(buf.len());
                buf[..n].copy_from_slice(&chunk[..n]);
                Ok(n)
            }
            None => {
                std::thread::sleep(Duration::from_millis(5));
                Ok(0)
            }
        }
    }

    fn write(&mut self, data: &[u8]) -> Result<()> {
        self.written.lock().unwrap().extend_from_slice(data);
        Ok(())
    }

    fn discard_input(&mut self) -> Result<()> {
        Ok(())
    }
}

#[derive(Default)]
pub struct ScriptedHal {
    pub chunks: Vec<Vec<u8>>,
    pub written: Arc<Mutex<Vec<u8>>>,
    pub opened: Mutex<Vec<(String, u32)>>,
}

impl ScriptedHal {
    pub fn with_chunks(chunks: Vec<Vec<u8>>) -> Arc<Self> {
        Arc::new(Self {
            chunks,
            ..Default::default()
        })
    }
}

impl HardwareProvider for ScriptedHal {
    fn open_serial(&self, path: &str, baud_rate: u32) -> Result<Box<dyn SerialLink>> {
        self.opened.lock().unwrap().push((path.to_string(), baud_rate));
        Ok(Box::new(ScriptedSerial {
            chunks: self.chunks.clone().into(),
            written: self.written.clone(),
        }))
    }

    fn i2c_transfer(&self, _bus: u8, _addr: u16, _write: &[u8], _settle: Duration, _len: usize) -> Result<Vec<u8>> {
        Err(anyhow!("no i2c device"))
    }
}

// ------------------------------------------------------------------------------
// capture and vision
// ------------------------------------------------------------------------------

/// Writes a tiny fake jpeg, optionally hanging afterwards
#[derive(Default)]
pub struct FakeGrabber {
    pub hang: bool,
    pub grabbed: Mutex<Vec<PathBuf>>,
}

#[async_trait]
impl FrameGrabber for FakeGrabber {
    async fn grab(&self, _stream_url: &str, dest: &Path) -> Result<()> {
        std::fs::write(dest, [0xFF, 0xD8, 0xFF, 0xD9])?;
        self.grabbed.lock().unwrap().push(dest.to_path_buf());
        if self.hang {
            std::future::pending::<()>().await;
        }
        Ok(())
    }
}

pub struct FakeVision {
    pub answer: String,
}

#[async_trait]
impl VisionModel for FakeVision {
    async fn describe(&self, _prompt: &str, image_base64: &str) -> Result<String> {
        assert_eq!(image_base64, "/9j/2Q==");
        Ok(self.answer.clone())
    }
}

pub fn dir_is_empty(dir: &Path) -> bool {
    match std::fs::read_dir(dir) {
        Ok(mut entries) => entries.next().is_none(),
        Err(_) => true,
    }
}
