//! Still-frame capture from a camera stream.
//!
//! Frames are written by an external ffmpeg process into the capture work
//! directory; `TempImage` removes the file when it goes out of scope, which
//! covers success, every failure branch and timeout cancellation alike.

use crate::config::CaptureConfig;
use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

#[async_trait]
pub trait FrameGrabber: Send + Sync {
    /// writes one downscaled jpeg frame of `stream_url` to `dest`
    async fn grab(&self, stream_url: &str, dest: &Path) -> Result<()>;
}

pub struct FfmpegGrabber {
    binary: String,
    width: u32,
    quality: u8,
    rtsp_transport: String,
    timeout: Duration,
}

impl FfmpegGrabber {
    pub fn new(cfg: &CaptureConfig) -> Self {
        Self {
            binary: cfg.ffmpeg.clone(),
            width: cfg.width,
            quality: cfg.quality,
            rtsp_transport: cfg.rtsp_transport.clone(),
            timeout: Duration::from_secs(cfg.timeout_seconds.max(1)),
        }
    }

    fn args(&self, stream_url: &str, dest: &Path) -> Vec<String> {
        let mut args = Vec::new();
        if stream_url.starts_with("rtsp") && !self.rtsp_transport.is_empty() {
            args.extend(["-rtsp_transport".to_string(), self.rtsp_transport.clone()]);
        }
        args.extend([
            "-i".to_string(),
            stream_url.to_string(),
            "-vframes".to_string(),
            "1".to_string(),
            "-vf".to_string(),
            format!("scale={}:-1", self.width),
            "-q:v".to_string(),
            self.quality.to_string(),
            "-y".to_string(),
            dest.display().to_string(),
        ]);
        args
    }
}

#[async_trait]
impl FrameGrabber for FfmpegGrabber {
    async fn grab(&self, stream_url: &str, dest: &Path) -> Result<()> {
        let child = Command::new(&self.binary)
            .args(self.args(stream_url, dest))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("failed to start {}", self.binary))?;

        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| anyhow!("{} did not finish within {:?}", self.binary, self.timeout))??;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let tail: Vec<&str> = stderr.lines().rev().take(5).collect();
            bail!(
                "{} exited with {}: {}",
                self.binary,
                output.status,
                tail.into_iter().rev().collect::<Vec<_>>().join(" | ")
            );
        }
        if !dest.exists() {
            bail!("{} reported success but wrote no file", self.binary);
        }
        Ok(())
    }
}

/// A capture file that is deleted on drop
#[derive(Debug)]
pub struct TempImage {
    path: PathBuf,
    filename: String,
}

impl TempImage {
    /// reserves `{work_dir}/{filename}`, creating the directory if needed
    pub fn reserve(work_dir: &Path, filename: String) -> Result<Self> {
        std::fs::create_dir_all(work_dir)
            .with_context(|| format!("cannot create {}", work_dir.display()))?;
        Ok(Self {
            path: work_dir.join(&filename),
            filename,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }

    pub async fn to_base64(&self) -> Result<String> {
        let bytes = tokio::fs::read(&self.path)
            .await
            .with_context(|| format!("cannot read {}", self.path.display()))?;
        Ok(BASE64.encode(bytes))
    }
}

impl Drop for TempImage {
    fn drop(&mut self) {
        match std::fs::remove_file(&self.path) {
            Ok(()) => tracing::debug!("removed {}", self.path.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!("could not remove {}: {}", self.path.display(), e),
        }
    }
}

/// `{UTC timestamp}_{device}_{camera}.jpg`
pub fn capture_filename(device_id: &str, camera_id: &str, now: chrono::DateTime<chrono::Utc>) -> String {
    format!("{}_{}_{}.jpg", now.format("%Y-%m-%dT%H-%M-%S"), device_id, camera_id)
}
