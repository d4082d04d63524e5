//! ==============================================================================
//! commands/mod.rs - remote command polling and execution
//! ==============================================================================
//!
//! purpose:
//!     fetches the commands queued for this device and runs them one at a
//!     time, in fetch order, writing back exactly one terminal status each.
//!
//! ```text
//!     FORCE_READ_SENSOR   {sensor_id}                    one out-of-schedule read
//!     CAPTURE_IMAGE       {camera_id}                    still frame -> camera upload
//!     ANALYZE_SNOW_DEPTH  {camera_id, virtual_sensor_id} still frame -> vision model
//!                                                        -> reading + analysis upload
//! ```
//!
//! rules:
//!     - nothing is fetched unless the agent is Online. a failed fetch or
//!       ack takes the agent Offline until the next config sync.
//!     - every command runs under the command timeout; expiry is a `fail`.
//!       dropping the command future on expiry kills ffmpeg and removes the
//!       temp image.
//!     - hardware reads go through the same bus guard as the poll scheduler.
//!
//! relationships:
//!     - uses: scheduler.rs (read_sensor), reporter.rs, client.rs
//!     - submodules: capture.rs (ffmpeg, temp files), vision.rs (snow depth)
//!
//! ==============================================================================

pub mod capture;
pub mod vision;

pub use capture::{FfmpegGrabber, FrameGrabber, TempImage};
pub use vision::{GeminiVision, VisionModel};

use crate::client::ControlPlane;
use crate::context::AgentContext;
use crate::domain::{Command, CommandStatus, CommandType, Id, Interface, Photo, Reading};
use crate::registry::DriverRegistry;
use crate::reporter::Reporter;
use crate::scheduler::{read_sensor, SensorReadError};
use crate::state::AgentState;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    #[error("payload has no {0}")]
    MissingPayload(&'static str),
    #[error("no configuration has been received yet")]
    NoConfig,
    #[error("sensor {0} is not configured")]
    UnknownSensor(Id),
    #[error("camera {0} is not configured")]
    UnknownCamera(Id),
    #[error("camera {0} has no stream url")]
    NoStreamUrl(Id),
    #[error("unsupported command type {0}")]
    Unsupported(String),
    #[error("sensor read failed: {0}")]
    Read(#[from] SensorReadError),
    #[error("frame capture failed: {0:#}")]
    Capture(anyhow::Error),
    #[error("no vision model configured")]
    NoVision,
    #[error("vision analysis failed: {0:#}")]
    Vision(anyhow::Error),
    #[error("snow depth could not be determined")]
    Undetermined,
    #[error("reading submit failed: {0:#}")]
    Report(anyhow::Error),
    #[error("photo upload failed: {0:#}")]
    Upload(anyhow::Error),
    #[error("timed out after {0:?}")]
    Timeout(Duration),
}

pub struct CommandExecutor {
    ctx: Arc<AgentContext>,
    registry: Arc<DriverRegistry>,
    plane: Arc<dyn ControlPlane>,
    reporter: Reporter,
    grabber: Arc<dyn FrameGrabber>,
    vision: Option<Arc<dyn VisionModel>>,
    work_dir: PathBuf,
    timeout: Duration,
}

impl CommandExecutor {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        ctx: Arc<AgentContext>,
        registry: Arc<DriverRegistry>,
        plane: Arc<dyn ControlPlane>,
        reporter: Reporter,
        grabber: Arc<dyn FrameGrabber>,
        vision: Option<Arc<dyn VisionModel>>,
        work_dir: PathBuf,
        timeout: Duration,
    ) -> Self {
        Self {
            ctx,
            registry,
            plane,
            reporter,
            grabber,
            vision,
            work_dir,
            timeout,
        }
    }

    /// One command poll. Returns the status written back for each command.
    pub async fn poll_once(&self) -> Vec<(Id, CommandStatus)> {
        if !self.ctx.state.is_online() {
            return Vec::new();
        }
        let commands = match self.plane.pending_commands().await {
            Ok(commands) => commands,
            Err(e) => {
                tracing::warn!("command fetch failed: {:#}", e);
                self.ctx.state.set(AgentState::Offline);
                return Vec::new();
            }
        };
        if !commands.is_empty() {
            tracing::info!("{} pending command(s)", commands.len());
        }

        let mut done = Vec::with_capacity(commands.len());
        for cmd in commands {
            let status = self.execute(&cmd).await;
            done.push((cmd.id.clone(), status));
        }
        done
    }

    /// Runs `cmd` under the command timeout and acknowledges it exactly once.
    pub async fn execute(&self, cmd: &Command) -> CommandStatus {
        tracing::info!(command = %cmd.id, "executing {}", cmd.command_type);

        let result = match tokio::time::timeout(self.timeout, self.run(cmd)).await {
            Ok(result) => result,
            Err(_) => Err(CommandError::Timeout(self.timeout)),
        };
        let status = match result {
            Ok(()) => {
                tracing::info!(command = %cmd.id, "{} complete", cmd.command_type);
                CommandStatus::Complete
            }
            Err(e) => {
                tracing::warn!(command = %cmd.id, "{} failed: {}", cmd.command_type, e);
                CommandStatus::Fail
            }
        };

        if let Err(e) = self.plane.ack_command(&cmd.id, status).await {
            tracing::warn!(command = %cmd.id, "could not report status {}: {:#}", status, e);
            self.ctx.state.set(AgentState::Offline);
        }
        status
    }

    async fn run(&self, cmd: &Command) -> Result<(), CommandError> {
        match cmd.command_type {
            CommandType::ForceReadSensor => {
                let sensor = cmd
                    .payload_id("sensor_id")
                    .ok_or(CommandError::MissingPayload("sensor_id"))?;
                self.force_read(&sensor).await
            }
            CommandType::CaptureImage => {
                let camera = cmd
                    .payload_id("camera_id")
                    .ok_or(CommandError::MissingPayload("camera_id"))?;
                self.capture_and_upload(&camera).await
            }
            CommandType::AnalyzeSnowDepth => {
                let camera = cmd
                    .payload_id("camera_id")
                    .ok_or(CommandError::MissingPayload("camera_id"))?;
                let target = cmd
                    .payload_id("virtual_sensor_id")
                    .ok_or(CommandError::MissingPayload("virtual_sensor_id"))?;
                self.analyze_snow_depth(&camera, &target).await
            }
            CommandType::Unknown => Err(CommandError::Unsupported(cmd.command_type.to_string())),
        }
    }

    async fn force_read(&self, sensor_id: &Id) -> Result<(), CommandError> {
        let config = self.ctx.config().ok_or(CommandError::NoConfig)?;
        let sensor = config
            .sensor(sensor_id)
            .ok_or_else(|| CommandError::UnknownSensor(sensor_id.clone()))?;

        if sensor.interface == Interface::Virtual {
            tracing::info!(sensor = %sensor.id, "{} is virtual, nothing to read", sensor.name);
            return Ok(());
        }

        let reading = read_sensor(&self.ctx, &self.registry, sensor).await?;
        self.reporter
            .submit(&sensor.id, &reading)
            .await
            .map_err(CommandError::Report)
    }

    /// Grabs one frame from `camera` into a temp file owned by the caller.
    async fn grab_frame(&self, camera_id: &Id) -> Result<TempImage, CommandError> {
        let config = self.ctx.config().ok_or(CommandError::NoConfig)?;
        let camera = config
            .camera(camera_id)
            .ok_or_else(|| CommandError::UnknownCamera(camera_id.clone()))?;
        let url = camera
            .stream_url()
            .ok_or_else(|| CommandError::NoStreamUrl(camera_id.clone()))?;

        let filename = capture::capture_filename(&self.ctx.device_id, &camera_id.to_string(), chrono::Utc::now());
        let image = TempImage::reserve(&self.work_dir, filename).map_err(CommandError::Capture)?;
        tracing::debug!(camera = %camera_id, "capturing {} from {}", image.filename(), camera.name);
        self.grabber
            .grab(url, image.path())
            .await
            .map_err(CommandError::Capture)?;
        Ok(image)
    }

    async fn photo(image: &TempImage) -> Result<Photo, CommandError> {
        Ok(Photo {
            filename: image.filename().to_string(),
            image: image.to_base64().await.map_err(CommandError::Capture)?,
        })
    }

    async fn capture_and_upload(&self, camera_id: &Id) -> Result<(), CommandError> {
        let image = self.grab_frame(camera_id).await?;
        let photo = Self::photo(&image).await?;
        self.plane
            .upload_camera_photo(camera_id, &photo)
            .await
            .map_err(CommandError::Upload)?;
        tracing::info!(camera = %camera_id, "uploaded {}", photo.filename);
        Ok(())
    }

    async fn analyze_snow_depth(&self, camera_id: &Id, target: &Id) -> Result<(), CommandError> {
        let vision = self.vision.clone().ok_or(CommandError::NoVision)?;
        let image = self.grab_frame(camera_id).await?;
        let photo = Self::photo(&image).await?;

        let answer = vision
            .describe(vision::SNOW_DEPTH_PROMPT, &photo.image)
            .await
            .map_err(CommandError::Vision)?;
        tracing::debug!(camera = %camera_id, "vision answer: {}", answer.trim());
        let depth = vision::parse_snow_depth(&answer)
            .map_err(CommandError::Vision)?
            .ok_or(CommandError::Undetermined)?;

        let reading = Reading::single("snow_depth_cm", depth);
        self.reporter
            .submit(target, &reading)
            .await
            .map_err(CommandError::Report)?;
        self.plane
            .upload_analysis_photo(camera_id, &photo)
            .await
            .map_err(CommandError::Upload)?;
        Ok(())
    }
}
