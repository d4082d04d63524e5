//! ==============================================================================
//! agent.rs - process lifecycle
//! ==============================================================================
//!
//! purpose:
//!     wires the hardware layer, driver registry, control-server client and
//!     the three periodic tasks together, then runs until ctrl-c.
//!
//! ```text
//!     ┌────────────────────────────────────────────────────────────┐
//!     │                          Agent                             │
//!     │  ┌─────────────┐   ┌──────────────┐   ┌────────────────┐   │
//!     │  │ config sync │   │  poll tick   │   │ command poll   │   │
//!     │  │   (60s)     │   │    (1s)      │   │     (5s)       │   │
//!     │  └──────┬──────┘   └──────┬───────┘   └───────┬────────┘   │
//!     │         │ writes          │ reads             │ reads      │
//!     │         └──────────► AgentContext ◄───────────┘            │
//!     │                (state, config snapshot, bus guard)         │
//!     └────────────────────────────────────────────────────────────┘
//! ```
//!
//! relationships:
//!     - built from: config.rs (AgentSettings)
//!     - owns: sync.rs, scheduler.rs, commands/mod.rs
//!
//! ==============================================================================

use crate::client::{ControlPlane, HttpControlPlane};
use crate::commands::{CommandExecutor, FfmpegGrabber, FrameGrabber, GeminiVision, VisionModel};
use crate::config::AgentSettings;
use crate::context::AgentContext;
use crate::hal::{Hal, HardwareProvider};
use crate::registry::DriverRegistry;
use crate::reporter::Reporter;
use crate::scheduler::PollScheduler;
use crate::sync::ConfigSynchronizer;
use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

pub struct Agent {
    settings: AgentSettings,
    ctx: Arc<AgentContext>,
    sync: Arc<ConfigSynchronizer>,
    scheduler: PollScheduler,
    executor: Arc<CommandExecutor>,
}

impl Agent {
    /// Builds the agent with real hardware, ffmpeg and the http control plane
    pub fn new(settings: AgentSettings) -> Result<Self> {
        let hal: Arc<dyn HardwareProvider> = Arc::new(Hal::new());
        let http = reqwest::Client::builder()
            .build()
            .context("failed to build http client")?;
        let registry = Arc::new(DriverRegistry::with_builtin_drivers(hal, http.clone()));
        let plane: Arc<dyn ControlPlane> = Arc::new(HttpControlPlane::new(&settings)?);
        let grabber: Arc<dyn FrameGrabber> = Arc::new(FfmpegGrabber::new(&settings.capture));
        let vision = settings.vision.as_ref().map(|cfg| {
            if cfg.resolved_api_key().is_none() {
                tracing::warn!("vision endpoint configured without an api key");
            }
            Arc::new(GeminiVision::new(http.clone(), cfg)) as Arc<dyn VisionModel>
        });

        Ok(Self::assemble(settings, registry, plane, grabber, vision))
    }

    /// Builds the agent around caller-supplied collaborators
    pub fn assemble(
        settings: AgentSettings,
        registry: Arc<DriverRegistry>,
        plane: Arc<dyn ControlPlane>,
        grabber: Arc<dyn FrameGrabber>,
        vision: Option<Arc<dyn VisionModel>>,
    ) -> Self {
        let ctx = Arc::new(AgentContext::new(settings.device.id.clone()));
        let reporter = Reporter::new(ctx.clone(), plane.clone());
        let sync = Arc::new(ConfigSynchronizer::new(ctx.clone(), plane.clone()));
        let scheduler = PollScheduler::new(ctx.clone(), registry.clone(), reporter.clone());
        let executor = Arc::new(CommandExecutor::new(
            ctx.clone(),
            registry,
            plane,
            reporter,
            grabber,
            vision,
            settings.capture.work_dir.clone(),
            settings.timing.command_timeout(),
        ));

        Self {
            settings,
            ctx,
            sync,
            scheduler,
            executor,
        }
    }

    pub fn context(&self) -> Arc<AgentContext> {
        self.ctx.clone()
    }

    /// Runs until ctrl-c
    pub async fn run(self) -> Result<()> {
        let ctx = self.context();
        let tasks = self.start().await;
        tokio::signal::ctrl_c()
            .await
            .context("failed to listen for ctrl-c")?;
        tracing::info!("shutdown requested");
        for task in &tasks {
            task.abort();
        }
        for task in tasks {
            let _ = task.await;
        }
        tracing::info!(state = %ctx.state.current(), "agent stopped");
        Ok(())
    }

    /// Performs the startup fetch and spawns the periodic tasks
    pub async fn start(self) -> Vec<JoinHandle<()>> {
        let Agent {
            settings,
            ctx,
            sync,
            mut scheduler,
            executor,
        } = self;

        tracing::info!(device = %ctx.device_id, "agent starting");
        if !sync.sync_once().await {
            tracing::warn!("starting offline, will retry in {:?}", settings.timing.config_interval());
        }

        let timing = &settings.timing;
        let config_task = {
            let period = timing.config_interval();
            tokio::spawn(async move {
                let mut ticker = periodic(Instant::now() + period, period);
                loop {
                    ticker.tick().await;
                    sync.sync_once().await;
                }
            })
        };

        let poll_task = {
            let period = timing.poll_tick();
            tokio::spawn(async move {
                let mut ticker = periodic(Instant::now(), period);
                loop {
                    ticker.tick().await;
                    scheduler.tick(Instant::now()).await;
                }
            })
        };

        let command_task = {
            let period = timing.command_interval();
            tokio::spawn(async move {
                let mut ticker = periodic(Instant::now() + period, period);
                loop {
                    ticker.tick().await;
                    executor.poll_once().await;
                }
            })
        };

        vec![config_task, poll_task, command_task]
    }
}

/// Late ticks are delayed, never bunched.
fn periodic(start: Instant, period: Duration) -> tokio::time::Interval {
    let period = period.max(Duration::from_millis(10));
    let mut ticker = tokio::time::interval_at(start, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker
}
