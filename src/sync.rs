//! Config Synchronizer: the only writer of the device config and the only
//! driver of the Configuring/Online/Offline transitions.

use crate::client::ControlPlane;
use crate::context::AgentContext;
use crate::state::AgentState;
use std::sync::Arc;

pub struct ConfigSynchronizer {
    ctx: Arc<AgentContext>,
    plane: Arc<dyn ControlPlane>,
}

impl ConfigSynchronizer {
    pub fn new(ctx: Arc<AgentContext>, plane: Arc<dyn ControlPlane>) -> Self {
        Self { ctx, plane }
    }

    /// One fetch. On success the snapshot is replaced wholesale and the agent
    /// goes Online; on failure the previous snapshot is kept and the agent
    /// goes Offline. Returns whether the fetch succeeded.
    pub async fn sync_once(&self) -> bool {
        tracing::debug!("fetching configuration");
        self.ctx.state.set(AgentState::Configuring);

        match self.plane.fetch_config().await {
            Ok(config) => {
                tracing::info!(
                    sensors = config.sensors.len(),
                    cameras = config.cameras.len(),
                    global_interval = config.global_read_frequency_seconds.unwrap_or(0),
                    "configuration received"
                );
                self.ctx.replace_config(config);
                self.ctx.state.set(AgentState::Online);
                true
            }
            Err(e) => {
                tracing::warn!("configuration fetch failed: {:#}", e);
                self.ctx.state.set(AgentState::Offline);
                false
            }
        }
    }
}
