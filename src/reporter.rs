//! Posts decoded readings to the control server.
//!
//! The reading is forwarded exactly as the driver produced it. A transport
//! failure marks the agent `Offline`; the next successful config sync brings
//! it back.

use crate::client::ControlPlane;
use crate::context::AgentContext;
use crate::domain::{Id, Reading};
use crate::state::AgentState;
use std::sync::Arc;

#[derive(Clone)]
pub struct Reporter {
    ctx: Arc<AgentContext>,
    plane: Arc<dyn ControlPlane>,
}

impl Reporter {
    pub fn new(ctx: Arc<AgentContext>, plane: Arc<dyn ControlPlane>) -> Self {
        Self { ctx, plane }
    }

    pub async fn submit(&self, sensor: &Id, reading: &Reading) -> anyhow::Result<()> {
        match self.plane.submit_reading(sensor, reading).await {
            Ok(()) => {
                tracing::info!(sensor = %sensor, "reading submitted: {}", reading);
                Ok(())
            }
            Err(e) => {
                tracing::warn!(sensor = %sensor, "reading submit failed: {:#}", e);
                self.ctx.state.set(AgentState::Offline);
                Err(e)
            }
        }
    }
}
