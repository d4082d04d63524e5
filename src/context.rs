//! Shared agent context, owned by `Agent` and handed to every task.

use crate::domain::DeviceConfig;
use crate::state::StateMachine;
use std::sync::{Arc, RwLock};
use tokio::sync::{Mutex, MutexGuard};

pub struct AgentContext {
    pub device_id: String,
    pub state: StateMachine,
    /// replaced as a whole by the synchronizer; readers clone the Arc
    config: RwLock<Option<Arc<DeviceConfig>>>,
    /// held for the whole of every hardware read so polling and commands
    /// never overlap on a physical bus
    bus: Mutex<()>,
}

impl AgentContext {
    pub fn new(device_id: impl Into<String>) -> Self {
        Self {
            device_id: device_id.into(),
            state: StateMachine::new(),
            config: RwLock::new(None),
            bus: Mutex::new(()),
        }
    }

    /// the current snapshot, if one has ever been fetched
    pub fn config(&self) -> Option<Arc<DeviceConfig>> {
        self.config
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn replace_config(&self, next: DeviceConfig) {
        *self.config.write().unwrap_or_else(|e| e.into_inner()) = Some(Arc::new(next));
    }

    pub async fn lock_bus(&self) -> MutexGuard<'_, ()> {
        self.bus.lock().await
    }
}
