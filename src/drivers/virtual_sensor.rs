use super::{Driver, DriverError};
use crate::domain::Reading;
use async_trait::async_trait;
use serde_json::Value;

/// Placeholder for sensors whose values are pushed by command execution
/// (e.g. image analysis). Never touches hardware.
pub struct VirtualDriver;

#[async_trait]
impl Driver for VirtualDriver {
    fn name(&self) -> &'static str {
        "virtual"
    }

    async fn read(&self, _config: &Value) -> Result<Reading, DriverError> {
        Err(DriverError::NoValue("virtual sensor is fed by commands".into()))
    }
}
