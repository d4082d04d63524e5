//! ==============================================================================
//! registry.rs - driver name -> driver instance
//! ==============================================================================
//!
//! purpose:
//!     sensors name their driver by string (`parser_config.driver`). this maps
//!     those names to constructors known at build time and caches one instance
//!     per name for the life of the process; drivers keep no state between
//!     reads, so one instance serves every sensor of that kind.
//!
//! relationships:
//!     - used by: scheduler.rs, commands/mod.rs
//!     - builds: drivers/*
//!
//! ==============================================================================

use crate::drivers::{
    DailyJsonFileDriver, DfrobotUltDriver, Driver, Hx711LoadCellDriver, OpenWeatherDriver,
    SerialRegexDriver, Sht3xDriver, VirtualDriver,
};
use crate::hal::HardwareProvider;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

pub type DriverFactory = Box<dyn Fn() -> Arc<dyn Driver> + Send + Sync>;

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("no driver named '{0}'")]
    UnknownDriver(String),
}

pub struct DriverRegistry {
    factories: HashMap<String, DriverFactory>,
    instances: Mutex<HashMap<String, Arc<dyn Driver>>>,
}

impl DriverRegistry {
    /// empty registry; see `with_builtin_drivers`
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
            instances: Mutex::new(HashMap::new()),
        }
    }

    /// every driver shipped with the agent
    pub fn with_builtin_drivers(hal: Arc<dyn HardwareProvider>, http: reqwest::Client) -> Self {
        let mut registry = Self::new();

        let h = hal.clone();
        registry.register("dfrobot_ult", move || Arc::new(DfrobotUltDriver::new(h.clone())));
        let h = hal.clone();
        registry.register("hx711_load_cell", move || Arc::new(Hx711LoadCellDriver::new(h.clone())));
        let h = hal.clone();
        registry.register("serial_regex", move || Arc::new(SerialRegexDriver::new(h.clone())));
        let h = hal.clone();
        registry.register("serial_temp_humidity", move || {
            Arc::new(SerialRegexDriver::temp_humidity(h.clone()))
        });
        let h = hal;
        registry.register("sht3x", move || Arc::new(Sht3xDriver::new(h.clone())));
        registry.register("daily_json_file", || Arc::new(DailyJsonFileDriver::new()));
        registry.register("openweather", move || Arc::new(OpenWeatherDriver::new(http.clone())));
        registry.register("virtual", || Arc::new(VirtualDriver));

        registry
    }

    /// adds or replaces a constructor; already-built instances are kept
    pub fn register<F>(&mut self, name: &str, factory: F)
    where
        F: Fn() -> Arc<dyn Driver> + Send + Sync + 'static,
    {
        self.factories.insert(name.to_string(), Box::new(factory));
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// the cached instance for `name`, building it on first use
    pub fn get_or_create(&self, name: &str) -> Result<Arc<dyn Driver>, RegistryError> {
        let mut instances = self.instances.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(driver) = instances.get(name) {
            return Ok(driver.clone());
        }

        let factory = self
            .factories
            .get(name)
            .ok_or_else(|| RegistryError::UnknownDriver(name.to_string()))?;
        let driver = factory();
        tracing::debug!("instantiated driver '{}'", name);
        instances.insert(name.to_string(), driver.clone());
        Ok(driver)
    }
}

impl Default for DriverRegistry {
    fn default() -> Self {
        Self::new()
    }
}
