//! Field agent for a weather-station device: pulls its configuration from a
//! control server, polls the configured sensors one at a time and executes
//! queued commands.

pub mod agent;
pub mod client;
pub mod commands;
pub mod config;
pub mod context;
pub mod domain;
pub mod drivers;
pub mod hal;
pub mod registry;
pub mod reporter;
pub mod scheduler;
pub mod state;
pub mod sync;

pub use agent::Agent;
pub use config::AgentSettings;
