//! Coarse agent lifecycle.
//!
//! ```text
//! Initializing --fetch--> Configuring --ok--> Online
//!                              ^    \--err--> Offline
//!                              |                 |
//!                              +---- next sync --+
//! ```
//!
//! Only `Online` lets the poll scheduler and the command executor act.

use std::fmt;
use std::sync::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentState {
    Initializing,
    Configuring,
    Online,
    Offline,
}

impl fmt::Display for AgentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AgentState::Initializing => "INITIALIZING",
            AgentState::Configuring => "CONFIGURING",
            AgentState::Online => "ONLINE",
            AgentState::Offline => "OFFLINE",
        };
        f.write_str(s)
    }
}

/// Single process-wide state, read by every task
#[derive(Debug)]
pub struct StateMachine {
    state: Mutex<AgentState>,
}

impl StateMachine {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(AgentState::Initializing),
        }
    }

    pub fn current(&self) -> AgentState {
        *self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn is_online(&self) -> bool {
        self.current() == AgentState::Online
    }

    /// Moves to `next`, logging only real transitions
    pub fn set(&self, next: AgentState) {
        let previous = {
            let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
            std::mem::replace(&mut *state, next)
        };
        if previous != next {
            tracing::info!("state change: {} -> {}", previous, next);
        }
    }
}

impl Default for StateMachine {
    fn default() -> Self {
        Self::new()
    }
}
