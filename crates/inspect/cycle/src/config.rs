//! Detection cycle configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{CycleError, CycleResult};

/// Default grace window the tracker waits for the 2D pass once the 3D pass
/// has reported.
pub const DEFAULT_TIMEOUT_GRACE_MS: u64 = 2000;

/// Default capacity of the cycle event channel.
pub const DEFAULT_EVENT_CAPACITY: usize = 1024;

/// Configuration for the cycle tracker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CycleConfig {
    /// Grace window for the 2D pass, in milliseconds.
    #[serde(default = "default_timeout_grace_ms")]
    pub timeout_grace_ms: u64,

    /// Capacity of the broadcast channel carrying cycle events.
    #[serde(default = "default_event_capacity")]
    pub event_channel_capacity: usize,
}

impl Default for CycleConfig {
    fn default() -> Self {
        Self {
            timeout_grace_ms: DEFAULT_TIMEOUT_GRACE_MS,
            event_channel_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }
}

impl CycleConfig {
    /// Grace window as a duration.
    pub fn timeout_grace(&self) -> Duration {
        Duration::from_millis(self.timeout_grace_ms)
    }

    /// Reject values the tracker cannot run with.
    pub fn validate(&self) -> CycleResult<()> {
        if self.timeout_grace_ms == 0 {
            return Err(CycleError::Configuration(
                "timeout_grace_ms must be greater than zero".into(),
            ));
        }
        if self.event_channel_capacity == 0 {
            return Err(CycleError::Configuration(
                "event_channel_capacity must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}

fn default_timeout_grace_ms() -> u64 {
    DEFAULT_TIMEOUT_GRACE_MS
}

fn default_event_capacity() -> usize {
    DEFAULT_EVENT_CAPACITY
}
