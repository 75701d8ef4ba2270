//! Worker configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::SpindleError;
use crate::queue::MAX_CAPACITY;

/// Default queue capacity.
pub const DEFAULT_CAPACITY: usize = 10;

/// Default bound on how long `stop` waits for the loop to exit.
pub const DEFAULT_STOP_TIMEOUT_MS: u64 = 5_000;

/// What `stop` does with items still buffered in the queue.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DrainPolicy {
    /// Process everything buffered before the loop exits.
    #[default]
    Drain,

    /// Drop buffered items; their tickets resolve to `Abandoned`.
    Abandon,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    pub capacity: usize,
    pub drain_policy: DrainPolicy,
    pub stop_timeout_ms: u64,
}

impl WorkerConfig {
    /// # Errors
    /// [`SpindleError::InvalidCapacity`] when `capacity` is zero or above
    /// [`MAX_CAPACITY`].
    pub fn validate(&self) -> Result<(), SpindleError> {
        if self.capacity == 0 || self.capacity > MAX_CAPACITY {
            return Err(SpindleError::InvalidCapacity(self.capacity));
        }
        Ok(())
    }

    pub fn stop_timeout(&self) -> Duration {
        Duration::from_millis(self.stop_timeout_ms)
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
            drain_policy: DrainPolicy::default(),
            stop_timeout_ms: DEFAULT_STOP_TIMEOUT_MS,
        }
    }
}
