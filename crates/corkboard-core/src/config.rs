//! Session configuration.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::app::RetryPolicy;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Tunables for a [`BoardSession`](crate::app::BoardSession).
///
/// ```json
/// { "retry": { "max_attempts": 3, "base_delay_ms": 100 }, "command_buffer": 32 }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Retry policy for position mutations.
    pub retry: RetryPolicy,

    /// Capacity of the handle → session command channel.
    pub command_buffer: usize,

    /// Per-subscriber snapshot buffer of the in-memory remote source.
    pub subscription_buffer: usize,

    /// Wait before resubscribing after the snapshot stream ends.
    pub resubscribe_delay_ms: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            command_buffer: 64,
            subscription_buffer: 16,
            resubscribe_delay_ms: 500,
        }
    }
}

impl SessionConfig {
    pub fn from_json_str(s: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(s)?)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json_str(&raw)
    }

    pub fn resubscribe_delay(&self) -> Duration {
        Duration::from_millis(self.resubscribe_delay_ms)
    }
}
