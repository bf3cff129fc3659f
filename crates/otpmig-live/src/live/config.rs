//! Runtime settings for the live server.

use std::path::Path;
use std::time::Duration;

use otpmig_otp::migration::engine::DEFAULT_BIAS_SECS;
use otpmig_otp::migration::OtpEngine;
use serde::{Deserialize, Serialize};

use super::broker::{DEFAULT_EVENT, DEFAULT_QUEUE_CAPACITY};
use super::error::{LiveError, LiveResult};

/// Live server configuration. Missing JSON fields take their defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LiveConfig {
    /// Listen address, `host:port`.
    pub bind: String,
    /// Producer tick period in milliseconds.
    pub interval_ms: u64,
    /// Per-subscriber queue depth.
    pub queue_capacity: usize,
    /// SSE event name; empty sends unnamed events.
    pub event_name: String,
    /// Forward clock bias for TOTP evaluation.
    pub time_bias_secs: i64,
}

impl Default for LiveConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8080".into(),
            interval_ms: 500,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            event_name: DEFAULT_EVENT.into(),
            time_bias_secs: DEFAULT_BIAS_SECS,
        }
    }
}

impl LiveConfig {
    pub fn from_json_str(json: &str) -> LiveResult<Self> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| LiveError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a JSON config file.
    pub fn from_json_file(path: &Path) -> LiveResult<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| LiveError::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_json_str(&raw)
    }

    pub fn validate(&self) -> LiveResult<()> {
        if self.bind.trim().is_empty() {
            return Err(LiveError::Config("bind address is empty".into()));
        }
        if self.interval_ms == 0 {
            return Err(LiveError::Config("interval_ms must be positive".into()));
        }
        if self.queue_capacity == 0 {
            return Err(LiveError::Config("queue_capacity must be positive".into()));
        }
        Ok(())
    }

    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn engine(&self) -> OtpEngine {
        OtpEngine::with_bias_secs(self.time_bias_secs)
    }

    pub fn event(&self) -> Option<String> {
        if self.event_name.is_empty() {
            None
        } else {
            Some(self.event_name.clone())
        }
    }
}
