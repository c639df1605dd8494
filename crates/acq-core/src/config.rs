//! Acquisition configuration.
//!
//! Vendor backends pick very different buffer counts and reserve margins;
//! both are plain config here with conservative defaults. Durations accept
//! humantime strings (`"100ms"`, `"5s"`) when deserialized from files.

use crate::error::{AcqError, AcqResult};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for one acquisition session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AcqConfig {
    /// Number of ring slots to allocate (default: 16)
    #[serde(default = "default_buffer_count")]
    pub buffer_count: usize,

    /// Trailing slots reserved for the driver before backlog counts as
    /// overflow (default: 2)
    #[serde(default = "default_overflow_margin")]
    pub overflow_margin: usize,

    /// Timeout handed to the driver's blocking wait in the polling loop
    /// (default: 100ms)
    #[serde(default = "default_poll_timeout", with = "humantime_serde")]
    pub poll_timeout: Duration,

    /// Polling interval used by consumer-side waits (default: 1ms)
    #[serde(default = "default_wait_interval", with = "humantime_serde")]
    pub wait_interval: Duration,

    /// How long `stop()` waits for the producer thread to exit before
    /// reporting a fatal error (default: 5s)
    #[serde(default = "default_stop_deadline", with = "humantime_serde")]
    pub stop_deadline: Duration,
}

fn default_buffer_count() -> usize {
    16
}
fn default_overflow_margin() -> usize {
    2
}
fn default_poll_timeout() -> Duration {
    Duration::from_millis(100)
}
fn default_wait_interval() -> Duration {
    Duration::from_millis(1)
}
fn default_stop_deadline() -> Duration {
    Duration::from_secs(5)
}

impl Default for AcqConfig {
    fn default() -> Self {
        Self {
            buffer_count: default_buffer_count(),
            overflow_margin: default_overflow_margin(),
            poll_timeout: default_poll_timeout(),
            wait_interval: default_wait_interval(),
            stop_deadline: default_stop_deadline(),
        }
    }
}

impl AcqConfig {
    /// Check the configuration for values that cannot work.
    pub fn validate(&self) -> AcqResult<()> {
        if self.buffer_count < 1 {
            return Err(AcqError::Config(
                "buffer_count must be at least 1".to_string(),
            ));
        }
        if self.overflow_margin < 1 {
            return Err(AcqError::Config(
                "overflow_margin must be at least 1".to_string(),
            ));
        }
        if self.overflow_margin >= self.buffer_count {
            return Err(AcqError::Config(format!(
                "overflow_margin ({}) must be smaller than buffer_count ({})",
                self.overflow_margin, self.buffer_count
            )));
        }
        if self.poll_timeout.is_zero() {
            return Err(AcqError::Config("poll_timeout must be non-zero".to_string()));
        }
        if self.wait_interval.is_zero() {
            return Err(AcqError::Config(
                "wait_interval must be non-zero".to_string(),
            ));
        }
        if self.stop_deadline.is_zero() {
            return Err(AcqError::Config(
                "stop_deadline must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}
