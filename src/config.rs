//! Configuration shared by the aggregator and the rendezvous coordinator.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::retention::RetentionPolicy;
use crate::telemetry::Channel;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("{policy} retention is not supported on the {channel} channel")]
    UnsupportedPolicy {
        channel: Channel,
        policy: RetentionPolicy,
    },

    #[error("unknown retention policy '{0}'")]
    UnknownPolicy(String),

    #[error("retention policies cannot change while a session is running")]
    PoliciesLocked,

    #[error("invalid configuration: {0}")]
    Invalid(String),

    #[error("failed to parse configuration: {0}")]
    Parse(String),
}

/// Timing and retry settings for a rendezvous.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RendezvousConfig {
    /// Start attempts per connection before giving up.
    pub max_attempts: u32,

    /// Fixed pause between two start attempts on the same connection.
    pub retry_interval_ms: u64,

    /// Pause between two polling rounds while waiting for begin / end.
    pub poll_interval_ms: u64,

    /// Upper bound on the begin barrier (`None` waits forever).
    pub begin_timeout_ms: Option<u64>,

    /// Upper bound on [`Session::wait_for_end`](crate::rendezvous::Session::wait_for_end).
    pub end_timeout_ms: Option<u64>,
}

impl Default for RendezvousConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            retry_interval_ms: 1000,
            poll_interval_ms: 200,
            begin_timeout_ms: Some(120_000),
            end_timeout_ms: None,
        }
    }
}

impl RendezvousConfig {
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_attempts == 0 {
            return Err(ConfigError::Invalid(
                "max_attempts must be at least 1".to_string(),
            ));
        }
        if self.poll_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "poll_interval_ms must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }

    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    pub fn with_retry_interval(mut self, interval: Duration) -> Self {
        self.retry_interval_ms = duration_ms(interval);
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval_ms = duration_ms(interval);
        self
    }

    pub fn with_begin_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.begin_timeout_ms = timeout.map(duration_ms);
        self
    }

    pub fn with_end_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.end_timeout_ms = timeout.map(duration_ms);
        self
    }

    pub fn retry_interval(&self) -> Duration {
        Duration::from_millis(self.retry_interval_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn begin_timeout(&self) -> Option<Duration> {
        self.begin_timeout_ms.map(Duration::from_millis)
    }

    pub fn end_timeout(&self) -> Option<Duration> {
        self.end_timeout_ms.map(Duration::from_millis)
    }
}

fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
