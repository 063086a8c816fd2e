use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::config::ConfigError;
use crate::telemetry::{Channel, RewardVector, TimestampedText, VideoFrame};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetentionPolicy {
    /// Discard all but the most recent event.
    #[default]
    LatestOnly,
    /// Keep every event in delivery order.
    KeepAll,
    /// Collapse everything into one running total (rewards only).
    Sum,
}

impl fmt::Display for RetentionPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RetentionPolicy::LatestOnly => "latest_only",
            RetentionPolicy::KeepAll => "keep_all",
            RetentionPolicy::Sum => "sum",
        };
        f.write_str(name)
    }
}

impl FromStr for RetentionPolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "latest_only" | "latest" => Ok(RetentionPolicy::LatestOnly),
            "keep_all" | "all" => Ok(RetentionPolicy::KeepAll),
            "sum" => Ok(RetentionPolicy::Sum),
            _ => Err(ConfigError::UnknownPolicy(s.to_string())),
        }
    }
}

/// An event kind the retention engine can hold.
pub trait Retained: Sized {
    /// Folds `incoming` into `self` for [`RetentionPolicy::Sum`]. Kinds that
    /// cannot be summed hand the event back unchanged.
    fn accumulate(&mut self, incoming: Self) -> Option<Self> {
        Some(incoming)
    }
}

impl Retained for VideoFrame {}

impl Retained for TimestampedText {}

impl Retained for RewardVector {
    fn accumulate(&mut self, mut incoming: Self) -> Option<Self> {
        let newest = self.timestamp.max(incoming.timestamp);
        incoming.add(self);
        incoming.timestamp = newest;
        *self = incoming;
        None
    }
}

/// Computes the retained sequence after `incoming` arrives under `policy`.
///
/// Under `Sum` the sequence holds at most one element, the running total. A
/// kind that cannot be summed falls back to `LatestOnly`.
pub fn apply<T: Retained>(policy: RetentionPolicy, mut retained: Vec<T>, incoming: T) -> Vec<T> {
    match policy {
        RetentionPolicy::LatestOnly => {
            retained.clear();
            retained.push(incoming);
        }
        RetentionPolicy::KeepAll => retained.push(incoming),
        RetentionPolicy::Sum => {
            let Some(mut total) = retained.pop() else {
                retained.push(incoming);
                return retained;
            };
            retained.clear();
            match total.accumulate(incoming) {
                None => retained.push(total),
                Some(unsummed) => retained.push(unsummed),
            }
        }
    }
    retained
}

/// Retention policy for each channel of one connection. Control messages and
/// errors are always kept in full.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryPolicies {
    pub video: RetentionPolicy,
    pub rewards: RetentionPolicy,
    pub observations: RetentionPolicy,
}

impl Default for TelemetryPolicies {
    fn default() -> Self {
        Self {
            video: RetentionPolicy::LatestOnly,
            rewards: RetentionPolicy::Sum,
            observations: RetentionPolicy::LatestOnly,
        }
    }
}

impl TelemetryPolicies {
    pub fn keep_all() -> Self {
        Self {
            video: RetentionPolicy::KeepAll,
            rewards: RetentionPolicy::KeepAll,
            observations: RetentionPolicy::KeepAll,
        }
    }

    pub fn with_video(mut self, policy: RetentionPolicy) -> Self {
        self.video = policy;
        self
    }

    pub fn with_rewards(mut self, policy: RetentionPolicy) -> Self {
        self.rewards = policy;
        self
    }

    pub fn with_observations(mut self, policy: RetentionPolicy) -> Self {
        self.observations = policy;
        self
    }

    pub fn policy_for(&self, channel: Channel) -> RetentionPolicy {
        match channel {
            Channel::Video => self.video,
            Channel::Reward => self.rewards,
            Channel::Observation => self.observations,
            Channel::Control | Channel::Error => RetentionPolicy::KeepAll,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for (channel, policy) in [
            (Channel::Video, self.video),
            (Channel::Observation, self.observations),
        ] {
            if policy == RetentionPolicy::Sum {
                return Err(ConfigError::UnsupportedPolicy { channel, policy });
            }
        }
        Ok(())
    }
}
