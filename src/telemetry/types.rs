use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::frame::VideoFrame;
use super::reward::RewardVector;

/// Capture time of a telemetry event (UTC, sub-second precision).
pub type Timestamp = DateTime<Utc>;

/// A single text payload: an observation (usually JSON), a control message or
/// an error report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimestampedText {
    pub timestamp: Timestamp,
    pub text: String,
}

impl TimestampedText {
    pub fn new(timestamp: Timestamp, text: impl Into<String>) -> Self {
        Self {
            timestamp,
            text: text.into(),
        }
    }

    /// Stamps `text` with the current time.
    pub fn now(text: impl Into<String>) -> Self {
        Self::new(Utc::now(), text)
    }

    /// Observations are JSON documents; this decodes one.
    pub fn json(&self) -> Result<serde_json::Value, serde_json::Error> {
        serde_json::from_str(&self.text)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    Video,
    Reward,
    Observation,
    Control,
    Error,
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Channel::Video => "video",
            Channel::Reward => "reward",
            Channel::Observation => "observation",
            Channel::Control => "control",
            Channel::Error => "error",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TelemetryEvent {
    Video(VideoFrame),
    Reward(RewardVector),
    Observation(TimestampedText),
    Control(TimestampedText),
    Error(TimestampedText),
}

impl TelemetryEvent {
    pub fn timestamp(&self) -> Timestamp {
        match self {
            TelemetryEvent::Video(frame) => frame.timestamp,
            TelemetryEvent::Reward(reward) => reward.timestamp,
            TelemetryEvent::Observation(text)
            | TelemetryEvent::Control(text)
            | TelemetryEvent::Error(text) => text.timestamp,
        }
    }

    pub fn channel(&self) -> Channel {
        match self {
            TelemetryEvent::Video(_) => Channel::Video,
            TelemetryEvent::Reward(_) => Channel::Reward,
            TelemetryEvent::Observation(_) => Channel::Observation,
            TelemetryEvent::Control(_) => Channel::Control,
            TelemetryEvent::Error(_) => Channel::Error,
        }
    }

    pub fn error_now(text: impl Into<String>) -> Self {
        TelemetryEvent::Error(TimestampedText::now(text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_observation_json() {
        let obs = TimestampedText::now(r#"{"XPos": 1.5, "Life": 20}"#);
        let value = obs.json().unwrap();
        assert_eq!(value["Life"], 20);
    }

    #[test]
    fn test_event_channel_and_timestamp() {
        let text = TimestampedText::now("boom");
        let ts = text.timestamp;
        let event = TelemetryEvent::Error(text);
        assert_eq!(event.channel(), Channel::Error);
        assert_eq!(event.timestamp(), ts);
        assert_eq!(Channel::Observation.to_string(), "observation");
    }
}
