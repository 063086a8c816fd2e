use std::fmt;

use serde::{Deserialize, Serialize};

use crate::telemetry::{RewardVector, TimestampedText, VideoFrame};

/// Everything a connection received since the last read, plus its current
/// session status.
///
/// The `*_since_last_state` counters count every event received, which can be
/// more than the number retained under `LatestOnly` or `Sum`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorldState {
    pub has_begun: bool,
    pub is_running: bool,

    pub video_frames_since_last_state: usize,
    pub rewards_since_last_state: usize,
    pub observations_since_last_state: usize,

    pub video_frames: Vec<VideoFrame>,
    pub rewards: Vec<RewardVector>,
    pub observations: Vec<TimestampedText>,
    pub control_messages: Vec<TimestampedText>,
    pub errors: Vec<TimestampedText>,
}

impl WorldState {
    /// An empty state carrying the given session status.
    pub(crate) fn with_status(has_begun: bool, is_running: bool) -> Self {
        Self {
            has_begun,
            is_running,
            ..Self::default()
        }
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    /// The session began and has since stopped.
    pub fn has_ended(&self) -> bool {
        self.has_begun && !self.is_running
    }

    pub fn latest_observation(&self) -> Option<&TimestampedText> {
        self.observations.last()
    }

    pub fn latest_frame(&self) -> Option<&VideoFrame> {
        self.video_frames.last()
    }

    pub fn error_texts(&self) -> Vec<String> {
        self.errors.iter().map(|e| e.text.clone()).collect()
    }
}

impl fmt::Display for WorldState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let status = if self.is_running {
            "running"
        } else if self.has_begun {
            "ended"
        } else {
            "not running"
        };
        write!(
            f,
            "WorldState ({status}): {} obs, {} rewards, {} frames since last state.",
            self.observations_since_last_state,
            self.rewards_since_last_state,
            self.video_frames_since_last_state
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        let mut state = WorldState::with_status(true, true);
        state.observations_since_last_state = 2;
        state.rewards_since_last_state = 1;
        state.video_frames_since_last_state = 3;
        assert_eq!(
            state.to_string(),
            "WorldState (running): 2 obs, 1 rewards, 3 frames since last state."
        );
        assert_eq!(
            WorldState::with_status(true, false).to_string(),
            "WorldState (ended): 0 obs, 0 rewards, 0 frames since last state."
        );
        assert!(WorldState::default().to_string().starts_with("WorldState (not running)"));
    }

    #[test]
    fn test_has_ended() {
        assert!(!WorldState::default().has_ended());
        assert!(!WorldState::with_status(true, true).has_ended());
        assert!(WorldState::with_status(true, false).has_ended());
    }
}
