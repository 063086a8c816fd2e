use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info, trace};

use super::sink::TelemetrySink;
use super::state::WorldState;
use crate::config::ConfigError;
use crate::retention::{self, TelemetryPolicies};
use crate::telemetry::{ControlSignal, RewardVector, TelemetryEvent, Timestamp, TimestampedText};

#[derive(Debug, Default)]
struct Inner {
    state: WorldState,
    policies: TelemetryPolicies,
    /// Set once a start has been accepted; cleared when the session ends.
    policies_locked: bool,
}

/// The world state of one connection, shared between the delivery path and
/// any number of readers.
///
/// Every operation takes the same per-connection lock, so a reader never sees
/// a counter bumped without the matching retained event. Retention is applied
/// as events arrive; reads only copy.
#[derive(Debug, Clone, Default)]
pub struct WorldStateAggregator {
    inner: Arc<Mutex<Inner>>,
}

impl WorldStateAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_policies(policies: TelemetryPolicies) -> Result<Self, ConfigError> {
        policies.validate()?;
        Ok(Self {
            inner: Arc::new(Mutex::new(Inner {
                state: WorldState::default(),
                policies,
                policies_locked: false,
            })),
        })
    }

    pub fn policies(&self) -> TelemetryPolicies {
        self.inner.lock().policies
    }

    /// Replaces the retention policies. Refused from an accepted start until
    /// the session ends.
    pub fn set_policies(&self, policies: TelemetryPolicies) -> Result<(), ConfigError> {
        policies.validate()?;
        let mut inner = self.inner.lock();
        if inner.policies_locked || inner.state.is_running {
            return Err(ConfigError::PoliciesLocked);
        }
        debug!(?policies, "retention policies updated");
        inner.policies = policies;
        Ok(())
    }

    /// Freezes the retention policies for the session about to begin.
    pub fn lock_policies(&self) {
        self.inner.lock().policies_locked = true;
    }

    pub fn policies_locked(&self) -> bool {
        let inner = self.inner.lock();
        inner.policies_locked || inner.state.is_running
    }

    /// Handle for the transport that feeds this aggregator.
    pub fn sink(&self) -> TelemetrySink {
        TelemetrySink::new(self.clone())
    }

    /// Applies one event under the active policy. Never fails: a malformed
    /// event is recorded as an error event instead.
    pub fn deliver(&self, event: TelemetryEvent) {
        trace!(channel = %event.channel(), "telemetry delivered");
        self.inner.lock().apply(event);
    }

    /// Copy of the current state; nothing is cleared.
    pub fn peek(&self) -> WorldState {
        self.inner.lock().state.clone()
    }

    /// Copy of the current state, leaving an empty one behind. The session
    /// status flags carry over.
    pub fn take(&self) -> WorldState {
        let mut inner = self.inner.lock();
        let next = WorldState::with_status(inner.state.has_begun, inner.state.is_running);
        std::mem::replace(&mut inner.state, next)
    }

    /// Forgets everything, session status included. Used before a new start.
    pub fn reset(&self) {
        let mut inner = self.inner.lock();
        inner.state = WorldState::default();
        inner.policies_locked = false;
    }

    pub fn has_begun(&self) -> bool {
        self.inner.lock().state.has_begun
    }

    pub fn is_running(&self) -> bool {
        self.inner.lock().state.is_running
    }

    /// Marks the session stopped from the host side (e.g. after `stop`).
    pub fn mark_stopped(&self) {
        let mut inner = self.inner.lock();
        inner.state.is_running = false;
        inner.policies_locked = false;
    }
}

#[cfg(test)]
impl WorldStateAggregator {
    /// Runs `f` while holding the state lock.
    pub(crate) fn with_state_locked<R>(&self, f: impl FnOnce() -> R) -> R {
        let _guard = self.inner.lock();
        f()
    }
}

impl Inner {
    fn apply(&mut self, event: TelemetryEvent) {
        match event {
            TelemetryEvent::Video(frame) => {
                if let Err(e) = frame.validate() {
                    self.push_error(frame.timestamp, format!("Dropped video frame: {e}"));
                    return;
                }
                let retained = std::mem::take(&mut self.state.video_frames);
                self.state.video_frames = retention::apply(self.policies.video, retained, frame);
                self.state.video_frames_since_last_state += 1;
            }
            TelemetryEvent::Reward(reward) => self.process_reward(reward),
            TelemetryEvent::Observation(observation) => {
                let retained = std::mem::take(&mut self.state.observations);
                self.state.observations =
                    retention::apply(self.policies.observations, retained, observation);
                self.state.observations_since_last_state += 1;
            }
            TelemetryEvent::Control(message) => self.process_control(message),
            TelemetryEvent::Error(error) => self.state.errors.push(error),
        }
    }

    fn process_reward(&mut self, reward: RewardVector) {
        let retained = std::mem::take(&mut self.state.rewards);
        self.state.rewards = retention::apply(self.policies.rewards, retained, reward);
        self.state.rewards_since_last_state += 1;
    }

    fn process_control(&mut self, message: TimestampedText) {
        let signal = match ControlSignal::classify(&message.text) {
            Ok(signal) => signal,
            Err(e) => {
                self.push_error(message.timestamp, e.to_string());
                return;
            }
        };

        match signal {
            ControlSignal::SessionBegin if !self.state.is_running => {
                info!("session began");
                self.state.has_begun = true;
                self.state.is_running = true;
            }
            ControlSignal::SessionEnd {
                status,
                description,
                final_reward,
            } => {
                if !status.is_normal() {
                    let detail = description.unwrap_or_else(|| status.to_string());
                    self.push_error(
                        message.timestamp,
                        format!("Mission ended abnormally: {detail}"),
                    );
                }
                if self.state.is_running && !final_reward.is_empty() {
                    self.process_final_reward(message.timestamp, &final_reward);
                }
                info!(normal = status.is_normal(), "session ended");
                self.state.is_running = false;
                self.policies_locked = false;
            }
            ControlSignal::Ping => {}
            ControlSignal::SessionBegin => {
                self.push_error(
                    message.timestamp,
                    "Mission control message MissionInit received while a mission is running"
                        .to_string(),
                );
                return;
            }
            ControlSignal::Unknown(root) => {
                self.push_error(
                    message.timestamp,
                    format!("Unknown mission control message root node or at wrong time: {root}"),
                );
                return;
            }
        }

        self.state.control_messages.push(message);
    }

    fn process_final_reward(&mut self, timestamp: Timestamp, values: &[(usize, f64)]) {
        let mut reward = RewardVector::new(timestamp);
        for (dimension, value) in values {
            if let Err(e) = reward.set(*dimension, *value) {
                self.push_error(timestamp, format!("Error parsing final reward: {e}"));
                return;
            }
        }
        self.process_reward(reward);
    }

    fn push_error(&mut self, timestamp: Timestamp, text: String) {
        debug!(error = %text, "telemetry converted to error");
        self.state.errors.push(TimestampedText::new(timestamp, text));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retention::RetentionPolicy;
    use crate::telemetry::{Pose, VideoFrame};
    use chrono::Utc;

    const BEGIN: &str = "<MissionInit><ExperimentUID>e</ExperimentUID></MissionInit>";
    const END: &str = "<MissionEnded><Status>ENDED</Status></MissionEnded>";

    fn frame(tag: u8) -> VideoFrame {
        VideoFrame::new(Utc::now(), 2, 1, 3, Pose::default(), vec![tag; 6]).unwrap()
    }

    fn observation(text: &str) -> TelemetryEvent {
        TelemetryEvent::Observation(TimestampedText::now(text))
    }

    fn control(text: &str) -> TelemetryEvent {
        TelemetryEvent::Control(TimestampedText::now(text))
    }

    fn begun_aggregator(policies: TelemetryPolicies) -> WorldStateAggregator {
        let aggregator = WorldStateAggregator::with_policies(policies).unwrap();
        aggregator.deliver(control(BEGIN));
        aggregator
    }

    #[test]
    fn test_take_is_exhaustive_and_clearing() {
        let aggregator = begun_aggregator(TelemetryPolicies::default());
        for i in 0..4 {
            aggregator.deliver(TelemetryEvent::Video(frame(i)));
            aggregator.deliver(TelemetryEvent::Reward(RewardVector::primary(Utc::now(), 1.0)));
        }
        aggregator.deliver(observation("{}"));

        let first = aggregator.take();
        assert_eq!(first.video_frames_since_last_state, 4);
        assert_eq!(first.rewards_since_last_state, 4);
        assert_eq!(first.observations_since_last_state, 1);
        assert!(first.has_begun && first.is_running);

        let second = aggregator.take();
        assert_eq!(second.video_frames_since_last_state, 0);
        assert_eq!(second.rewards_since_last_state, 0);
        assert_eq!(second.observations_since_last_state, 0);
        assert!(second.video_frames.is_empty());
        assert!(second.rewards.is_empty());
        assert!(second.observations.is_empty());
        assert!(second.control_messages.is_empty());
        assert!(second.has_begun && second.is_running);
    }

    #[test]
    fn test_latest_only_frames() {
        let aggregator = WorldStateAggregator::new();
        let frames: Vec<_> = (1..=3).map(frame).collect();
        for f in &frames {
            aggregator.deliver(TelemetryEvent::Video(f.clone()));
        }
        let state = aggregator.take();
        assert_eq!(state.video_frames, vec![frames[2].clone()]);
        assert_eq!(state.video_frames_since_last_state, 3);
    }

    #[test]
    fn test_sum_rewards() {
        let aggregator = WorldStateAggregator::with_policies(
            TelemetryPolicies::default().with_rewards(RetentionPolicy::Sum),
        )
        .unwrap();
        for r in [1.0, 2.5, -0.5] {
            aggregator.deliver(TelemetryEvent::Reward(RewardVector::primary(Utc::now(), r)));
        }
        let state = aggregator.take();
        assert_eq!(state.rewards.len(), 1);
        assert_eq!(state.rewards[0].value(), Some(3.0));
        assert_eq!(state.rewards_since_last_state, 3);
    }

    #[test]
    fn test_keep_all_observations_in_order() {
        let aggregator = WorldStateAggregator::with_policies(
            TelemetryPolicies::default().with_observations(RetentionPolicy::KeepAll),
        )
        .unwrap();
        let sent: Vec<_> = ["o1", "o2", "o3"]
            .into_iter()
            .map(TimestampedText::now)
            .collect();
        for o in &sent {
            aggregator.deliver(TelemetryEvent::Observation(o.clone()));
        }
        let state = aggregator.take();
        assert_eq!(state.observations, sent);
        assert_eq!(state.observations_since_last_state, 3);
    }

    #[test]
    fn test_peek_does_not_clear() {
        let aggregator = WorldStateAggregator::new();
        aggregator.deliver(observation("a"));
        assert_eq!(aggregator.peek().observations_since_last_state, 1);
        assert_eq!(aggregator.peek().observations_since_last_state, 1);
        assert_eq!(aggregator.take().observations_since_last_state, 1);
        assert_eq!(aggregator.peek().observations_since_last_state, 0);
    }

    #[test]
    fn test_malformed_frame_becomes_error() {
        let aggregator = WorldStateAggregator::new();
        let mut bad = frame(0);
        bad.pixels.truncate(5);
        aggregator.deliver(TelemetryEvent::Video(bad));

        let state = aggregator.take();
        assert!(state.video_frames.is_empty());
        assert_eq!(state.video_frames_since_last_state, 0);
        assert_eq!(state.errors.len(), 1);
        assert!(state.errors[0].text.contains("pixel buffer"));
    }

    #[test]
    fn test_session_lifecycle_flags() {
        let aggregator = WorldStateAggregator::new();
        assert!(!aggregator.has_begun());

        aggregator.deliver(control(BEGIN));
        assert!(aggregator.has_begun());
        assert!(aggregator.is_running());

        aggregator.deliver(control("<ping/>"));
        aggregator.deliver(control(END));
        let state = aggregator.take();
        assert!(state.has_ended());
        assert_eq!(state.control_messages.len(), 3);
        assert!(state.errors.is_empty());
    }

    #[test]
    fn test_abnormal_end_records_error_and_final_reward() {
        let aggregator = begun_aggregator(TelemetryPolicies::default());
        aggregator.deliver(TelemetryEvent::Reward(RewardVector::primary(Utc::now(), 2.0)));
        aggregator.deliver(control(
            "<MissionEnded><Status>MOD_CRASHED</Status><HumanReadableStatus>Mod crashed</HumanReadableStatus>\
             <Reward><Value dimension=\"0\" value=\"5\"/></Reward></MissionEnded>",
        ));

        let state = aggregator.take();
        assert!(!state.is_running);
        assert_eq!(state.error_texts(), vec!["Mission ended abnormally: Mod crashed"]);
        assert_eq!(state.rewards[0].value(), Some(7.0));
        assert_eq!(state.rewards_since_last_state, 2);
    }

    #[test]
    fn test_unknown_control_message_is_an_error() {
        let aggregator = WorldStateAggregator::new();
        aggregator.deliver(control("<Surprise/>"));
        aggregator.deliver(control(""));
        let state = aggregator.take();
        assert!(state.control_messages.is_empty());
        assert_eq!(state.errors.len(), 2);
    }

    #[test]
    fn test_second_begin_while_running_is_an_error() {
        let aggregator = begun_aggregator(TelemetryPolicies::default());
        aggregator.deliver(control(BEGIN));
        let state = aggregator.take();
        assert_eq!(state.control_messages.len(), 1);
        assert_eq!(state.errors.len(), 1);
    }

    #[test]
    fn test_policies_locked_while_running() {
        let aggregator = WorldStateAggregator::new();
        let keep_all = TelemetryPolicies::keep_all();
        assert!(aggregator.set_policies(keep_all).is_ok());

        aggregator.deliver(control(BEGIN));
        assert_eq!(
            aggregator.set_policies(TelemetryPolicies::default()),
            Err(ConfigError::PoliciesLocked)
        );
        assert_eq!(aggregator.policies(), keep_all);

        aggregator.deliver(control(END));
        assert!(aggregator.set_policies(TelemetryPolicies::default()).is_ok());
    }

    #[test]
    fn test_policies_locked_from_accepted_start() {
        let aggregator = WorldStateAggregator::new();
        aggregator.lock_policies();
        assert!(aggregator.policies_locked());
        assert_eq!(
            aggregator.set_policies(TelemetryPolicies::keep_all()),
            Err(ConfigError::PoliciesLocked)
        );

        aggregator.deliver(control(BEGIN));
        aggregator.deliver(control(END));
        assert!(!aggregator.policies_locked());
        assert!(aggregator.set_policies(TelemetryPolicies::keep_all()).is_ok());

        aggregator.lock_policies();
        aggregator.reset();
        assert!(aggregator.set_policies(TelemetryPolicies::default()).is_ok());
    }

    #[test]
    fn test_invalid_policies_rejected() {
        let bad = TelemetryPolicies::default().with_video(RetentionPolicy::Sum);
        assert!(WorldStateAggregator::with_policies(bad).is_err());
        assert!(WorldStateAggregator::new().set_policies(bad).is_err());
    }

    #[test]
    fn test_reset_clears_status() {
        let aggregator = begun_aggregator(TelemetryPolicies::default());
        aggregator.reset();
        assert_eq!(aggregator.peek(), WorldState::default());
    }

    #[test]
    fn test_concurrent_delivery_and_take() {
        let aggregator = WorldStateAggregator::with_policies(TelemetryPolicies::keep_all()).unwrap();
        let producers: Vec<_> = (0..4)
            .map(|_| {
                let aggregator = aggregator.clone();
                std::thread::spawn(move || {
                    for i in 0..250 {
                        aggregator.deliver(observation(&i.to_string()));
                    }
                })
            })
            .collect();

        let mut seen = 0;
        let mut retained = 0;
        while producers.iter().any(|p| !p.is_finished()) {
            let state = aggregator.take();
            assert_eq!(state.observations.len(), state.observations_since_last_state);
            seen += state.observations_since_last_state;
            retained += state.observations.len();
        }
        for producer in producers {
            producer.join().unwrap();
        }
        let last = aggregator.take();
        seen += last.observations_since_last_state;
        retained += last.observations.len();

        assert_eq!(seen, 1000);
        assert_eq!(retained, 1000);
    }
}
