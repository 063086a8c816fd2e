use futures::{Stream, StreamExt};
use tokio::task::JoinHandle;
use tracing::debug;

use super::aggregator::WorldStateAggregator;
use crate::telemetry::{RewardVector, TelemetryEvent, Timestamp, TimestampedText, VideoFrame};

/// Delivery boundary handed to a connection's transport.
///
/// Raw payloads are turned into events here; anything that fails to parse is
/// delivered as error text so the polling side keeps working.
#[derive(Debug, Clone)]
pub struct TelemetrySink {
    aggregator: WorldStateAggregator,
}

impl TelemetrySink {
    pub(crate) fn new(aggregator: WorldStateAggregator) -> Self {
        Self { aggregator }
    }

    pub fn deliver(&self, event: TelemetryEvent) {
        self.aggregator.deliver(event);
    }

    pub fn on_video(&self, frame: VideoFrame) {
        self.deliver(TelemetryEvent::Video(frame));
    }

    /// A reward in `"<dim>:<value>,..."` form.
    pub fn on_reward_text(&self, timestamp: Timestamp, text: &str) {
        let event = match RewardVector::parse(timestamp, text) {
            Ok(reward) => TelemetryEvent::Reward(reward),
            Err(e) => TelemetryEvent::Error(TimestampedText::new(
                timestamp,
                format!("Error parsing Reward message: {e} : {text}"),
            )),
        };
        self.deliver(event);
    }

    pub fn on_reward(&self, reward: RewardVector) {
        self.deliver(TelemetryEvent::Reward(reward));
    }

    pub fn on_observation(&self, timestamp: Timestamp, text: impl Into<String>) {
        self.deliver(TelemetryEvent::Observation(TimestampedText::new(timestamp, text)));
    }

    pub fn on_control(&self, timestamp: Timestamp, text: impl Into<String>) {
        self.deliver(TelemetryEvent::Control(TimestampedText::new(timestamp, text)));
    }

    pub fn on_error(&self, timestamp: Timestamp, text: impl Into<String>) {
        self.deliver(TelemetryEvent::Error(TimestampedText::new(timestamp, text)));
    }

    /// Pumps `events` into the aggregator on a background task. The task
    /// resolves to the number of events delivered once the stream ends.
    pub fn forward<S>(&self, events: S) -> JoinHandle<usize>
    where
        S: Stream<Item = TelemetryEvent> + Send + 'static,
    {
        let sink = self.clone();
        tokio::spawn(async move {
            let mut events = Box::pin(events);
            let mut delivered = 0;
            while let Some(event) = events.next().await {
                sink.deliver(event);
                delivered += 1;
            }
            debug!(delivered, "telemetry stream closed");
            delivered
        })
    }
}
