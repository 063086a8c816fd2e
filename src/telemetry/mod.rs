//! Timestamped telemetry produced by a single remote participant.
//!
//! Five kinds of event travel from a participant to the host: video frames,
//! reward vectors, observation text, control messages and error text. Each
//! carries the wall-clock time at which it was captured.

mod control;
mod errors;
mod frame;
mod reward;
mod types;

pub use control::{ControlSignal, EndStatus};
pub use errors::TelemetryError;
pub use frame::{FrameType, Pose, VideoFrame};
pub use reward::{MAX_REWARD_DIMENSIONS, RewardVector};
pub use types::{Channel, TelemetryEvent, Timestamp, TimestampedText};
