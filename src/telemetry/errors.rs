use thiserror::Error;

use super::frame::FrameType;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum TelemetryError {
    #[error(
        "pixel buffer holds {actual} bytes but a {width}x{height}x{channels} frame needs {expected}"
    )]
    PixelBufferSize {
        width: u16,
        height: u16,
        channels: u8,
        expected: usize,
        actual: usize,
    },

    #[error("{frame_type} frames cannot have {channels} channels")]
    ChannelCount { frame_type: FrameType, channels: u8 },

    #[error("Malformed reward message: {0}")]
    MalformedReward(String),

    #[error("reward dimension {dimension} is out of range (at most {max} dimensions)")]
    DimensionOutOfRange { dimension: usize, max: usize },

    #[error("Empty XML string in mission control message")]
    EmptyControlMessage,

    #[error("Error parsing mission control message as XML: {0}")]
    MalformedControlMessage(String),
}
