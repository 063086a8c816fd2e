use std::fmt;

use serde::{Deserialize, Serialize};

use super::errors::TelemetryError;
use super::types::Timestamp;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FrameType {
    /// 24bpp RGB or 32bpp RGBD.
    #[default]
    Video,
    /// 32bpp float depth map.
    DepthMap,
    /// 8bpp greyscale.
    Luminance,
    /// 24bpp colour map.
    ColourMap,
}

impl FrameType {
    pub fn accepts_channels(self, channels: u8) -> bool {
        match self {
            FrameType::Video => matches!(channels, 3 | 4),
            FrameType::DepthMap => channels == 4,
            FrameType::Luminance => channels == 1,
            FrameType::ColourMap => channels == 3,
        }
    }
}

impl fmt::Display for FrameType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FrameType::Video => "video",
            FrameType::DepthMap => "depth map",
            FrameType::Luminance => "luminance",
            FrameType::ColourMap => "colour map",
        };
        f.write_str(name)
    }
}

/// Where the participant's camera was when the frame was captured.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Pose {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub pitch: f32,
    pub yaw: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoFrame {
    pub timestamp: Timestamp,
    pub width: u16,
    pub height: u16,
    pub channels: u8,
    pub frame_type: FrameType,
    pub pose: Pose,
    pub pixels: Vec<u8>,
}

impl VideoFrame {
    /// Builds a validated `Video` frame.
    pub fn new(
        timestamp: Timestamp,
        width: u16,
        height: u16,
        channels: u8,
        pose: Pose,
        pixels: Vec<u8>,
    ) -> Result<Self, TelemetryError> {
        let frame = Self {
            timestamp,
            width,
            height,
            channels,
            frame_type: FrameType::Video,
            pose,
            pixels,
        };
        frame.validate()?;
        Ok(frame)
    }

    pub fn with_frame_type(mut self, frame_type: FrameType) -> Result<Self, TelemetryError> {
        self.frame_type = frame_type;
        self.validate()?;
        Ok(self)
    }

    pub fn expected_len(&self) -> usize {
        usize::from(self.width) * usize::from(self.height) * usize::from(self.channels)
    }

    pub fn validate(&self) -> Result<(), TelemetryError> {
        if !self.frame_type.accepts_channels(self.channels) {
            return Err(TelemetryError::ChannelCount {
                frame_type: self.frame_type,
                channels: self.channels,
            });
        }
        let expected = self.expected_len();
        if self.pixels.len() != expected {
            return Err(TelemetryError::PixelBufferSize {
                width: self.width,
                height: self.height,
                channels: self.channels,
                expected,
                actual: self.pixels.len(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn test_rgb_frame_accepted() {
        let frame = VideoFrame::new(Utc::now(), 4, 2, 3, Pose::default(), vec![0; 24]).unwrap();
        assert_eq!(frame.expected_len(), 24);
        assert_eq!(frame.frame_type, FrameType::Video);
    }

    #[test]
    fn test_pixel_buffer_mismatch_rejected() {
        let err = VideoFrame::new(Utc::now(), 4, 2, 4, Pose::default(), vec![0; 24]).unwrap_err();
        assert_eq!(
            err,
            TelemetryError::PixelBufferSize {
                width: 4,
                height: 2,
                channels: 4,
                expected: 32,
                actual: 24,
            }
        );
    }

    #[test]
    fn test_channel_count_checked_against_frame_type() {
        let frame = VideoFrame::new(Utc::now(), 2, 2, 3, Pose::default(), vec![0; 12]).unwrap();
        assert!(matches!(
            frame.with_frame_type(FrameType::Luminance),
            Err(TelemetryError::ChannelCount { channels: 3, .. })
        ));
    }
}
