//! Control vocabulary shared by every layer of the weft camera stack.
//!
//! These enums mirror the GenICam feature values they are written to, so
//! backend code can map them to device enum strings without translation
//! tables.

use serde::{Deserialize, Serialize};

/// Automatic control mode for camera features.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum AutoMode {
    /// Automatic control is disabled.
    Off,
    /// Automatic control runs once then stops.
    Once,
    /// Automatic control runs continuously.
    #[default]
    Continuous,
}

// use Debug to impl Display
impl std::fmt::Display for AutoMode {
    fn fmt(&self, fmt: &mut std::fmt::Formatter) -> std::result::Result<(), std::fmt::Error> {
        std::fmt::Debug::fmt(self, fmt)
    }
}

/// Camera trigger enable state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TriggerMode {
    /// Triggering is disabled.
    Off,
    /// Triggering is enabled.
    On,
}

/// Camera trigger type selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[non_exhaustive]
pub enum TriggerSelector {
    /// Trigger for starting image acquisition.
    AcquisitionStart,
    /// Trigger for starting frame capture.
    FrameStart,
    /// Trigger for starting a burst of frames.
    FrameBurstStart,
    /// Trigger for exposure timing.
    ExposureActive,
}

/// Where trigger pulses come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum TriggerSource {
    /// Pulses are issued by executing the `TriggerSoftware` command.
    Software,
    /// Pulses arrive on the `Line0` hardware input. This is the line that
    /// synchronizes all cameras of a rig.
    #[default]
    Line0,
}

/// Camera acquisition mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AcquisitionMode {
    /// Continuous frame acquisition.
    Continuous,
    /// Single frame acquisition.
    SingleFrame,
    /// Multiple frame acquisition.
    MultiFrame,
}

/// Stream buffer handling policy of the driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[non_exhaustive]
pub enum BufferHandlingMode {
    /// Deliver frames in arrival order; new frames are discarded when all
    /// buffers are full.
    OldestFirst,
    /// Deliver frames in arrival order, overwriting the oldest queued frame
    /// when all buffers are full.
    OldestFirstOverwrite,
    /// Keep only the most recent frames; the oldest queued frame is
    /// discarded when a new one arrives and all buffers are full.
    NewestOnly,
    /// Deliver the most recent frame first.
    NewestFirst,
}

/// Completion status the driver reports with a delivered frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FrameStatus {
    /// The frame transferred fully.
    Complete,
    /// The device marked the frame as not fully transferred. Such frames
    /// must be discarded, never converted or published.
    Incomplete(String),
}

impl FrameStatus {
    pub fn is_complete(&self) -> bool {
        matches!(self, FrameStatus::Complete)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auto_mode_display_matches_feature_string() {
        assert_eq!(format!("{}", AutoMode::Continuous), "Continuous");
        assert_eq!(format!("{}", AutoMode::Off), "Off");
    }

    #[test]
    fn defaults() {
        assert_eq!(AutoMode::default(), AutoMode::Continuous);
        assert_eq!(TriggerSource::default(), TriggerSource::Line0);
    }

    #[test]
    fn vocabulary_roundtrips_through_json() {
        let source = TriggerSource::Line0;
        let buf = serde_json::to_string(&source).unwrap();
        let source2: TriggerSource = serde_json::from_str(&buf).unwrap();
        assert_eq!(source, source2);

        let status = FrameStatus::Incomplete("image transfer stopped".to_string());
        let buf = serde_json::to_string(&status).unwrap();
        let status2: FrameStatus = serde_json::from_str(&buf).unwrap();
        assert_eq!(status, status2);
    }
}
