//! Rig-wide settings and the per-camera layout table.

use machine_vision_formats::PixFmt;
use serde::{Deserialize, Serialize};

use weft_cam::TriggerSource;

/// Default manual exposure time, in microseconds.
pub const DEFAULT_MANUAL_EXPOSURE_US: f64 = 17_000.0;

/// Sensor region one camera should capture, in pixels.
///
/// Offsets are bounded by the active width and height, so they can only be
/// applied after the size is in effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CameraGeometry {
    pub width: u32,
    pub height: u32,
    pub offset_x: u32,
    pub offset_y: u32,
}

/// Capture regions for every camera position in the rig, in discovery order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RigLayout {
    pub cameras: Vec<CameraGeometry>,
}

impl RigLayout {
    /// Geometry for the camera at `index`, if the layout covers it.
    pub fn geometry(&self, index: usize) -> Option<CameraGeometry> {
        self.cameras.get(index).copied()
    }
}

impl Default for RigLayout {
    fn default() -> Self {
        // Four camera positions sharing the sensor height, each with its
        // own crop window.
        RigLayout {
            cameras: vec![
                CameraGeometry {
                    width: 800,
                    height: 1280,
                    offset_x: 500,
                    offset_y: 500,
                },
                CameraGeometry {
                    width: 800,
                    height: 1280,
                    offset_x: 500,
                    offset_y: 300,
                },
                CameraGeometry {
                    width: 736,
                    height: 1280,
                    offset_x: 750,
                    offset_y: 500,
                },
                CameraGeometry {
                    width: 736,
                    height: 1280,
                    offset_x: 800,
                    offset_y: 300,
                },
            ],
        }
    }
}

/// Exposure policy applied during camera configuration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ExposureConfig {
    /// Leave automatic exposure running.
    Auto,
    /// Disable automatic exposure and program a fixed time in microseconds.
    Manual { time_us: f64 },
}

/// Settings shared by every camera in the rig.
#[derive(Debug, Clone, PartialEq)]
pub struct RigSettings {
    pub trigger_source: TriggerSource,
    /// Software frame rate limit, applied while triggering is off.
    pub frame_rate: f64,
    /// Driver buffer slots per camera.
    pub buffer_count: i64,
    pub pixel_format: PixFmt,
    pub exposure: ExposureConfig,
}

impl Default for RigSettings {
    fn default() -> Self {
        RigSettings {
            trigger_source: TriggerSource::Line0,
            frame_rate: 30.0,
            buffer_count: 3,
            pixel_format: PixFmt::RGB8,
            exposure: ExposureConfig::Auto,
        }
    }
}
