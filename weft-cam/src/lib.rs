use machine_vision_formats as formats;
pub use weft_cam_types::{
    AcquisitionMode, AutoMode, BufferHandlingMode, FrameStatus, TriggerMode, TriggerSelector,
    TriggerSource,
};
pub use weft_frame::{BufferSlot, RawFrame};

// ---------------------------
// errors

pub type Result<M> = std::result::Result<M, Error>;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// A single frame was lost; the next acquisition can proceed.
    #[error("IncompleteFrame({0})")]
    IncompleteFrame(String),
    /// The driver-side wait for a frame expired without one arriving.
    #[error("Timeout")]
    Timeout,
    /// The device vanished or stopped responding. Fatal for this device.
    #[error("device unavailable: {0}")]
    DeviceUnavailable(String),
    /// Enumeration found no attached camera.
    #[error("no device found")]
    NoDeviceFound,
    #[error("feature not present: {0}")]
    FeatureNotPresent(String),
    #[error("feature not writable: {0}")]
    FeatureNotWritable(String),
    #[error("WeftError({msg})")]
    WeftError { msg: String },
    #[error("BackendError({0})")]
    BackendError(#[from] anyhow::Error),
    #[error("io error: {source}")]
    IoError {
        #[from]
        source: std::io::Error,
    },
    #[error("try from int error: {source}")]
    TryFromIntError {
        #[from]
        source: std::num::TryFromIntError,
    },
}

fn _test_error_is_send() {
    // Compile-time test to ensure Error implements Send trait.
    fn implements<T: Send>() {}
    implements::<Error>();
}

impl<'a> From<&'a str> for Error {
    fn from(orig: &'a str) -> Error {
        Error::WeftError {
            msg: orig.to_string(),
        }
    }
}

impl From<String> for Error {
    fn from(msg: String) -> Error {
        Error::WeftError { msg }
    }
}

impl Error {
    /// True when the error spoils at most one frame and the capture loop
    /// should simply try again.
    pub fn is_single_frame(&self) -> bool {
        matches!(self, Error::IncompleteFrame(_) | Error::Timeout)
    }
}

// ---------------------------
// feature access

/// Access state of one device feature.
///
/// Every mutation of a feature should be preceded by this query; a feature
/// that is absent or read-only is a degraded capability, not a hard error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ControlState {
    pub is_present: bool,
    pub is_readable: bool,
    pub is_writable: bool,
}

impl ControlState {
    pub fn read_write() -> Self {
        ControlState {
            is_present: true,
            is_readable: true,
            is_writable: true,
        }
    }
    pub fn read_only() -> Self {
        ControlState {
            is_present: true,
            is_readable: true,
            is_writable: false,
        }
    }
}

/// Limits of an integer feature.
///
/// Devices report `max` or `increment` of zero for controls that exist but
/// cannot currently be programmed; callers treat that as "not configurable"
/// rather than as an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IntParameter {
    pub min: i64,
    pub max: i64,
    pub increment: i64,
}

impl IntParameter {
    pub fn is_configurable(&self) -> bool {
        self.max != 0 && self.increment != 0
    }
}

// ---------------------------
// CameraModule

/// A module for opening cameras (e.g. one vendor SDK).
pub trait CameraModule: Send {
    type CameraType: Camera;

    fn name(&self) -> &str;
    fn camera_infos(&self) -> Result<Vec<Box<dyn CameraInfo>>>;
    fn camera(&mut self, name: &str) -> Result<Self::CameraType>;
}

/// List attached cameras, failing if there are none.
///
/// An empty device list is reported as [`Error::NoDeviceFound`] so the
/// caller can retry or run with a reduced rig; nothing here is fatal.
pub fn discover<M: CameraModule>(module: &M) -> Result<Vec<Box<dyn CameraInfo>>> {
    let infos = module.camera_infos()?;
    if infos.is_empty() {
        return Err(Error::NoDeviceFound);
    }
    Ok(infos)
}

// ---------------------------
// CameraInfo

pub trait CameraInfo {
    fn name(&self) -> &str;
    fn serial(&self) -> &str;
    fn model(&self) -> &str;
    fn vendor(&self) -> &str;
}

// ---------------------------
// Camera

pub trait Camera: CameraInfo + Send {
    // ----- start: weakly typed but easier to implement API -----

    fn command_execute(&self, name: &str, verify: bool) -> Result<()>;
    fn feature_bool(&self, name: &str) -> Result<bool>;
    fn feature_bool_set(&self, name: &str, value: bool) -> Result<()>;
    fn feature_enum(&self, name: &str) -> Result<String>;
    fn feature_enum_set(&self, name: &str, value: &str) -> Result<()>;
    fn feature_float(&self, name: &str) -> Result<f64>;
    fn feature_float_set(&self, name: &str, value: f64) -> Result<()>;
    fn feature_int(&self, name: &str) -> Result<i64>;
    fn feature_int_set(&self, name: &str, value: i64) -> Result<()>;

    /// Report whether a feature exists and whether it can be read/written
    /// right now.
    fn control_state(&self, name: &str) -> Result<ControlState>;
    /// Report min/max/increment of an integer feature.
    fn feature_int_limits(&self, name: &str) -> Result<IntParameter>;

    // ----- end: weakly typed but easier to implement API -----

    // Settings: Geometry ----------------------------
    /// Return the configured image width in pixels
    fn width(&self) -> Result<u32>;
    /// Return the configured image height in pixels
    fn height(&self) -> Result<u32>;
    fn set_width(&mut self, _: u32) -> Result<()>;
    fn set_height(&mut self, _: u32) -> Result<()>;
    fn offset_x(&self) -> Result<u32>;
    fn offset_y(&self) -> Result<u32>;
    fn set_offset_x(&mut self, _: u32) -> Result<()>;
    fn set_offset_y(&mut self, _: u32) -> Result<()>;

    // Settings: PixFmt ----------------------------
    fn pixel_format(&self) -> Result<formats::PixFmt>;
    fn possible_pixel_formats(&self) -> Result<Vec<formats::PixFmt>>;
    fn set_pixel_format(&mut self, pixel_format: formats::PixFmt) -> Result<()>;

    // Settings: Exposure Time ----------------------------
    /// value given in microseconds
    fn exposure_time(&self) -> Result<f64>;
    /// value given in microseconds
    fn exposure_time_range(&self) -> Result<(f64, f64)>;
    /// value given in microseconds
    fn set_exposure_time(&mut self, _: f64) -> Result<()>;

    // Settings: Exposure Time Auto Mode ----------------------------
    fn exposure_auto(&self) -> Result<AutoMode>;
    fn set_exposure_auto(&mut self, _: AutoMode) -> Result<()>;

    // Settings: TriggerMode ----------------------------
    fn trigger_mode(&self) -> Result<TriggerMode>;
    fn set_trigger_mode(&mut self, _: TriggerMode) -> Result<()>;

    // Settings: TriggerSelector ----------------------------
    fn trigger_selector(&self) -> Result<TriggerSelector>;
    fn set_trigger_selector(&mut self, _: TriggerSelector) -> Result<()>;

    // Settings: TriggerSource ----------------------------
    fn trigger_source(&self) -> Result<TriggerSource>;
    fn set_trigger_source(&mut self, _: TriggerSource) -> Result<()>;

    // Settings: AcquisitionFrameRateEnable ----------------------------
    fn acquisition_frame_rate_enable(&self) -> Result<bool>;
    fn set_acquisition_frame_rate_enable(&mut self, value: bool) -> Result<()>;

    // Settings: AcquisitionFrameRate ----------------------------
    fn acquisition_frame_rate(&self) -> Result<f64>;
    fn acquisition_frame_rate_range(&self) -> Result<(f64, f64)>;
    fn set_acquisition_frame_rate(&mut self, value: f64) -> Result<()>;

    // Settings: AcquisitionMode ----------------------------
    fn acquisition_mode(&self) -> Result<AcquisitionMode>;
    fn set_acquisition_mode(&mut self, _: AcquisitionMode) -> Result<()>;

    // Settings: Stream buffers ----------------------------
    fn stream_buffer_count(&self) -> Result<i64>;
    fn set_stream_buffer_count(&mut self, value: i64) -> Result<()>;
    fn stream_buffer_handling_mode(&self) -> Result<BufferHandlingMode>;
    fn set_stream_buffer_handling_mode(&mut self, _: BufferHandlingMode) -> Result<()>;

    // Set frame-start triggering ------------------------------
    /// Arm frame-start triggering from the given source.
    ///
    /// The trigger source may only be changed while the trigger is off, so
    /// the sequence is: mode off, selector, source, mode on. When this
    /// returns successfully the camera captures one frame per pulse.
    fn start_frame_triggering(&mut self, source: TriggerSource) -> Result<()> {
        // This is the generic default implementation which may be overriden
        // by implementors.

        self.set_trigger_mode(TriggerMode::Off)?;
        // The trigger selector must be set before the trigger mode.
        self.set_trigger_selector(TriggerSelector::FrameStart)?;
        self.set_trigger_source(source)?;
        self.set_trigger_mode(TriggerMode::On)
    }

    fn set_software_frame_rate_limit(&mut self, fps_limit: f64) -> Result<()> {
        // This is the generic default implementation which may be overriden
        // by implementors.
        self.set_acquisition_frame_rate_enable(true)?;
        self.set_acquisition_frame_rate(fps_limit)
    }

    // Acquisition ----------------------------
    fn acquisition_start(&mut self) -> Result<()>;
    fn acquisition_stop(&mut self) -> Result<()>;

    /// Synchronous (blocking) frame acquisition.
    ///
    /// Blocks until the driver yields a frame or its wait expires
    /// ([`Error::Timeout`], retriable). The returned container still owns a
    /// driver buffer slot; hand it back with [`Camera::release_frame`] as
    /// soon as the data has been copied out.
    fn next_frame(&mut self) -> Result<RawFrame>;

    /// Return a driver buffer slot for refilling.
    ///
    /// Slots are finite; a slot that is never released is a capture stall
    /// waiting to happen.
    fn release_frame(&mut self, slot: BufferSlot) -> Result<()>;
}
