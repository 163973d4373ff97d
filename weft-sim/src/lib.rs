//! In-memory camera backend with scripted frame delivery.
//!
//! Each simulated device carries a GenICam-style feature table, a bounded
//! pool of driver buffer slots and a script of grab outcomes. Frames arrive
//! on trigger pulses (or on demand when triggering is off), so buffer-pool
//! and trigger behavior are deterministic under test.

use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

use machine_vision_formats as formats;
use parking_lot::{Condvar, Mutex};
use tracing::debug;

use weft_cam::{
    AcquisitionMode, AutoMode, BufferHandlingMode, BufferSlot, Camera, CameraInfo, CameraModule,
    ControlState, FrameStatus, IntParameter, RawFrame, TriggerMode, TriggerSelector, TriggerSource,
};

/// How long a frame wait may block before returning [`weft_cam::Error::Timeout`].
pub const GRAB_TIMEOUT: Duration = Duration::from_millis(50);

const DEFAULT_SLOT_COUNT: i64 = 10;
const FRAME_INTERVAL_NS: u64 = 33_333_333;

const SIM_MODEL: &str = "SimCam";
const SIM_VENDOR: &str = "Weft Simulation";

/// One scripted acquisition result.
#[derive(Debug, Clone)]
pub enum GrabOutcome {
    /// A complete frame whose bytes are all `fill`.
    Frame { fill: u8 },
    /// A transfer that ended early.
    Incomplete { reason: String },
    /// The device disappears. Every later call on it fails.
    Unplug,
}

/// One recorded feature mutation.
#[derive(Debug, Clone, PartialEq)]
pub enum FeatureWrite {
    Bool { name: String, value: bool },
    Enum { name: String, value: String },
    Float { name: String, value: f64 },
    Int { name: String, value: i64 },
    Command { name: String },
}

impl FeatureWrite {
    /// Feature name the write targeted.
    pub fn name(&self) -> &str {
        match self {
            FeatureWrite::Bool { name, .. }
            | FeatureWrite::Enum { name, .. }
            | FeatureWrite::Float { name, .. }
            | FeatureWrite::Int { name, .. }
            | FeatureWrite::Command { name } => name,
        }
    }
}

#[derive(Debug, Clone)]
enum FeatureValue {
    Bool(bool),
    Enum(String),
    Float(f64),
    Int(i64),
    Command,
}

#[derive(Debug, Clone)]
struct Feature {
    value: FeatureValue,
    state: ControlState,
    int_limits: Option<IntParameter>,
    float_range: Option<(f64, f64)>,
    enum_entries: Option<Vec<String>>,
}

impl Feature {
    fn boolean(value: bool) -> Self {
        Feature {
            value: FeatureValue::Bool(value),
            state: ControlState::read_write(),
            int_limits: None,
            float_range: None,
            enum_entries: None,
        }
    }
    fn enumerated(value: &str, entries: &[&str]) -> Self {
        Feature {
            value: FeatureValue::Enum(value.to_string()),
            state: ControlState::read_write(),
            int_limits: None,
            float_range: None,
            enum_entries: Some(entries.iter().map(|entry| entry.to_string()).collect()),
        }
    }
    fn float(value: f64, range: (f64, f64)) -> Self {
        Feature {
            value: FeatureValue::Float(value),
            state: ControlState::read_write(),
            int_limits: None,
            float_range: Some(range),
            enum_entries: None,
        }
    }
    fn int(value: i64, limits: IntParameter) -> Self {
        Feature {
            value: FeatureValue::Int(value),
            state: ControlState::read_write(),
            int_limits: Some(limits),
            float_range: None,
            enum_entries: None,
        }
    }
    fn command() -> Self {
        Feature {
            value: FeatureValue::Command,
            state: ControlState {
                is_present: true,
                is_readable: false,
                is_writable: true,
            },
            int_limits: None,
            float_range: None,
            enum_entries: None,
        }
    }
}

/// Blueprint for one simulated device.
///
/// [`SimDeviceSpec::new`] seeds the feature table every real camera in this
/// stack is expected to carry; builder methods override or remove entries
/// and queue up grab outcomes.
pub struct SimDeviceSpec {
    serial: String,
    features: BTreeMap<String, Feature>,
    script: VecDeque<GrabOutcome>,
    x_padding: u32,
    y_padding: u32,
}

impl SimDeviceSpec {
    pub fn new(serial: &str) -> Self {
        SimDeviceSpec {
            serial: serial.to_string(),
            features: default_features(),
            script: VecDeque::new(),
            x_padding: 0,
            y_padding: 0,
        }
    }

    pub fn int_feature(mut self, name: &str, value: i64, limits: IntParameter) -> Self {
        self.features.insert(name.to_string(), Feature::int(value, limits));
        self
    }

    pub fn float_feature(mut self, name: &str, value: f64, range: (f64, f64)) -> Self {
        self.features.insert(name.to_string(), Feature::float(value, range));
        self
    }

    pub fn enum_feature(mut self, name: &str, value: &str, entries: &[&str]) -> Self {
        self.features
            .insert(name.to_string(), Feature::enumerated(value, entries));
        self
    }

    pub fn bool_feature(mut self, name: &str, value: bool) -> Self {
        self.features.insert(name.to_string(), Feature::boolean(value));
        self
    }

    /// Keep the feature readable but reject writes to it.
    pub fn feature_read_only(mut self, name: &str) -> Self {
        if let Some(feature) = self.features.get_mut(name) {
            feature.state = ControlState::read_only();
        }
        self
    }

    pub fn without_feature(mut self, name: &str) -> Self {
        self.features.remove(name);
        self
    }

    /// Padding the transport adds to each delivered image.
    pub fn padding(mut self, x_padding: u32, y_padding: u32) -> Self {
        self.x_padding = x_padding;
        self.y_padding = y_padding;
        self
    }

    /// Append grab outcomes to the delivery script.
    pub fn script(mut self, outcomes: Vec<GrabOutcome>) -> Self {
        self.script.extend(outcomes);
        self
    }

    fn into_state(self) -> SimState {
        SimState {
            serial: self.serial,
            features: self.features,
            journal: Vec::new(),
            script: self.script,
            filled: VecDeque::new(),
            free_slots: Vec::new(),
            slot_count: 0,
            streaming: false,
            unplugged: false,
            x_padding: self.x_padding,
            y_padding: self.y_padding,
            block_id: 0,
            device_clock_ns: 0,
        }
    }
}

fn default_features() -> BTreeMap<String, Feature> {
    let mut features = BTreeMap::new();
    features.insert(
        "AcquisitionMode".to_string(),
        Feature::enumerated("Continuous", &["Continuous", "SingleFrame", "MultiFrame"]),
    );
    features.insert(
        "PixelFormat".to_string(),
        Feature::enumerated("Mono8", &["Mono8", "RGB8", "BayerRG8"]),
    );
    features.insert(
        "StreamBufferCountMode".to_string(),
        Feature::enumerated("Auto", &["Auto", "Manual"]),
    );
    features.insert(
        "StreamBufferCountManual".to_string(),
        Feature::int(
            DEFAULT_SLOT_COUNT,
            IntParameter {
                min: 1,
                max: 256,
                increment: 1,
            },
        ),
    );
    features.insert(
        "StreamBufferHandlingMode".to_string(),
        Feature::enumerated(
            "OldestFirst",
            &["OldestFirst", "OldestFirstOverwrite", "NewestOnly", "NewestFirst"],
        ),
    );
    features.insert(
        "AcquisitionFrameRateEnable".to_string(),
        Feature::boolean(false),
    );
    features.insert(
        "AcquisitionFrameRate".to_string(),
        Feature::float(30.0, (1.0, 170.0)),
    );
    features.insert(
        "Width".to_string(),
        Feature::int(
            2048,
            IntParameter {
                min: 32,
                max: 2048,
                increment: 4,
            },
        ),
    );
    features.insert(
        "Height".to_string(),
        Feature::int(
            1536,
            IntParameter {
                min: 2,
                max: 1536,
                increment: 2,
            },
        ),
    );
    features.insert(
        "OffsetX".to_string(),
        Feature::int(
            0,
            IntParameter {
                min: 0,
                max: 2016,
                increment: 2,
            },
        ),
    );
    features.insert(
        "OffsetY".to_string(),
        Feature::int(
            0,
            IntParameter {
                min: 0,
                max: 1534,
                increment: 2,
            },
        ),
    );
    features.insert(
        "ExposureAuto".to_string(),
        Feature::enumerated("Continuous", &["Off", "Once", "Continuous"]),
    );
    features.insert(
        "ExposureTime".to_string(),
        Feature::float(10000.0, (8.0, 999_999.0)),
    );
    features.insert(
        "TriggerMode".to_string(),
        Feature::enumerated("Off", &["Off", "On"]),
    );
    features.insert(
        "TriggerSelector".to_string(),
        Feature::enumerated(
            "FrameStart",
            &["AcquisitionStart", "FrameStart", "FrameBurstStart", "ExposureActive"],
        ),
    );
    features.insert(
        "TriggerSource".to_string(),
        Feature::enumerated("Software", &["Software", "Line0"]),
    );
    features.insert("TriggerSoftware".to_string(), Feature::command());
    features
}

struct SimState {
    serial: String,
    features: BTreeMap<String, Feature>,
    journal: Vec<FeatureWrite>,
    script: VecDeque<GrabOutcome>,
    filled: VecDeque<RawFrame>,
    free_slots: Vec<u32>,
    slot_count: u32,
    streaming: bool,
    unplugged: bool,
    x_padding: u32,
    y_padding: u32,
    block_id: u64,
    device_clock_ns: u64,
}

impl SimState {
    fn feature(&self, name: &str) -> weft_cam::Result<&Feature> {
        self.features
            .get(name)
            .ok_or_else(|| weft_cam::Error::FeatureNotPresent(name.to_string()))
    }

    fn readable(&self, name: &str) -> weft_cam::Result<&Feature> {
        let feature = self.feature(name)?;
        if !feature.state.is_readable {
            return Err(format!("feature {name} is not readable").into());
        }
        Ok(feature)
    }

    fn writable(&mut self, name: &str) -> weft_cam::Result<&mut Feature> {
        let feature = self
            .features
            .get_mut(name)
            .ok_or_else(|| weft_cam::Error::FeatureNotPresent(name.to_string()))?;
        if !feature.state.is_writable {
            return Err(weft_cam::Error::FeatureNotWritable(name.to_string()));
        }
        Ok(feature)
    }

    fn read_bool(&self, name: &str) -> weft_cam::Result<bool> {
        match self.readable(name)?.value {
            FeatureValue::Bool(value) => Ok(value),
            _ => Err(format!("feature {name} is not a bool").into()),
        }
    }

    fn read_enum(&self, name: &str) -> weft_cam::Result<String> {
        match &self.readable(name)?.value {
            FeatureValue::Enum(value) => Ok(value.clone()),
            _ => Err(format!("feature {name} is not an enum").into()),
        }
    }

    fn read_float(&self, name: &str) -> weft_cam::Result<f64> {
        match self.readable(name)?.value {
            FeatureValue::Float(value) => Ok(value),
            _ => Err(format!("feature {name} is not a float").into()),
        }
    }

    fn read_int(&self, name: &str) -> weft_cam::Result<i64> {
        match self.readable(name)?.value {
            FeatureValue::Int(value) => Ok(value),
            _ => Err(format!("feature {name} is not an integer").into()),
        }
    }

    fn write_bool(&mut self, name: &str, value: bool) -> weft_cam::Result<()> {
        let feature = self.writable(name)?;
        match feature.value {
            FeatureValue::Bool(_) => feature.value = FeatureValue::Bool(value),
            _ => return Err(format!("feature {name} is not a bool").into()),
        }
        self.journal.push(FeatureWrite::Bool {
            name: name.to_string(),
            value,
        });
        Ok(())
    }

    fn write_enum(&mut self, name: &str, value: &str) -> weft_cam::Result<()> {
        let feature = self.writable(name)?;
        match &feature.value {
            FeatureValue::Enum(_) => {}
            _ => return Err(format!("feature {name} is not an enum").into()),
        }
        if let Some(entries) = &feature.enum_entries {
            if !entries.iter().any(|entry| entry == value) {
                return Err(format!("invalid entry {value} for enum feature {name}").into());
            }
        }
        feature.value = FeatureValue::Enum(value.to_string());
        self.journal.push(FeatureWrite::Enum {
            name: name.to_string(),
            value: value.to_string(),
        });
        Ok(())
    }

    fn write_float(&mut self, name: &str, value: f64) -> weft_cam::Result<()> {
        let feature = self.writable(name)?;
        match feature.value {
            FeatureValue::Float(_) => {}
            _ => return Err(format!("feature {name} is not a float").into()),
        }
        if let Some((min, max)) = feature.float_range {
            if value < min || value > max {
                return Err(format!(
                    "value {value} out of range [{min}, {max}] for feature {name}"
                )
                .into());
            }
        }
        feature.value = FeatureValue::Float(value);
        self.journal.push(FeatureWrite::Float {
            name: name.to_string(),
            value,
        });
        Ok(())
    }

    fn write_int(&mut self, name: &str, value: i64) -> weft_cam::Result<()> {
        let feature = self.writable(name)?;
        match feature.value {
            FeatureValue::Int(_) => {}
            _ => return Err(format!("feature {name} is not an integer").into()),
        }
        if let Some(limits) = feature.int_limits {
            if value < limits.min || value > limits.max {
                return Err(format!(
                    "value {value} out of range [{}, {}] for feature {name}",
                    limits.min, limits.max
                )
                .into());
            }
            if limits.increment != 0 && (value - limits.min) % limits.increment != 0 {
                return Err(format!(
                    "value {value} does not land on increment {} for feature {name}",
                    limits.increment
                )
                .into());
            }
        }
        feature.value = FeatureValue::Int(value);
        self.journal.push(FeatureWrite::Int {
            name: name.to_string(),
            value,
        });
        Ok(())
    }

    fn execute(&mut self, name: &str) -> weft_cam::Result<()> {
        let feature = self.writable(name)?;
        match feature.value {
            FeatureValue::Command => {}
            _ => return Err(format!("feature {name} is not a command").into()),
        }
        self.journal.push(FeatureWrite::Command {
            name: name.to_string(),
        });
        if name == "TriggerSoftware" && self.streaming && self.trigger_armed("Software") {
            self.arrival();
        }
        Ok(())
    }

    fn int_value(&self, name: &str) -> Option<i64> {
        match self.features.get(name)?.value {
            FeatureValue::Int(value) => Some(value),
            _ => None,
        }
    }

    fn enum_is(&self, name: &str, expected: &str) -> bool {
        matches!(
            self.features.get(name),
            Some(Feature {
                value: FeatureValue::Enum(value),
                ..
            }) if value == expected
        )
    }

    fn trigger_armed(&self, source: &str) -> bool {
        self.enum_is("TriggerMode", "On")
            && self.enum_is("TriggerSelector", "FrameStart")
            && self.enum_is("TriggerSource", source)
    }

    fn free_running(&self) -> bool {
        self.enum_is("TriggerMode", "Off")
    }

    fn hardware_pulse(&mut self) {
        if self.unplugged || !self.streaming {
            return;
        }
        if !self.trigger_armed("Line0") {
            return;
        }
        self.arrival();
    }

    fn arrival(&mut self) {
        let outcome = match self.script.pop_front() {
            Some(outcome) => outcome,
            None => return,
        };
        match outcome {
            GrabOutcome::Unplug => {
                debug!("sim camera {}: unplugged", self.serial);
                self.unplugged = true;
            }
            GrabOutcome::Frame { fill } => self.materialize(fill, FrameStatus::Complete),
            GrabOutcome::Incomplete { reason } => {
                self.materialize(0, FrameStatus::Incomplete(reason))
            }
        }
    }

    fn materialize(&mut self, fill: u8, status: FrameStatus) {
        let slot = match self.free_slots.pop() {
            Some(slot) => slot,
            None => {
                if self.enum_is("StreamBufferHandlingMode", "NewestOnly") {
                    match self.filled.pop_front() {
                        Some(oldest) => {
                            debug!(
                                "sim camera {}: reusing slot of oldest filled buffer (block_id {})",
                                self.serial, oldest.block_id
                            );
                            oldest.slot.0
                        }
                        None => {
                            debug!("sim camera {}: no buffer slots at all, frame lost", self.serial);
                            return;
                        }
                    }
                } else {
                    debug!(
                        "sim camera {}: no free buffer slot, arriving frame lost",
                        self.serial
                    );
                    return;
                }
            }
        };

        let width = u32::try_from(self.int_value("Width").unwrap_or(0)).unwrap_or(0);
        let height = u32::try_from(self.int_value("Height").unwrap_or(0)).unwrap_or(0);
        let pixel_format = match &self.features.get("PixelFormat").map(|f| &f.value) {
            Some(FeatureValue::Enum(value)) => {
                str_to_pixel_format(value).unwrap_or(formats::PixFmt::Mono8)
            }
            _ => formats::PixFmt::Mono8,
        };
        let channels = u32::from(pixel_format.bits_per_pixel()) / 8;
        let stride = (width + self.x_padding) * channels;
        let rows = height + self.y_padding;
        let image_data = vec![fill; stride as usize * rows as usize];

        self.block_id += 1;
        self.device_clock_ns += FRAME_INTERVAL_NS;
        self.filled.push_back(RawFrame {
            width,
            height,
            x_padding: self.x_padding,
            y_padding: self.y_padding,
            stride,
            channels,
            pixel_format,
            status,
            block_id: self.block_id,
            device_timestamp: self.device_clock_ns,
            slot: BufferSlot(slot),
            image_data,
        });
    }
}

struct SimShared {
    state: Mutex<SimState>,
    cond: Condvar,
}

struct ModuleEntry {
    serial: String,
    shared: Arc<SimShared>,
    opened: bool,
}

/// Backend module holding all simulated devices.
pub struct SimModule {
    entries: Vec<ModuleEntry>,
}

pub fn new_module(specs: Vec<SimDeviceSpec>) -> weft_cam::Result<SimModule> {
    let mut entries: Vec<ModuleEntry> = Vec::with_capacity(specs.len());
    for spec in specs {
        if entries.iter().any(|entry| entry.serial == spec.serial) {
            return Err(format!("duplicate camera serial {}", spec.serial).into());
        }
        let serial = spec.serial.clone();
        let shared = Arc::new(SimShared {
            state: Mutex::new(spec.into_state()),
            cond: Condvar::new(),
        });
        entries.push(ModuleEntry {
            serial,
            shared,
            opened: false,
        });
    }
    Ok(SimModule { entries })
}

impl SimModule {
    /// Handle for asserting the order of feature writes on one device.
    pub fn write_journal(&self, serial: &str) -> Option<WriteJournal> {
        self.shared_for(serial).map(|shared| WriteJournal { shared })
    }

    /// Handle for delivering hardware trigger pulses to one device.
    pub fn trigger(&self, serial: &str) -> Option<SimTrigger> {
        self.shared_for(serial).map(|shared| SimTrigger { shared })
    }

    fn shared_for(&self, serial: &str) -> Option<Arc<SimShared>> {
        self.entries
            .iter()
            .find(|entry| entry.serial == serial)
            .map(|entry| entry.shared.clone())
    }
}

impl CameraModule for SimModule {
    type CameraType = SimCamera;

    fn name(&self) -> &str {
        "sim"
    }

    fn camera_infos(&self) -> weft_cam::Result<Vec<Box<dyn CameraInfo>>> {
        Ok(self
            .entries
            .iter()
            .map(|entry| {
                let info: Box<dyn CameraInfo> = Box::new(SimCameraInfo {
                    serial: entry.serial.clone(),
                });
                info
            })
            .collect())
    }

    fn camera(&mut self, name: &str) -> weft_cam::Result<SimCamera> {
        let entry = self
            .entries
            .iter_mut()
            .find(|entry| entry.serial == name)
            .ok_or_else(|| weft_cam::Error::from(format!("no such camera: {name}")))?;
        if entry.opened {
            return Err(format!("camera {name} already open").into());
        }
        entry.opened = true;
        Ok(SimCamera {
            serial: entry.serial.clone(),
            shared: entry.shared.clone(),
        })
    }
}

/// Description of one simulated camera as returned by enumeration.
#[derive(Debug, Clone)]
pub struct SimCameraInfo {
    serial: String,
}

impl CameraInfo for SimCameraInfo {
    fn name(&self) -> &str {
        &self.serial
    }
    fn serial(&self) -> &str {
        &self.serial
    }
    fn model(&self) -> &str {
        SIM_MODEL
    }
    fn vendor(&self) -> &str {
        SIM_VENDOR
    }
}

/// Injects hardware trigger pulses into one simulated device.
#[derive(Clone)]
pub struct SimTrigger {
    shared: Arc<SimShared>,
}

impl SimTrigger {
    /// Deliver `count` pulses on the hardware line.
    ///
    /// A pulse is ignored unless the device is streaming with frame-start
    /// triggering armed on the hardware source.
    pub fn pulse(&self, count: usize) {
        {
            let mut state = self.shared.state.lock();
            for _ in 0..count {
                state.hardware_pulse();
            }
        }
        self.shared.cond.notify_all();
    }
}

/// Read access to the recorded feature writes of one simulated device.
#[derive(Clone)]
pub struct WriteJournal {
    shared: Arc<SimShared>,
}

impl WriteJournal {
    pub fn snapshot(&self) -> Vec<FeatureWrite> {
        self.shared.state.lock().journal.clone()
    }

    pub fn clear(&self) {
        self.shared.state.lock().journal.clear();
    }
}

pub struct SimCamera {
    serial: String,
    shared: Arc<SimShared>,
}

impl SimCamera {
    fn with_state<T, F>(&self, func: F) -> weft_cam::Result<T>
    where
        F: FnOnce(&mut SimState) -> weft_cam::Result<T>,
    {
        let mut state = self.shared.state.lock();
        if state.unplugged {
            return Err(weft_cam::Error::DeviceUnavailable(self.serial.clone()));
        }
        func(&mut state)
    }

    fn float_range(&self, name: &str) -> weft_cam::Result<(f64, f64)> {
        self.with_state(|state| {
            state
                .readable(name)?
                .float_range
                .ok_or_else(|| weft_cam::Error::from(format!("feature {name} has no float range")))
        })
    }
}

impl CameraInfo for SimCamera {
    fn name(&self) -> &str {
        &self.serial
    }
    fn serial(&self) -> &str {
        &self.serial
    }
    fn model(&self) -> &str {
        SIM_MODEL
    }
    fn vendor(&self) -> &str {
        SIM_VENDOR
    }
}

impl Camera for SimCamera {
    fn command_execute(&self, name: &str, _verify: bool) -> weft_cam::Result<()> {
        self.with_state(|state| state.execute(name))?;
        self.shared.cond.notify_all();
        Ok(())
    }

    fn feature_bool(&self, name: &str) -> weft_cam::Result<bool> {
        self.with_state(|state| state.read_bool(name))
    }

    fn feature_bool_set(&self, name: &str, value: bool) -> weft_cam::Result<()> {
        self.with_state(|state| state.write_bool(name, value))
    }

    fn feature_enum(&self, name: &str) -> weft_cam::Result<String> {
        self.with_state(|state| state.read_enum(name))
    }

    fn feature_enum_set(&self, name: &str, value: &str) -> weft_cam::Result<()> {
        self.with_state(|state| state.write_enum(name, value))
    }

    fn feature_float(&self, name: &str) -> weft_cam::Result<f64> {
        self.with_state(|state| state.read_float(name))
    }

    fn feature_float_set(&self, name: &str, value: f64) -> weft_cam::Result<()> {
        self.with_state(|state| state.write_float(name, value))
    }

    fn feature_int(&self, name: &str) -> weft_cam::Result<i64> {
        self.with_state(|state| state.read_int(name))
    }

    fn feature_int_set(&self, name: &str, value: i64) -> weft_cam::Result<()> {
        self.with_state(|state| state.write_int(name, value))
    }

    fn control_state(&self, name: &str) -> weft_cam::Result<ControlState> {
        self.with_state(|state| {
            Ok(state
                .features
                .get(name)
                .map(|feature| feature.state)
                .unwrap_or_default())
        })
    }

    fn feature_int_limits(&self, name: &str) -> weft_cam::Result<IntParameter> {
        self.with_state(|state| {
            state.feature(name)?.int_limits.ok_or_else(|| {
                weft_cam::Error::from(format!("feature {name} has no integer limits"))
            })
        })
    }

    fn width(&self) -> weft_cam::Result<u32> {
        Ok(self.feature_int("Width")?.try_into()?)
    }
    fn height(&self) -> weft_cam::Result<u32> {
        Ok(self.feature_int("Height")?.try_into()?)
    }
    fn set_width(&mut self, value: u32) -> weft_cam::Result<()> {
        self.feature_int_set("Width", value.into())
    }
    fn set_height(&mut self, value: u32) -> weft_cam::Result<()> {
        self.feature_int_set("Height", value.into())
    }
    fn offset_x(&self) -> weft_cam::Result<u32> {
        Ok(self.feature_int("OffsetX")?.try_into()?)
    }
    fn offset_y(&self) -> weft_cam::Result<u32> {
        Ok(self.feature_int("OffsetY")?.try_into()?)
    }
    fn set_offset_x(&mut self, value: u32) -> weft_cam::Result<()> {
        self.feature_int_set("OffsetX", value.into())
    }
    fn set_offset_y(&mut self, value: u32) -> weft_cam::Result<()> {
        self.feature_int_set("OffsetY", value.into())
    }

    fn pixel_format(&self) -> weft_cam::Result<formats::PixFmt> {
        str_to_pixel_format(&self.feature_enum("PixelFormat")?)
    }
    fn possible_pixel_formats(&self) -> weft_cam::Result<Vec<formats::PixFmt>> {
        self.with_state(|state| {
            let entries = state
                .readable("PixelFormat")?
                .enum_entries
                .clone()
                .unwrap_or_default();
            // Entries with no runtime pixel format equivalent are silently dropped.
            Ok(entries
                .iter()
                .filter_map(|entry| str_to_pixel_format(entry).ok())
                .collect())
        })
    }
    fn set_pixel_format(&mut self, pixel_format: formats::PixFmt) -> weft_cam::Result<()> {
        self.feature_enum_set("PixelFormat", pixel_format_to_str(pixel_format)?)
    }

    fn exposure_time(&self) -> weft_cam::Result<f64> {
        self.feature_float("ExposureTime")
    }
    fn exposure_time_range(&self) -> weft_cam::Result<(f64, f64)> {
        self.float_range("ExposureTime")
    }
    fn set_exposure_time(&mut self, value: f64) -> weft_cam::Result<()> {
        self.feature_float_set("ExposureTime", value)
    }

    fn exposure_auto(&self) -> weft_cam::Result<AutoMode> {
        str_to_auto_mode(&self.feature_enum("ExposureAuto")?)
    }
    fn set_exposure_auto(&mut self, value: AutoMode) -> weft_cam::Result<()> {
        self.feature_enum_set("ExposureAuto", auto_mode_to_str(value))
    }

    fn trigger_mode(&self) -> weft_cam::Result<TriggerMode> {
        let val = self.feature_enum("TriggerMode")?;
        match val.as_str() {
            "Off" => Ok(TriggerMode::Off),
            "On" => Ok(TriggerMode::On),
            s => Err(format!("unexpected TriggerMode enum string: {s}").into()),
        }
    }
    fn set_trigger_mode(&mut self, value: TriggerMode) -> weft_cam::Result<()> {
        let valstr = match value {
            TriggerMode::Off => "Off",
            TriggerMode::On => "On",
        };
        self.feature_enum_set("TriggerMode", valstr)
    }

    fn trigger_selector(&self) -> weft_cam::Result<TriggerSelector> {
        let val = self.feature_enum("TriggerSelector")?;
        match val.as_str() {
            "AcquisitionStart" => Ok(TriggerSelector::AcquisitionStart),
            "FrameStart" => Ok(TriggerSelector::FrameStart),
            "FrameBurstStart" => Ok(TriggerSelector::FrameBurstStart),
            "ExposureActive" => Ok(TriggerSelector::ExposureActive),
            s => Err(format!("unexpected TriggerSelector enum string: {s}").into()),
        }
    }
    fn set_trigger_selector(&mut self, value: TriggerSelector) -> weft_cam::Result<()> {
        let valstr = match value {
            TriggerSelector::AcquisitionStart => "AcquisitionStart",
            TriggerSelector::FrameStart => "FrameStart",
            TriggerSelector::FrameBurstStart => "FrameBurstStart",
            TriggerSelector::ExposureActive => "ExposureActive",
            _ => return Err(format!("unsupported TriggerSelector {value:?}").into()),
        };
        self.feature_enum_set("TriggerSelector", valstr)
    }

    fn trigger_source(&self) -> weft_cam::Result<TriggerSource> {
        let val = self.feature_enum("TriggerSource")?;
        match val.as_str() {
            "Software" => Ok(TriggerSource::Software),
            "Line0" => Ok(TriggerSource::Line0),
            s => Err(format!("unexpected TriggerSource enum string: {s}").into()),
        }
    }
    fn set_trigger_source(&mut self, value: TriggerSource) -> weft_cam::Result<()> {
        let valstr = match value {
            TriggerSource::Software => "Software",
            TriggerSource::Line0 => "Line0",
        };
        self.feature_enum_set("TriggerSource", valstr)
    }

    fn acquisition_frame_rate_enable(&self) -> weft_cam::Result<bool> {
        self.feature_bool("AcquisitionFrameRateEnable")
    }
    fn set_acquisition_frame_rate_enable(&mut self, value: bool) -> weft_cam::Result<()> {
        self.feature_bool_set("AcquisitionFrameRateEnable", value)
    }

    fn acquisition_frame_rate(&self) -> weft_cam::Result<f64> {
        self.feature_float("AcquisitionFrameRate")
    }
    fn acquisition_frame_rate_range(&self) -> weft_cam::Result<(f64, f64)> {
        self.float_range("AcquisitionFrameRate")
    }
    fn set_acquisition_frame_rate(&mut self, value: f64) -> weft_cam::Result<()> {
        self.feature_float_set("AcquisitionFrameRate", value)
    }

    fn acquisition_mode(&self) -> weft_cam::Result<AcquisitionMode> {
        str_to_acquisition_mode(&self.feature_enum("AcquisitionMode")?)
    }
    fn set_acquisition_mode(&mut self, value: AcquisitionMode) -> weft_cam::Result<()> {
        self.feature_enum_set("AcquisitionMode", acquisition_mode_to_str(value))
    }

    fn stream_buffer_count(&self) -> weft_cam::Result<i64> {
        self.feature_int("StreamBufferCountManual")
    }
    fn set_stream_buffer_count(&mut self, value: i64) -> weft_cam::Result<()> {
        self.feature_int_set("StreamBufferCountManual", value)
    }
    fn stream_buffer_handling_mode(&self) -> weft_cam::Result<BufferHandlingMode> {
        str_to_handling_mode(&self.feature_enum("StreamBufferHandlingMode")?)
    }
    fn set_stream_buffer_handling_mode(
        &mut self,
        value: BufferHandlingMode,
    ) -> weft_cam::Result<()> {
        self.feature_enum_set("StreamBufferHandlingMode", handling_mode_to_str(value)?)
    }

    fn acquisition_start(&mut self) -> weft_cam::Result<()> {
        self.with_state(|state| {
            if state.streaming {
                return Err("acquisition already running".into());
            }
            let count: u32 = state
                .int_value("StreamBufferCountManual")
                .unwrap_or(DEFAULT_SLOT_COUNT)
                .try_into()?;
            state.slot_count = count;
            state.free_slots = (0..count).rev().collect();
            state.filled.clear();
            state.streaming = true;
            debug!(
                "sim camera {}: acquisition started with {} buffer slots",
                state.serial, count
            );
            Ok(())
        })
    }

    fn acquisition_stop(&mut self) -> weft_cam::Result<()> {
        self.with_state(|state| {
            state.streaming = false;
            state.filled.clear();
            state.free_slots.clear();
            state.slot_count = 0;
            Ok(())
        })
    }

    fn next_frame(&mut self) -> weft_cam::Result<RawFrame> {
        let deadline = Instant::now() + GRAB_TIMEOUT;
        let mut state = self.shared.state.lock();
        loop {
            if state.unplugged {
                return Err(weft_cam::Error::DeviceUnavailable(self.serial.clone()));
            }
            if !state.streaming {
                return Err("acquisition not running".into());
            }
            if state.filled.is_empty() && state.free_running() {
                state.arrival();
                if state.unplugged {
                    continue;
                }
            }
            if let Some(raw) = state.filled.pop_front() {
                return Ok(raw);
            }
            if self.shared.cond.wait_until(&mut state, deadline).timed_out() {
                return match state.filled.pop_front() {
                    Some(raw) => Ok(raw),
                    None => Err(weft_cam::Error::Timeout),
                };
            }
        }
    }

    fn release_frame(&mut self, slot: BufferSlot) -> weft_cam::Result<()> {
        self.with_state(|state| {
            if !state.streaming {
                return Err("acquisition not running".into());
            }
            if slot.0 >= state.slot_count {
                return Err(format!("unknown buffer slot {}", slot.0).into());
            }
            if state.free_slots.contains(&slot.0) {
                return Err(format!("buffer slot {} released twice", slot.0).into());
            }
            state.free_slots.push(slot.0);
            Ok(())
        })
    }
}

fn str_to_auto_mode(val: &str) -> weft_cam::Result<AutoMode> {
    match val {
        "Off" => Ok(AutoMode::Off),
        "Once" => Ok(AutoMode::Once),
        "Continuous" => Ok(AutoMode::Continuous),
        s => Err(format!("unexpected AutoMode enum string: {s}").into()),
    }
}

fn auto_mode_to_str(value: AutoMode) -> &'static str {
    use AutoMode::*;
    match value {
        Off => "Off",
        Once => "Once",
        Continuous => "Continuous",
    }
}

fn str_to_acquisition_mode(val: &str) -> weft_cam::Result<AcquisitionMode> {
    match val {
        "Continuous" => Ok(AcquisitionMode::Continuous),
        "SingleFrame" => Ok(AcquisitionMode::SingleFrame),
        "MultiFrame" => Ok(AcquisitionMode::MultiFrame),
        s => Err(format!("unexpected AcquisitionMode enum string: {s}").into()),
    }
}

fn acquisition_mode_to_str(value: AcquisitionMode) -> &'static str {
    use AcquisitionMode::*;
    match value {
        Continuous => "Continuous",
        SingleFrame => "SingleFrame",
        MultiFrame => "MultiFrame",
    }
}

fn str_to_handling_mode(val: &str) -> weft_cam::Result<BufferHandlingMode> {
    match val {
        "OldestFirst" => Ok(BufferHandlingMode::OldestFirst),
        "OldestFirstOverwrite" => Ok(BufferHandlingMode::OldestFirstOverwrite),
        "NewestOnly" => Ok(BufferHandlingMode::NewestOnly),
        "NewestFirst" => Ok(BufferHandlingMode::NewestFirst),
        s => Err(format!("unexpected StreamBufferHandlingMode enum string: {s}").into()),
    }
}

fn handling_mode_to_str(value: BufferHandlingMode) -> weft_cam::Result<&'static str> {
    use BufferHandlingMode::*;
    match value {
        OldestFirst => Ok("OldestFirst"),
        OldestFirstOverwrite => Ok("OldestFirstOverwrite"),
        NewestOnly => Ok("NewestOnly"),
        NewestFirst => Ok("NewestFirst"),
        _ => Err(format!("unsupported StreamBufferHandlingMode {value:?}").into()),
    }
}

fn str_to_pixel_format(val: &str) -> weft_cam::Result<formats::PixFmt> {
    match val {
        "Mono8" => Ok(formats::PixFmt::Mono8),
        "RGB8" => Ok(formats::PixFmt::RGB8),
        "BayerRG8" => Ok(formats::PixFmt::BayerRG8),
        s => Err(format!("unexpected PixelFormat enum string: {s}").into()),
    }
}

fn pixel_format_to_str(value: formats::PixFmt) -> weft_cam::Result<&'static str> {
    use formats::PixFmt::*;
    match value {
        Mono8 => Ok("Mono8"),
        RGB8 => Ok("RGB8"),
        BayerRG8 => Ok("BayerRG8"),
        other => Err(format!("unsupported pixel format {other:?}").into()),
    }
}
