//! Per-camera configuration sequence.
//!
//! Every step runs through one attempt-and-degrade helper: query the
//! feature's [`ControlState`], skip when the control is absent or read-only,
//! otherwise apply and record the outcome. A failed step degrades that
//! capability and the sequence continues; only a vanished device aborts the
//! remaining steps.

use tracing::{debug, error, info, warn};

use weft_cam::{AcquisitionMode, AutoMode, BufferHandlingMode, Camera, ControlState, TriggerMode};

use crate::config::{CameraGeometry, ExposureConfig, RigSettings};

/// One entry of the configuration sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigStep {
    AcquisitionMode,
    PixelFormat,
    BufferCount,
    BufferHandlingMode,
    FrameRate,
    Width,
    Height,
    OffsetX,
    OffsetY,
    Trigger,
    Exposure,
}

/// What happened to one configuration step.
#[derive(Debug, Clone, PartialEq)]
pub enum StepOutcome {
    Applied,
    /// The control cannot be programmed on this device. Degraded, not failed.
    Skipped { reason: String },
    Failed { reason: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct StepReport {
    pub step: ConfigStep,
    pub outcome: StepOutcome,
}

/// Accumulated configuration outcome for one camera.
#[derive(Debug, Clone)]
pub struct CameraReport {
    pub serial: String,
    pub steps: Vec<StepReport>,
    /// Set when the device stopped responding mid-sequence.
    pub device_lost: bool,
}

impl CameraReport {
    fn new(serial: String) -> Self {
        CameraReport {
            serial,
            steps: Vec::new(),
            device_lost: false,
        }
    }

    fn record(&mut self, step: ConfigStep, outcome: StepOutcome) {
        match &outcome {
            StepOutcome::Applied => debug!("camera {}: {:?} applied", self.serial, step),
            StepOutcome::Skipped { reason } => {
                warn!("camera {}: {:?} skipped: {reason}", self.serial, step)
            }
            StepOutcome::Failed { reason } => {
                warn!("camera {}: {:?} failed: {reason}", self.serial, step)
            }
        }
        self.steps.push(StepReport { step, outcome });
    }

    fn device_lost(&mut self, step: ConfigStep) {
        error!("camera {}: device lost during {:?}", self.serial, step);
        self.device_lost = true;
        self.steps.push(StepReport {
            step,
            outcome: StepOutcome::Failed {
                reason: "device unavailable".to_string(),
            },
        });
    }

    pub fn outcome(&self, step: ConfigStep) -> Option<&StepOutcome> {
        self.steps
            .iter()
            .find(|report| report.step == step)
            .map(|report| &report.outcome)
    }

    pub fn applied(&self, step: ConfigStep) -> bool {
        matches!(self.outcome(step), Some(StepOutcome::Applied))
    }

    /// Whether the camera can capture externally triggered frames.
    ///
    /// Continuous acquisition and the trigger wiring are required; every
    /// other step failure leaves the camera usable in a degraded mode.
    pub fn is_ready(&self) -> bool {
        !self.device_lost
            && self.applied(ConfigStep::AcquisitionMode)
            && self.applied(ConfigStep::Trigger)
    }

    /// Whether any capability was skipped or failed.
    pub fn is_degraded(&self) -> bool {
        self.steps
            .iter()
            .any(|report| !matches!(report.outcome, StepOutcome::Applied))
    }
}

/// Extra check run after the writability gate.
enum Gate {
    Writable,
    /// Also require usable integer limits. Devices report a zero maximum or
    /// increment for controls that exist but cannot currently be programmed.
    WritableConfigurable,
}

/// Gate one step on the feature's control state, then attempt it.
///
/// Returns false when the device vanished and the caller should stop
/// configuring it.
fn apply_step<C: Camera>(
    camera: &mut C,
    report: &mut CameraReport,
    step: ConfigStep,
    feature: &str,
    gate: Gate,
    action: impl FnOnce(&mut C) -> weft_cam::Result<()>,
) -> bool {
    let state: ControlState = match camera.control_state(feature) {
        Ok(state) => state,
        Err(weft_cam::Error::DeviceUnavailable(_)) => {
            report.device_lost(step);
            return false;
        }
        Err(err) => {
            report.record(
                step,
                StepOutcome::Failed {
                    reason: err.to_string(),
                },
            );
            return true;
        }
    };
    if !state.is_present {
        report.record(
            step,
            StepOutcome::Skipped {
                reason: format!("{feature} not present"),
            },
        );
        return true;
    }
    if !state.is_writable {
        report.record(
            step,
            StepOutcome::Skipped {
                reason: format!("{feature} not writable"),
            },
        );
        return true;
    }
    if let Gate::WritableConfigurable = gate {
        match camera.feature_int_limits(feature) {
            Ok(limits) if !limits.is_configurable() => {
                report.record(
                    step,
                    StepOutcome::Skipped {
                        reason: format!(
                            "{feature} reports no usable range (max {}, increment {})",
                            limits.max, limits.increment
                        ),
                    },
                );
                return true;
            }
            Ok(_) => {}
            Err(weft_cam::Error::DeviceUnavailable(_)) => {
                report.device_lost(step);
                return false;
            }
            Err(err) => {
                report.record(
                    step,
                    StepOutcome::Failed {
                        reason: err.to_string(),
                    },
                );
                return true;
            }
        }
    }
    match action(camera) {
        Ok(()) => {
            report.record(step, StepOutcome::Applied);
            true
        }
        Err(weft_cam::Error::DeviceUnavailable(_)) => {
            report.device_lost(step);
            false
        }
        Err(err) => {
            report.record(
                step,
                StepOutcome::Failed {
                    reason: err.to_string(),
                },
            );
            true
        }
    }
}

/// Bring one camera from power-on defaults to a triggerable state.
///
/// Steps run in a fixed order: continuous acquisition, pixel format, buffer
/// policy (count before handling mode), frame rate, geometry (size before
/// offsets), trigger wiring, exposure. The report lists the outcome of each
/// attempted step.
pub fn configure_camera<C: Camera>(
    camera: &mut C,
    geometry: CameraGeometry,
    settings: &RigSettings,
) -> CameraReport {
    info!(
        "configuring camera {} ({} {})",
        camera.serial(),
        camera.vendor(),
        camera.model()
    );
    let mut report = CameraReport::new(camera.serial().to_string());

    if !apply_step(
        camera,
        &mut report,
        ConfigStep::AcquisitionMode,
        "AcquisitionMode",
        Gate::Writable,
        |camera| camera.set_acquisition_mode(AcquisitionMode::Continuous),
    ) {
        return report;
    }
    if !report.applied(ConfigStep::AcquisitionMode) {
        // Without continuous acquisition the device cannot stream at all.
        error!(
            "camera {}: continuous acquisition unavailable, leaving unconfigured",
            report.serial
        );
        return report;
    }

    if !apply_step(
        camera,
        &mut report,
        ConfigStep::PixelFormat,
        "PixelFormat",
        Gate::Writable,
        |camera| camera.set_pixel_format(settings.pixel_format),
    ) {
        return report;
    }

    if !apply_step(
        camera,
        &mut report,
        ConfigStep::BufferCount,
        "StreamBufferCountManual",
        Gate::Writable,
        |camera| {
            // The count mode must be manual before the count is written.
            camera.feature_enum_set("StreamBufferCountMode", "Manual")?;
            camera.set_stream_buffer_count(settings.buffer_count)
        },
    ) {
        return report;
    }

    if !apply_step(
        camera,
        &mut report,
        ConfigStep::BufferHandlingMode,
        "StreamBufferHandlingMode",
        Gate::Writable,
        |camera| camera.set_stream_buffer_handling_mode(BufferHandlingMode::NewestOnly),
    ) {
        return report;
    }

    let frame_rate = settings.frame_rate;
    if !apply_step(
        camera,
        &mut report,
        ConfigStep::FrameRate,
        "AcquisitionFrameRateEnable",
        Gate::Writable,
        |camera| {
            // Frame rate writes require triggering off.
            camera.set_trigger_mode(TriggerMode::Off)?;
            let current = camera.acquisition_frame_rate()?;
            debug!("frame rate before configuration: {current} fps");
            let (min, max) = camera.acquisition_frame_rate_range()?;
            let target = frame_rate.clamp(min, max);
            if target != frame_rate {
                warn!("frame rate {frame_rate} fps outside [{min}, {max}], using {target} fps");
            }
            camera.set_software_frame_rate_limit(target)
        },
    ) {
        return report;
    }

    if !apply_step(
        camera,
        &mut report,
        ConfigStep::Width,
        "Width",
        Gate::WritableConfigurable,
        |camera| camera.set_width(geometry.width),
    ) {
        return report;
    }
    if !apply_step(
        camera,
        &mut report,
        ConfigStep::Height,
        "Height",
        Gate::WritableConfigurable,
        |camera| camera.set_height(geometry.height),
    ) {
        return report;
    }
    if !apply_step(
        camera,
        &mut report,
        ConfigStep::OffsetX,
        "OffsetX",
        Gate::WritableConfigurable,
        |camera| camera.set_offset_x(geometry.offset_x),
    ) {
        return report;
    }
    if !apply_step(
        camera,
        &mut report,
        ConfigStep::OffsetY,
        "OffsetY",
        Gate::WritableConfigurable,
        |camera| camera.set_offset_y(geometry.offset_y),
    ) {
        return report;
    }

    let source = settings.trigger_source;
    if !apply_step(
        camera,
        &mut report,
        ConfigStep::Trigger,
        "TriggerMode",
        Gate::Writable,
        |camera| camera.start_frame_triggering(source),
    ) {
        return report;
    }

    let exposure = settings.exposure;
    if !apply_step(
        camera,
        &mut report,
        ConfigStep::Exposure,
        "ExposureAuto",
        Gate::Writable,
        |camera| match exposure {
            ExposureConfig::Auto => camera.set_exposure_auto(AutoMode::Continuous),
            ExposureConfig::Manual { time_us } => {
                camera.set_exposure_auto(AutoMode::Off)?;
                let (min, max) = camera.exposure_time_range()?;
                let mut value = time_us;
                if value < min || value > max {
                    warn!("exposure time {time_us} us outside [{min}, {max}] us, using minimum");
                    value = min;
                }
                camera.set_exposure_time(value)
            }
        },
    ) {
        return report;
    }

    if report.is_ready() {
        if report.is_degraded() {
            info!("camera {} ready (degraded)", report.serial);
        } else {
            info!("camera {} ready", report.serial);
        }
    } else {
        warn!("camera {} not ready for capture", report.serial);
    }
    report
}
