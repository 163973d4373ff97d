//! Discovery, configuration and triggered capture for a multi-camera rig.
//!
//! [`launch`] enumerates the cameras of one backend module, pairs each with
//! its entry in an immutable [`RigLayout`], runs the configuration sequence
//! in [`configure`] and starts one capture thread per ready camera. Every
//! capture thread publishes [`weft_frame::Frame`] values on the channel
//! given to [`launch`], tagged with the originating camera's serial number.
//!
//! Each camera is wrapped in `Arc<Mutex<_>>` and its capture thread holds
//! the lock only while grabbing one frame, so settings can still be changed
//! at runtime between acquisitions.
//!
//! Cameras fail independently. A camera that cannot be fully configured is
//! kept in a degraded state (its [`configure::CameraReport`] says what was
//! skipped), and a camera whose device vanishes mid-capture takes down only
//! its own thread.

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{info, warn};

use weft_cam::{Camera, CameraInfo, CameraModule};
use weft_frame::Frame;

pub mod capture;
pub mod config;
pub mod configure;
pub mod shutdown;

pub use capture::{spawn_capture, CaptureHandle};
pub use config::{CameraGeometry, ExposureConfig, RigLayout, RigSettings};
pub use configure::{configure_camera, CameraReport, ConfigStep, StepOutcome};

/// One opened camera, its configuration report and its capture thread.
pub struct RigCamera<C> {
    serial: String,
    report: CameraReport,
    camera: Arc<Mutex<C>>,
    /// When capturing, has value of Some, else None.
    handle: Option<CaptureHandle>,
}

impl<C> RigCamera<C>
where
    C: Camera,
{
    pub fn serial(&self) -> &str {
        &self.serial
    }

    pub fn report(&self) -> &CameraReport {
        &self.report
    }

    /// Shared handle to the underlying camera.
    ///
    /// The capture thread holds the lock only while grabbing, so settings
    /// can be adjusted between frames.
    pub fn camera(&self) -> Arc<Mutex<C>> {
        self.camera.clone()
    }

    /// True while this camera's capture thread is running.
    pub fn is_capturing(&self) -> bool {
        match &self.handle {
            Some(handle) => !handle.is_done(),
            None => false,
        }
    }

    /// Stop capturing and restore the device for other software.
    pub fn shutdown(mut self) {
        info!("shutting down camera {}", self.serial);
        if let Some(handle) = self.handle.take() {
            handle.stop();
        }
        let mut camera = self.camera.lock();
        if let Err(e) = camera.acquisition_stop() {
            warn!("camera {}: acquisition stop failed: {e}", self.serial);
        }
        shutdown::reset_trigger(&mut *camera);
        shutdown::reset_exposure(&mut *camera);
    }
}

/// Open, configure and start every discovered camera.
///
/// Cameras are paired with layout entries by discovery index; a camera
/// beyond the end of the layout is not opened. A camera that configures to
/// a non-ready state stays in the returned set with its report, but no
/// capture thread is started for it.
///
/// Returns [`weft_cam::Error::NoDeviceFound`] when the module reports no
/// attached cameras.
pub fn launch<M>(
    module: &mut M,
    layout: &RigLayout,
    settings: &RigSettings,
    tx: crossbeam_channel::Sender<Frame>,
) -> weft_cam::Result<Vec<RigCamera<M::CameraType>>>
where
    M: CameraModule,
    M::CameraType: 'static,
{
    let infos = weft_cam::discover(module)?;
    info!(
        "module {} reports {} camera(s)",
        module.name(),
        infos.len()
    );

    let mut cameras = Vec::with_capacity(infos.len());
    for (index, info) in infos.iter().enumerate() {
        let Some(geometry) = layout.geometry(index) else {
            warn!(
                "camera {} has no layout entry at position {index}, not opening it",
                info.serial()
            );
            continue;
        };
        let mut camera = match module.camera(info.name()) {
            Ok(camera) => camera,
            Err(e) => {
                warn!("could not open camera {}: {e}", info.name());
                continue;
            }
        };
        let serial = camera.serial().to_string();
        let report = configure_camera(&mut camera, geometry, settings);
        let camera = Arc::new(Mutex::new(camera));

        let handle = if report.is_ready() {
            // Take the lock in a statement of its own so the guard is gone
            // before the capture thread needs it.
            let start_result = camera.lock().acquisition_start();
            match start_result {
                Ok(()) => Some(spawn_capture(
                    camera.clone(),
                    &serial,
                    settings.trigger_source,
                    tx.clone(),
                )?),
                Err(e) => {
                    warn!("camera {serial}: acquisition start failed: {e}");
                    None
                }
            }
        } else {
            warn!("camera {serial}: not ready, capture not started");
            None
        };

        cameras.push(RigCamera {
            serial,
            report,
            camera,
            handle,
        });
    }
    Ok(cameras)
}
