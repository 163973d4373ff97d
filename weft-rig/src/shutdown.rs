//! Best-effort restoration of camera defaults at shutdown.
//!
//! A camera left externally triggered with a fixed exposure is useless to
//! the next program that opens it, so teardown hands those controls back.
//! Failures here are logged and swallowed; the device may already be gone.

use tracing::warn;

use weft_cam::{AutoMode, Camera, TriggerMode};

/// Put the trigger back to free-running.
pub fn reset_trigger<C: Camera>(camera: &mut C) -> bool {
    match camera.set_trigger_mode(TriggerMode::Off) {
        Ok(()) => true,
        Err(e) => {
            warn!(
                "camera {}: could not disable triggering: {e}",
                camera.serial()
            );
            false
        }
    }
}

/// Hand exposure control back to the device.
pub fn reset_exposure<C: Camera>(camera: &mut C) -> bool {
    match camera.set_exposure_auto(AutoMode::Continuous) {
        Ok(()) => true,
        Err(e) => {
            warn!(
                "camera {}: could not restore auto exposure: {e}",
                camera.serial()
            );
            false
        }
    }
}
