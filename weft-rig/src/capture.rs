//! Per-camera capture thread.
//!
//! Each configured camera gets one thread that owns the grab loop: wait for
//! the next triggered frame, copy it out of the driver buffer, return the
//! buffer slot, publish the dense copy on a channel. The camera itself sits
//! behind `Arc<Mutex<_>>` so other threads can still touch it between grabs.

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, error, warn};

use weft_cam::{Camera, TriggerSource};
use weft_frame::Frame;

/// Owned handle to one camera's capture thread.
pub struct CaptureHandle {
    control: thread_control::Control,
    join_handle: std::thread::JoinHandle<()>,
}

impl CaptureHandle {
    /// True once the capture thread has exited, for any reason.
    pub fn is_done(&self) -> bool {
        self.control.is_done()
    }

    /// Signal the thread to stop and wait for it to finish.
    pub fn stop(self) {
        self.control.stop();
        if self.join_handle.join().is_err() {
            error!("capture thread panicked");
        }
    }
}

/// Spawn the grab loop for one camera.
///
/// The loop runs until [`CaptureHandle::stop`] is called, the receiving side
/// of `tx` is dropped, or the device fails. Frames that time out, arrive
/// incomplete or fail conversion are dropped and the loop continues; only a
/// device-level error ends it.
///
/// With [`TriggerSource::Software`] the loop fires the software trigger
/// itself before each grab. With hardware triggering it only waits.
pub fn spawn_capture<C>(
    camera: Arc<Mutex<C>>,
    serial: &str,
    trigger_source: TriggerSource,
    tx: crossbeam_channel::Sender<Frame>,
) -> weft_cam::Result<CaptureHandle>
where
    C: 'static + Camera,
{
    let serial = serial.to_string();
    let fire_software_trigger = trigger_source == TriggerSource::Software;

    let (flag, control) = thread_control::make_pair();
    let thread_builder = std::thread::Builder::new().name(format!("weft-capture-{serial}"));
    let join_handle: std::thread::JoinHandle<()> = thread_builder.spawn(move || {
        let mut store_fno: usize = 0;
        while flag.is_alive() {
            // We need to release and re-acquire the lock every cycle to
            // allow other threads the chance to grab the lock.
            let frame = {
                let mut cam = camera.lock();

                if fire_software_trigger {
                    if let Err(e) = cam.command_execute("TriggerSoftware", true) {
                        error!("fatal error firing software trigger: {e} {e:?}");
                        return;
                    }
                }

                let raw = match cam.next_frame() {
                    Ok(raw) => raw,
                    Err(weft_cam::Error::Timeout) => {
                        debug!("no frame within grab timeout, waiting again");
                        continue;
                    }
                    Err(weft_cam::Error::IncompleteFrame(reason)) => {
                        warn!("dropping incomplete frame: {reason}");
                        continue;
                    }
                    Err(e) => {
                        error!(
                            "fatal error acquiring frames: {} {:?} {}:{}",
                            e,
                            e,
                            file!(),
                            line!()
                        );
                        return;
                    }
                };
                // Earliest host-clock estimate of when this frame arrived.
                let now = chrono::Utc::now();

                let frame = if raw.status.is_complete() {
                    match Frame::from_raw(&raw, &serial, store_fno, now) {
                        Ok(frame) => Some(frame),
                        Err(e) => {
                            warn!("dropping unconvertible frame: {e}");
                            None
                        }
                    }
                } else {
                    warn!("dropping frame {} with status {:?}", raw.block_id, raw.status);
                    None
                };

                // Return the buffer slot before publishing.
                if let Err(e) = cam.release_frame(raw.slot) {
                    error!("fatal error releasing buffer slot: {e} {e:?}");
                    return;
                }
                frame
            };

            let Some(frame) = frame else {
                continue;
            };

            match tx.try_send(frame) {
                Ok(()) => {
                    // Only published frames consume a host frame number.
                    store_fno += 1;
                }
                Err(e) => {
                    if e.is_full() {
                        // channel was full
                        error!("dropping frame due to backpressure");
                    }
                    if e.is_disconnected() {
                        debug!("capture listener disconnected");
                        return;
                    }
                }
            };
        }
        debug!(
            "closing thread {:?} ({:?}) in {}:{}",
            std::thread::current().name(),
            std::thread::current().id(),
            file!(),
            line!()
        );
    })?;

    Ok(CaptureHandle {
        control,
        join_handle,
    })
}
