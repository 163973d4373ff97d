//! Bring up a simulated two-camera rig, pulse the trigger line and print
//! the frames that come back. The configuration sequence is logged to
//! stderr by default; set `RUST_LOG` to change what is shown.

use std::time::Duration;

use weft_cam::IntParameter;
use weft_rig::{launch, CameraGeometry, RigLayout, RigSettings};
use weft_sim::{GrabOutcome, SimDeviceSpec};

const PULSES: usize = 10;

fn demo_device(serial: &str) -> SimDeviceSpec {
    let script = (0..PULSES)
        .map(|index| GrabOutcome::Frame { fill: index as u8 })
        .collect();
    SimDeviceSpec::new(serial)
        .int_feature(
            "Width",
            640,
            IntParameter {
                min: 32,
                max: 640,
                increment: 32,
            },
        )
        .int_feature(
            "Height",
            480,
            IntParameter {
                min: 2,
                max: 480,
                increment: 2,
            },
        )
        .script(script)
}

fn main() -> anyhow::Result<()> {
    weft_log::init();

    let serials = ["sim-a", "sim-b"];
    let mut module = weft_sim::new_module(serials.iter().map(|s| demo_device(s)).collect())?;
    let triggers: Vec<_> = serials
        .iter()
        .filter_map(|serial| module.trigger(serial))
        .collect();

    let layout = RigLayout {
        cameras: serials
            .iter()
            .map(|_| CameraGeometry {
                width: 640,
                height: 480,
                offset_x: 0,
                offset_y: 0,
            })
            .collect(),
    };

    let (tx, rx) = crossbeam_channel::bounded(10);
    let cameras = launch(&mut module, &layout, &RigSettings::default(), tx)?;
    if cameras.is_empty() {
        anyhow::bail!("no cameras detected");
    }
    for camera in &cameras {
        println!(
            "camera {}: ready={} degraded={}",
            camera.serial(),
            camera.report().is_ready(),
            camera.report().is_degraded()
        );
    }

    for _ in 0..PULSES {
        for trigger in &triggers {
            trigger.pulse(1);
        }
        for _ in 0..triggers.len() {
            match rx.recv_timeout(Duration::from_secs(1)) {
                Ok(frame) => {
                    println!(
                        "  got frame {} from {}: {}x{} {}",
                        frame.host_framenumber(),
                        frame.serial(),
                        frame.width(),
                        frame.height(),
                        frame.pixel_format()
                    );
                }
                Err(e) => {
                    println!("  no frame arrived: {e}");
                    break;
                }
            }
        }
    }

    for camera in cameras {
        camera.shutdown();
    }

    Ok(())
}
