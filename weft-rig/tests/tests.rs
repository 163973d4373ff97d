use std::time::{Duration, Instant};

use machine_vision_formats::PixFmt;
use test_log::test;

use weft_cam::{Camera, CameraModule, IntParameter, TriggerMode, TriggerSource};
use weft_rig::{
    configure_camera, launch, CameraGeometry, ConfigStep, ExposureConfig, RigLayout, RigSettings,
    StepOutcome,
};
use weft_sim::{new_module, FeatureWrite, GrabOutcome, SimDeviceSpec};

const ALL_STEPS: [ConfigStep; 11] = [
    ConfigStep::AcquisitionMode,
    ConfigStep::PixelFormat,
    ConfigStep::BufferCount,
    ConfigStep::BufferHandlingMode,
    ConfigStep::FrameRate,
    ConfigStep::Width,
    ConfigStep::Height,
    ConfigStep::OffsetX,
    ConfigStep::OffsetY,
    ConfigStep::Trigger,
    ConfigStep::Exposure,
];

/// Device with a small sensor so copied frames stay cheap.
fn small_device(serial: &str, script: Vec<GrabOutcome>) -> SimDeviceSpec {
    SimDeviceSpec::new(serial)
        .int_feature(
            "Width",
            64,
            IntParameter {
                min: 8,
                max: 64,
                increment: 8,
            },
        )
        .int_feature(
            "Height",
            4,
            IntParameter {
                min: 2,
                max: 16,
                increment: 2,
            },
        )
        .script(script)
}

fn small_layout(count: usize) -> RigLayout {
    RigLayout {
        cameras: (0..count)
            .map(|_| CameraGeometry {
                width: 64,
                height: 4,
                offset_x: 0,
                offset_y: 0,
            })
            .collect(),
    }
}

fn first_write_to(writes: &[FeatureWrite], name: &str) -> usize {
    writes
        .iter()
        .position(|write| write.name() == name)
        .unwrap_or_else(|| panic!("no write to {name}"))
}

fn write_position(writes: &[FeatureWrite], target: &FeatureWrite) -> usize {
    writes
        .iter()
        .position(|write| write == target)
        .unwrap_or_else(|| panic!("no write matching {target:?}"))
}

#[test]
fn geometry_applies_size_before_offsets() {
    let mut module = new_module(vec![SimDeviceSpec::new("cam0")]).unwrap();
    let journal = module.write_journal("cam0").unwrap();
    let mut cam = module.camera("cam0").unwrap();
    let layout = RigLayout::default();

    let report = configure_camera(
        &mut cam,
        layout.geometry(0).unwrap(),
        &RigSettings::default(),
    );
    assert!(report.is_ready());

    let writes = journal.snapshot();
    assert!(first_write_to(&writes, "Width") < first_write_to(&writes, "Height"));
    assert!(first_write_to(&writes, "Height") < first_write_to(&writes, "OffsetX"));
    assert!(first_write_to(&writes, "OffsetX") < first_write_to(&writes, "OffsetY"));
}

#[test]
fn trigger_source_changes_only_while_trigger_off() {
    let mut module = new_module(vec![SimDeviceSpec::new("cam0")]).unwrap();
    let journal = module.write_journal("cam0").unwrap();
    let mut cam = module.camera("cam0").unwrap();
    let layout = RigLayout::default();

    configure_camera(
        &mut cam,
        layout.geometry(0).unwrap(),
        &RigSettings::default(),
    );

    // Replay the write sequence, tracking the trigger mode the device would
    // have held at each point. It powers on with triggering off.
    let mut trigger_mode = "Off".to_string();
    let mut last_mode_write = None;
    let mut saw_source_write = false;
    for write in journal.snapshot() {
        match write {
            FeatureWrite::Enum { name, .. } if name == "TriggerSource" => {
                assert_eq!(trigger_mode, "Off", "trigger source written while armed");
                saw_source_write = true;
            }
            FeatureWrite::Enum { name, value } if name == "TriggerMode" => {
                trigger_mode = value.clone();
                last_mode_write = Some(value);
            }
            _ => {}
        }
    }
    assert!(saw_source_write);
    assert_eq!(last_mode_write.as_deref(), Some("On"));

    assert_eq!(cam.trigger_mode().unwrap(), TriggerMode::On);
    assert_eq!(cam.trigger_source().unwrap(), TriggerSource::Line0);
}

#[test]
fn out_of_range_exposure_clamps_to_minimum() {
    let spec = SimDeviceSpec::new("cam0").float_feature(
        "ExposureTime",
        25_000.0,
        (20_000.0, 30_000.0),
    );
    let mut module = new_module(vec![spec]).unwrap();
    let journal = module.write_journal("cam0").unwrap();
    let mut cam = module.camera("cam0").unwrap();
    let layout = RigLayout::default();

    let settings = RigSettings {
        exposure: ExposureConfig::Manual {
            time_us: weft_rig::config::DEFAULT_MANUAL_EXPOSURE_US,
        },
        ..RigSettings::default()
    };
    let report = configure_camera(&mut cam, layout.geometry(0).unwrap(), &settings);
    assert!(report.applied(ConfigStep::Exposure));

    // 17 ms is below this device's floor, so the floor wins.
    assert_eq!(cam.exposure_time().unwrap(), 20_000.0);

    let writes = journal.snapshot();
    let auto_off = write_position(
        &writes,
        &FeatureWrite::Enum {
            name: "ExposureAuto".to_string(),
            value: "Off".to_string(),
        },
    );
    let time_write = write_position(
        &writes,
        &FeatureWrite::Float {
            name: "ExposureTime".to_string(),
            value: 20_000.0,
        },
    );
    assert!(auto_off < time_write);
}

#[test]
fn exposure_above_max_also_clamps_to_minimum() {
    let spec = SimDeviceSpec::new("cam0").float_feature("ExposureTime", 5_000.0, (8.0, 10_000.0));
    let mut module = new_module(vec![spec]).unwrap();
    let mut cam = module.camera("cam0").unwrap();
    let layout = RigLayout::default();

    let settings = RigSettings {
        exposure: ExposureConfig::Manual { time_us: 17_000.0 },
        ..RigSettings::default()
    };
    let report = configure_camera(&mut cam, layout.geometry(0).unwrap(), &settings);
    assert!(report.applied(ConfigStep::Exposure));

    // Out of range in either direction lands on the minimum, never the
    // maximum: a too-long exposure would blur moving targets.
    assert_eq!(cam.exposure_time().unwrap(), 8.0);
}

#[test]
fn incomplete_frames_are_dropped_not_published() {
    let spec = small_device(
        "cam0",
        vec![
            GrabOutcome::Incomplete {
                reason: "transfer stopped short".to_string(),
            },
            GrabOutcome::Frame { fill: 7 },
        ],
    );
    let mut module = new_module(vec![spec]).unwrap();
    let trigger = module.trigger("cam0").unwrap();
    let (tx, rx) = crossbeam_channel::unbounded();

    let settings = RigSettings {
        buffer_count: 1,
        ..RigSettings::default()
    };
    let cameras = launch(&mut module, &small_layout(1), &settings, tx).unwrap();
    assert_eq!(cameras.len(), 1);
    assert!(cameras[0].is_capturing());

    // The incomplete transfer must not surface as a frame.
    trigger.pulse(1);
    assert!(rx.recv_timeout(Duration::from_millis(300)).is_err());

    // With only one buffer slot, receiving this frame proves the slot of
    // the dropped frame was returned to the driver.
    trigger.pulse(1);
    let frame = rx.recv_timeout(Duration::from_secs(2)).unwrap();
    assert_eq!(frame.image_data()[0], 7);
    assert_eq!(frame.host_framenumber(), 0);

    for camera in cameras {
        camera.shutdown();
    }
}

#[test]
fn end_to_end_hardware_rig_bring_up() {
    let spec = SimDeviceSpec::new("cam0")
        .int_feature(
            "Width",
            640,
            IntParameter {
                min: 32,
                max: 800,
                increment: 32,
            },
        )
        .int_feature(
            "Height",
            1080,
            IntParameter {
                min: 2,
                max: 1280,
                increment: 1,
            },
        )
        .int_feature(
            "OffsetX",
            0,
            IntParameter {
                min: 0,
                max: 1000,
                increment: 4,
            },
        )
        .int_feature(
            "OffsetY",
            0,
            IntParameter {
                min: 0,
                max: 1000,
                increment: 4,
            },
        )
        .script(vec![GrabOutcome::Frame { fill: 42 }]);
    let mut module = new_module(vec![spec]).unwrap();
    let journal = module.write_journal("cam0").unwrap();
    let trigger = module.trigger("cam0").unwrap();
    let (tx, rx) = crossbeam_channel::unbounded();

    let cameras = launch(
        &mut module,
        &RigLayout::default(),
        &RigSettings::default(),
        tx,
    )
    .unwrap();
    assert_eq!(cameras.len(), 1);

    let report = cameras[0].report();
    assert!(report.is_ready());
    assert!(!report.is_degraded());
    for step in ALL_STEPS {
        assert!(report.applied(step), "{step:?} was not applied");
    }

    let writes = journal.snapshot();
    let count_mode = write_position(
        &writes,
        &FeatureWrite::Enum {
            name: "StreamBufferCountMode".to_string(),
            value: "Manual".to_string(),
        },
    );
    let count = write_position(
        &writes,
        &FeatureWrite::Int {
            name: "StreamBufferCountManual".to_string(),
            value: 3,
        },
    );
    let handling = write_position(
        &writes,
        &FeatureWrite::Enum {
            name: "StreamBufferHandlingMode".to_string(),
            value: "NewestOnly".to_string(),
        },
    );
    assert!(count_mode < count);
    assert!(count < handling);
    write_position(
        &writes,
        &FeatureWrite::Enum {
            name: "PixelFormat".to_string(),
            value: "RGB8".to_string(),
        },
    );
    write_position(
        &writes,
        &FeatureWrite::Enum {
            name: "TriggerSource".to_string(),
            value: "Line0".to_string(),
        },
    );
    write_position(
        &writes,
        &FeatureWrite::Int {
            name: "Width".to_string(),
            value: 800,
        },
    );
    write_position(
        &writes,
        &FeatureWrite::Int {
            name: "Height".to_string(),
            value: 1280,
        },
    );
    write_position(
        &writes,
        &FeatureWrite::Int {
            name: "OffsetX".to_string(),
            value: 500,
        },
    );
    write_position(
        &writes,
        &FeatureWrite::Int {
            name: "OffsetY".to_string(),
            value: 500,
        },
    );

    trigger.pulse(1);
    let frame = rx.recv_timeout(Duration::from_secs(2)).unwrap();
    assert_eq!(frame.serial(), "cam0");
    assert_eq!(frame.width(), 800);
    assert_eq!(frame.height(), 1280);
    assert_eq!(frame.channels(), 3);
    assert_eq!(frame.pixel_format(), PixFmt::RGB8);
    assert_eq!(frame.stride(), 2400);
    assert_eq!(frame.host_framenumber(), 0);
    assert_eq!(frame.image_data().len(), 800 * 1280 * 3);
    assert!(frame.image_data().iter().all(|&byte| byte == 42));

    for camera in cameras {
        camera.shutdown();
    }

    // Teardown leaves the device free-running with auto exposure.
    let writes = journal.snapshot();
    let last_trigger_mode = writes
        .iter()
        .rev()
        .find_map(|write| match write {
            FeatureWrite::Enum { name, value } if name == "TriggerMode" => Some(value.clone()),
            _ => None,
        })
        .unwrap();
    assert_eq!(last_trigger_mode, "Off");
    let last_exposure_auto = writes
        .iter()
        .rev()
        .find_map(|write| match write {
            FeatureWrite::Enum { name, value } if name == "ExposureAuto" => Some(value.clone()),
            _ => None,
        })
        .unwrap();
    assert_eq!(last_exposure_auto, "Continuous");
}

#[test]
fn unwritable_pixel_format_degrades_only_that_step() {
    let spec = SimDeviceSpec::new("cam0").feature_read_only("PixelFormat");
    let mut module = new_module(vec![spec]).unwrap();
    let mut cam = module.camera("cam0").unwrap();
    let layout = RigLayout::default();

    let report = configure_camera(
        &mut cam,
        layout.geometry(0).unwrap(),
        &RigSettings::default(),
    );

    assert!(matches!(
        report.outcome(ConfigStep::PixelFormat),
        Some(StepOutcome::Skipped { .. })
    ));
    assert!(report.is_ready());
    assert!(report.is_degraded());
    for step in ALL_STEPS {
        if step != ConfigStep::PixelFormat {
            assert!(report.applied(step), "{step:?} was not applied");
        }
    }

    // The device keeps running in its power-on format.
    assert_eq!(cam.pixel_format().unwrap(), PixFmt::Mono8);
}

#[test]
fn zero_increment_geometry_is_left_alone() {
    let spec = SimDeviceSpec::new("cam0").int_feature(
        "Width",
        64,
        IntParameter {
            min: 8,
            max: 64,
            increment: 0,
        },
    );
    let mut module = new_module(vec![spec]).unwrap();
    let journal = module.write_journal("cam0").unwrap();
    let mut cam = module.camera("cam0").unwrap();
    let layout = RigLayout::default();

    let report = configure_camera(
        &mut cam,
        layout.geometry(0).unwrap(),
        &RigSettings::default(),
    );

    assert!(matches!(
        report.outcome(ConfigStep::Width),
        Some(StepOutcome::Skipped { .. })
    ));
    assert!(report.applied(ConfigStep::Height));
    assert!(report.applied(ConfigStep::OffsetX));
    assert!(report.applied(ConfigStep::OffsetY));

    let writes = journal.snapshot();
    assert!(!writes
        .iter()
        .any(|write| matches!(write, FeatureWrite::Int { name, .. } if name == "Width")));
    assert_eq!(cam.width().unwrap(), 64);
}

#[test]
fn empty_module_reports_no_device() {
    let mut module = new_module(vec![]).unwrap();
    let (tx, _rx) = crossbeam_channel::unbounded();
    assert!(matches!(
        launch(
            &mut module,
            &RigLayout::default(),
            &RigSettings::default(),
            tx
        ),
        Err(weft_cam::Error::NoDeviceFound)
    ));
}

#[test]
fn capture_sustains_past_buffer_depth() {
    let script: Vec<GrabOutcome> = (1u8..=6).map(|fill| GrabOutcome::Frame { fill }).collect();
    let mut module = new_module(vec![small_device("cam0", script)]).unwrap();
    let trigger = module.trigger("cam0").unwrap();
    let (tx, rx) = crossbeam_channel::unbounded();

    let settings = RigSettings {
        buffer_count: 2,
        ..RigSettings::default()
    };
    let cameras = launch(&mut module, &small_layout(1), &settings, tx).unwrap();

    // Capture three times as many frames as there are buffer slots. This
    // only works when every slot comes back after its frame is copied out.
    for index in 0..6usize {
        trigger.pulse(1);
        let frame = rx.recv_timeout(Duration::from_secs(2)).unwrap();
        assert_eq!(frame.host_framenumber(), index);
        assert_eq!(frame.image_data()[0], index as u8 + 1);
    }

    for camera in cameras {
        camera.shutdown();
    }
}

#[test]
fn backpressure_drop_does_not_consume_frame_numbers() {
    let script: Vec<GrabOutcome> = (1u8..=3).map(|fill| GrabOutcome::Frame { fill }).collect();
    let mut module = new_module(vec![small_device("cam0", script)]).unwrap();
    let trigger = module.trigger("cam0").unwrap();
    let (tx, rx) = crossbeam_channel::bounded(1);

    let cameras = launch(&mut module, &small_layout(1), &RigSettings::default(), tx).unwrap();

    // The first frame fills the one-slot channel. The second arrives while
    // it still sits there and is dropped under backpressure.
    trigger.pulse(1);
    std::thread::sleep(Duration::from_millis(200));
    trigger.pulse(1);
    std::thread::sleep(Duration::from_millis(200));

    let first = rx.recv_timeout(Duration::from_secs(2)).unwrap();
    assert_eq!(first.host_framenumber(), 0);
    assert_eq!(first.image_data()[0], 1);

    // Published frames number consecutively: the dropped frame must not
    // leave a gap.
    trigger.pulse(1);
    let second = rx.recv_timeout(Duration::from_secs(2)).unwrap();
    assert_eq!(second.host_framenumber(), 1);
    assert_eq!(second.image_data()[0], 3);

    for camera in cameras {
        camera.shutdown();
    }
}

#[test]
fn device_loss_stops_only_that_camera() {
    let specs = vec![
        small_device(
            "cam0",
            vec![GrabOutcome::Frame { fill: 1 }, GrabOutcome::Unplug],
        ),
        small_device("cam1", vec![GrabOutcome::Frame { fill: 2 }]),
    ];
    let mut module = new_module(specs).unwrap();
    let trigger0 = module.trigger("cam0").unwrap();
    let trigger1 = module.trigger("cam1").unwrap();
    let (tx, rx) = crossbeam_channel::unbounded();

    let cameras = launch(
        &mut module,
        &small_layout(2),
        &RigSettings::default(),
        tx,
    )
    .unwrap();
    assert_eq!(cameras.len(), 2);

    trigger0.pulse(1);
    let frame = rx.recv_timeout(Duration::from_secs(2)).unwrap();
    assert_eq!(frame.serial(), "cam0");

    // The next pulse hits the unplug entry, which must end cam0's capture
    // thread without affecting cam1.
    trigger0.pulse(1);
    let deadline = Instant::now() + Duration::from_secs(2);
    while cameras[0].is_capturing() {
        assert!(
            Instant::now() < deadline,
            "capture thread did not notice device loss"
        );
        std::thread::sleep(Duration::from_millis(10));
    }
    assert!(cameras[1].is_capturing());

    trigger1.pulse(1);
    let frame = rx.recv_timeout(Duration::from_secs(2)).unwrap();
    assert_eq!(frame.serial(), "cam1");

    for camera in cameras {
        camera.shutdown();
    }
}

#[test]
fn extra_camera_without_layout_entry_is_skipped() {
    let mut module = new_module(vec![
        small_device("cam0", vec![]),
        small_device("cam1", vec![]),
    ])
    .unwrap();
    let (tx, _rx) = crossbeam_channel::unbounded();

    let cameras = launch(&mut module, &small_layout(1), &RigSettings::default(), tx).unwrap();
    assert_eq!(cameras.len(), 1);
    assert_eq!(cameras[0].serial(), "cam0");

    // The camera beyond the layout was never opened, so opening it now
    // still works.
    assert!(module.camera("cam1").is_ok());

    for camera in cameras {
        camera.shutdown();
    }
}
