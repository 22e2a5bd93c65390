//! Integration tests for the calibrate-then-track workflow

use std::time::Duration;

use approx::assert_abs_diff_eq;
use tempfile::TempDir;
use tilt_tracker_rs::sim::BusOperation;
use tilt_tracker_rs::{
    AttitudeEstimator, Axes, CalibrationProcedure, DeviceConfig, EstimatorConfig, ImuError,
    OffsetLoad, OffsetSet, OffsetStore, RawSample, RawSampleReader, SimulatedBus,
};

/// Level sensor with a fixed bias on every channel
fn biased_level_bus() -> SimulatedBus {
    let bus = SimulatedBus::new();
    bus.set_accel(Axes::new(-210, 145, 16384 + 320));
    bus.set_gyro(Axes::new(87, -33, 12));
    bus
}

#[test]
fn test_calibrate_persist_and_track_level() {
    let dir = TempDir::new().unwrap();
    let store = OffsetStore::new(dir.path().join("setup.json"));
    assert!(store.load().unwrap().is_absent());

    // Calibrate on a configured device
    let bus = biased_level_bus();
    let mut reader = RawSampleReader::initialize(bus.clone(), &DeviceConfig::default()).unwrap();
    let offsets = CalibrationProcedure::new(500)
        .calibrate_and_persist(&mut reader, &store)
        .unwrap();
    assert_eq!(offsets.accel_offset, Axes::new(-210, 145, 320));
    assert_eq!(offsets.gyro_offset, Axes::new(87, -33, 12));

    // A later session loads them back and tracks a level, still sensor
    let loaded = match store.load().unwrap() {
        OffsetLoad::Loaded(offsets) => offsets,
        OffsetLoad::Absent => panic!("offsets were not persisted"),
    };
    assert_eq!(loaded, offsets);

    let mut estimator = AttitudeEstimator::new(bus, loaded, EstimatorConfig::default()).unwrap();
    let start = estimator.last_instant();
    for i in 1..=100u32 {
        estimator
            .step_at(start + Duration::from_millis(10) * i)
            .unwrap();
    }
    let out = estimator.attitude();
    assert_abs_diff_eq!(out.roll_deg, 0.0, epsilon = 1e-3);
    assert_abs_diff_eq!(out.pitch_deg, 0.0, epsilon = 1e-3);
    assert_abs_diff_eq!(estimator.roll_filter().bias(), 0.0, epsilon = 1e-6);
}

#[test]
fn test_uncalibrated_bias_tilts_the_estimate() {
    let mut estimator =
        AttitudeEstimator::new(biased_level_bus(), OffsetSet::zero(), EstimatorConfig::default())
            .unwrap();
    let start = estimator.last_instant();
    for i in 1..=100u32 {
        estimator
            .step_at(start + Duration::from_millis(10) * i)
            .unwrap();
    }
    // 145 counts on Y against ~1 g on Z is about half a degree of roll
    assert!(estimator.attitude().roll_deg > 0.3);
}

#[test]
fn test_tracks_a_step_change_in_tilt() {
    let bus = SimulatedBus::level();
    let handle = bus.clone();
    let mut estimator =
        AttitudeEstimator::new(bus, OffsetSet::zero(), EstimatorConfig::default()).unwrap();
    let start = estimator.last_instant();

    // Board now rests at 30° roll; the gyro saw nothing (instantaneous change)
    let angle = 30f64.to_radians();
    handle.set_accel(Axes::new(
        0,
        (16384.0 * angle.sin()).round() as i32,
        (16384.0 * angle.cos()).round() as i32,
    ));
    let mut last = 0.0;
    for i in 1..=1000u32 {
        let out = estimator
            .step_at(start + Duration::from_millis(10) * i)
            .unwrap();
        assert!(out.roll_deg.is_finite());
        last = out.roll_deg;
    }
    assert_abs_diff_eq!(last, 30.0, epsilon = 0.05);
    assert_abs_diff_eq!(estimator.pitch_filter().angle(), 0.0, epsilon = 1e-9);
}

#[test]
fn test_replayed_sequence_drives_roll_through_gyro() {
    // Rotation about X at 10 °/s for one second with matching accelerometer tilt
    let samples: Vec<RawSample> = (0..=100)
        .map(|i| {
            let angle = (i as f64 * 0.1).to_radians();
            RawSample {
                accel: Axes::new(
                    0,
                    (16384.0 * angle.sin()).round() as i32,
                    (16384.0 * angle.cos()).round() as i32,
                ),
                gyro: Axes::new(1310, 0, 0),
            }
        })
        .collect();
    let bus = SimulatedBus::new();
    bus.set_sequence(samples);

    let mut estimator =
        AttitudeEstimator::new(bus, OffsetSet::zero(), EstimatorConfig::default()).unwrap();
    let start = estimator.last_instant();
    for i in 1..=100u32 {
        estimator
            .step_at(start + Duration::from_millis(10) * i)
            .unwrap();
    }
    assert_abs_diff_eq!(estimator.attitude().roll_deg, 10.0, epsilon = 0.2);
    assert_abs_diff_eq!(estimator.roll_rate_dps(), 10.0, epsilon = 0.5);
}

#[test]
fn test_configuration_write_failure_surfaces_as_bus_error() {
    let bus = SimulatedBus::level();
    bus.record_operations(true);
    bus.fail_next_write();
    let handle = bus.clone();

    let err = AttitudeEstimator::new(bus, OffsetSet::zero(), EstimatorConfig::default())
        .err()
        .unwrap();
    assert!(matches!(err, ImuError::Bus { register: 0x6B, .. }));
    assert_eq!(
        handle.operations(),
        vec![BusOperation::FailedWrite { register: 0x6B }]
    );
}

#[test]
fn test_corrupt_offsets_file_requires_recalibration() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("setup.json");
    std::fs::write(&path, r#"{"ACCELERATION_X_OFFSET": "twelve", "SERVO_TRIM": 4}"#).unwrap();
    let store = OffsetStore::new(&path);

    let err = store.load().unwrap_err();
    assert!(err.to_string().contains("re-run calibration"));

    // The file is a valid object, so calibration merges and keeps SERVO_TRIM
    let mut reader = RawSampleReader::new(SimulatedBus::level());
    CalibrationProcedure::new(10)
        .calibrate_and_persist(&mut reader, &store)
        .unwrap();
    assert_eq!(store.load().unwrap().into_offsets(), OffsetSet::zero());

    let doc: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(doc["SERVO_TRIM"], 4);
}

#[test]
fn test_extreme_offsets_never_reach_the_estimator() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("setup.json");
    std::fs::write(&path, r#"{"GYROSCOPE_Z_OFFSET": -2147483648}"#).unwrap();
    let err = OffsetStore::new(&path).load().unwrap_err();
    assert!(matches!(err, ImuError::ConfigLoad { .. }));

    // Offsets built in code bypass the store; correction saturates instead
    let bus = SimulatedBus::level();
    bus.set_gyro(Axes::new(0, 0, 5));
    let offsets = OffsetSet {
        accel_offset: Axes::ZERO,
        gyro_offset: Axes::new(0, 0, i32::MIN),
    };
    let mut estimator = AttitudeEstimator::new(bus, offsets, EstimatorConfig::default()).unwrap();
    assert_eq!(estimator.last_sample().gyro.z, i32::MAX);
    let start = estimator.last_instant();
    let out = estimator.step_at(start + Duration::from_millis(10)).unwrap();
    assert!(out.roll_deg.is_finite() && out.pitch_deg.is_finite());
}
