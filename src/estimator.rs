use std::time::Instant;

use log::info;
use serde::{Deserialize, Serialize};

use crate::bus::RegisterBus;
use crate::device::{DeviceConfig, GyroRange};
use crate::error::Result;
use crate::filters::tilt;
use crate::filters::{AngleKalmanFilter, FilterParameters};
use crate::sensors::RawSampleReader;
use crate::types::{AttitudeOutput, OffsetSet, RawSample, ScaleFactors};

/// Everything the estimator needs, passed explicitly at construction
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct EstimatorConfig {
    pub device: DeviceConfig,
    pub scales: ScaleFactors,
    pub filter: FilterParameters,
}

impl EstimatorConfig {
    /// Select a gyro range, keeping register value and sensitivity in step
    pub fn with_gyro_range(mut self, range: GyroRange) -> Self {
        self.device.gyro_range = range;
        self.scales.gyro_counts_per_dps = range.counts_per_dps();
        self
    }

    pub fn with_filter(mut self, filter: FilterParameters) -> Self {
        self.filter = filter;
        self
    }

    pub fn validate(&self) -> Result<()> {
        self.scales.validate()?;
        self.filter.validate()
    }
}

/// Fused roll/pitch estimator.
///
/// Each [`step`](Self::step) reads one sample, derives the accelerometer tilt
/// and runs one Kalman update per axis (roll with gyro X, pitch with gyro Y)
/// using the wall-clock time since the previous step.
pub struct AttitudeEstimator<B> {
    reader: RawSampleReader<B>,
    offsets: OffsetSet,
    config: EstimatorConfig,
    roll: AngleKalmanFilter,
    pitch: AngleKalmanFilter,
    attitude: AttitudeOutput,
    last_sample: RawSample,
    last_instant: Instant,
}

impl<B: RegisterBus> AttitudeEstimator<B> {
    /// Configure the device over `bus`, then seed the filters from one sample
    pub fn new(bus: B, offsets: OffsetSet, config: EstimatorConfig) -> Result<Self> {
        config.validate()?;
        let reader = RawSampleReader::initialize(bus, &config.device)?;
        Self::from_reader(reader, offsets, config)
    }

    /// Seed the filters from one sample read through an already-configured reader.
    ///
    /// The initial angles are accelerometer-only; an axis that is degenerate on
    /// this first sample starts at 0.
    pub fn from_reader(
        mut reader: RawSampleReader<B>,
        offsets: OffsetSet,
        config: EstimatorConfig,
    ) -> Result<Self> {
        config.validate()?;
        let sample = reader.read(&offsets)?;
        let initial = tilt::estimate(
            sample.accel,
            config.scales.accel_counts_per_g,
            AttitudeOutput::default(),
        );
        info!(
            "Attitude estimator seeded at roll {:.2}°, pitch {:.2}°",
            initial.roll_deg, initial.pitch_deg
        );

        Ok(Self {
            reader,
            offsets,
            config,
            roll: AngleKalmanFilter::with_angle(config.filter, initial.roll_deg),
            pitch: AngleKalmanFilter::with_angle(config.filter, initial.pitch_deg),
            attitude: initial,
            last_sample: sample,
            last_instant: Instant::now(),
        })
    }

    /// Run one cycle timed by the monotonic clock
    pub fn step(&mut self) -> Result<AttitudeOutput> {
        self.step_at(Instant::now())
    }

    /// Run one cycle as if it happened at `now`.
    ///
    /// A `now` earlier than the previous step gives a negative dt, which the
    /// filters reject. If the sample read fails, the previous timestamp is
    /// kept so the next successful cycle integrates over the whole gap.
    pub fn step_at(&mut self, now: Instant) -> Result<AttitudeOutput> {
        let dt = signed_seconds_between(self.last_instant, now);
        let sample = self.reader.read(&self.offsets)?;
        self.last_instant = now;
        self.last_sample = sample;

        let measured = tilt::estimate(
            sample.accel,
            self.config.scales.accel_counts_per_g,
            self.attitude,
        );
        let [gx, gy, _] = sample.gyro_dps(&self.config.scales);

        self.attitude = AttitudeOutput {
            roll_deg: self.roll.update(measured.roll_deg, gx, dt),
            pitch_deg: self.pitch.update(measured.pitch_deg, gy, dt),
        };
        Ok(self.attitude)
    }

    /// Output of the most recent step (or the seed angles before the first step)
    pub fn attitude(&self) -> AttitudeOutput {
        self.attitude
    }

    pub fn last_sample(&self) -> RawSample {
        self.last_sample
    }

    pub fn last_instant(&self) -> Instant {
        self.last_instant
    }

    /// Bias-corrected roll rate from the last step, in °/s
    pub fn roll_rate_dps(&self) -> f64 {
        self.roll.rate()
    }

    /// Bias-corrected pitch rate from the last step, in °/s
    pub fn pitch_rate_dps(&self) -> f64 {
        self.pitch.rate()
    }

    pub fn roll_filter(&self) -> &AngleKalmanFilter {
        &self.roll
    }

    pub fn pitch_filter(&self) -> &AngleKalmanFilter {
        &self.pitch
    }

    pub fn offsets(&self) -> &OffsetSet {
        &self.offsets
    }

    pub fn config(&self) -> &EstimatorConfig {
        &self.config
    }

    /// Give back the reader (and with it, the bus)
    pub fn into_reader(self) -> RawSampleReader<B> {
        self.reader
    }
}

fn signed_seconds_between(earlier: Instant, later: Instant) -> f64 {
    match later.checked_duration_since(earlier) {
        Some(elapsed) => elapsed.as_secs_f64(),
        None => -earlier.duration_since(later).as_secs_f64(),
    }
}
