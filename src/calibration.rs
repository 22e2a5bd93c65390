//! Static bias calibration
//!
//! The sensor must lie still on a level surface while this runs. Nothing here
//! can tell whether it does; a tilted board is calibrated as if it were level.

use std::sync::atomic::{AtomicBool, Ordering};

use log::{debug, info};

use crate::bus::RegisterBus;
use crate::device::ACCEL_COUNTS_PER_G;
use crate::error::{ImuError, Result};
use crate::offsets::OffsetStore;
use crate::sensors::RawSampleReader;
use crate::types::{Axes, OffsetSet};

pub const DEFAULT_SAMPLE_COUNT: u32 = 10_000;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CalibrationProcedure {
    sample_count: u32,
    one_g_counts: i32,
}

impl Default for CalibrationProcedure {
    fn default() -> Self {
        Self::new(DEFAULT_SAMPLE_COUNT)
    }
}

impl CalibrationProcedure {
    pub fn new(sample_count: u32) -> Self {
        Self {
            sample_count,
            one_g_counts: ACCEL_COUNTS_PER_G as i32,
        }
    }

    /// Counts that one g reads as on the accelerometer's Z axis
    pub fn with_one_g_counts(mut self, counts: i32) -> Self {
        self.one_g_counts = counts;
        self
    }

    pub fn sample_count(&self) -> u32 {
        self.sample_count
    }

    pub fn run<B: RegisterBus>(&self, reader: &mut RawSampleReader<B>) -> Result<OffsetSet> {
        self.run_with_progress(reader, |_, _| {})
    }

    /// Average `sample_count` uncorrected samples. `progress(done, total)` is
    /// called after every sample.
    pub fn run_with_progress<B, F>(
        &self,
        reader: &mut RawSampleReader<B>,
        progress: F,
    ) -> Result<OffsetSet>
    where
        B: RegisterBus,
        F: FnMut(u32, u32),
    {
        self.accumulate(reader, || false, progress)
    }

    /// Like [`run_with_progress`](Self::run_with_progress), but stops with
    /// [`ImuError::Cancelled`] once `running` is cleared. The flag is checked
    /// before every sample.
    pub fn run_until_cancelled<B, F>(
        &self,
        reader: &mut RawSampleReader<B>,
        running: &AtomicBool,
        progress: F,
    ) -> Result<OffsetSet>
    where
        B: RegisterBus,
        F: FnMut(u32, u32),
    {
        self.accumulate(reader, || !running.load(Ordering::Relaxed), progress)
    }

    fn accumulate<B, C, F>(
        &self,
        reader: &mut RawSampleReader<B>,
        cancelled: C,
        mut progress: F,
    ) -> Result<OffsetSet>
    where
        B: RegisterBus,
        C: Fn() -> bool,
        F: FnMut(u32, u32),
    {
        if self.sample_count == 0 {
            return Err(ImuError::InvalidSampleCount(self.sample_count));
        }
        info!("Calibrating over {} samples", self.sample_count);

        let mut accel = AxisSums::default();
        let mut gyro = AxisSums::default();
        for done in 1..=self.sample_count {
            if cancelled() {
                info!("Calibration cancelled after {} samples", done - 1);
                return Err(ImuError::Cancelled {
                    completed: done - 1,
                    total: self.sample_count,
                });
            }
            let sample = reader.read_raw()?;
            accel.add(sample.accel);
            gyro.add(sample.gyro);
            progress(done, self.sample_count);
        }

        let n = i64::from(self.sample_count);
        let mut accel_offset = accel.mean(n);
        accel_offset.z -= self.one_g_counts;
        let offsets = OffsetSet {
            accel_offset,
            gyro_offset: gyro.mean(n),
        };
        debug!("Calibration sums: accel {accel:?}, gyro {gyro:?}");
        info!(
            "Calibration done: accel {:?}, gyro {:?}",
            offsets.accel_offset, offsets.gyro_offset
        );
        Ok(offsets)
    }

    /// Run, then merge the result into `store`. A corrupt existing file is
    /// rewritten.
    pub fn calibrate_and_persist<B: RegisterBus>(
        &self,
        reader: &mut RawSampleReader<B>,
        store: &OffsetStore,
    ) -> Result<OffsetSet> {
        let offsets = self.run(reader)?;
        store.save_replacing_corrupt(&offsets)?;
        Ok(offsets)
    }
}

#[derive(Clone, Copy, Debug, Default)]
struct AxisSums {
    x: i64,
    y: i64,
    z: i64,
}

impl AxisSums {
    fn add(&mut self, axes: Axes) {
        self.x += i64::from(axes.x);
        self.y += i64::from(axes.y);
        self.z += i64::from(axes.z);
    }

    /// Integer mean, truncated toward zero
    fn mean(&self, n: i64) -> Axes {
        Axes::new(
            (self.x / n) as i32,
            (self.y / n) as i32,
            (self.z / n) as i32,
        )
    }
}
