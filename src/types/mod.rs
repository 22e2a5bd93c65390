pub mod linalg;

pub use linalg::*;

use serde::{Deserialize, Serialize};

use crate::device::{GyroRange, ACCEL_COUNTS_PER_G};
use crate::error::{ImuError, Result};

/// Integer triple for one sensor (x, y, z) in raw counts
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Axes {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl Axes {
    pub const ZERO: Axes = Axes { x: 0, y: 0, z: 0 };

    pub const fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    pub fn scaled(&self, counts_per_unit: f64) -> [f64; 3] {
        [
            self.x as f64 / counts_per_unit,
            self.y as f64 / counts_per_unit,
            self.z as f64 / counts_per_unit,
        ]
    }
}

impl std::ops::Sub for Axes {
    type Output = Axes;

    /// Saturates at the i32 bounds
    fn sub(self, rhs: Axes) -> Axes {
        Axes::new(
            self.x.saturating_sub(rhs.x),
            self.y.saturating_sub(rhs.y),
            self.z.saturating_sub(rhs.z),
        )
    }
}

/// One offset-corrected reading of all six channels
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawSample {
    pub accel: Axes,
    pub gyro: Axes,
}

impl RawSample {
    /// Acceleration in g
    pub fn accel_g(&self, scales: &ScaleFactors) -> [f64; 3] {
        self.accel.scaled(scales.accel_counts_per_g)
    }

    /// Angular rate in °/s
    pub fn gyro_dps(&self, scales: &ScaleFactors) -> [f64; 3] {
        self.gyro.scaled(scales.gyro_counts_per_dps)
    }
}

/// Per-axis additive corrections, subtracted from every raw reading
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OffsetSet {
    pub accel_offset: Axes,
    pub gyro_offset: Axes,
}

impl OffsetSet {
    pub const fn zero() -> Self {
        Self {
            accel_offset: Axes::ZERO,
            gyro_offset: Axes::ZERO,
        }
    }
}

/// Filtered tilt in degrees
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AttitudeOutput {
    pub roll_deg: f64,
    pub pitch_deg: f64,
}

/// Sensitivity divisors for the configured full-scale ranges
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ScaleFactors {
    pub accel_counts_per_g: f64,
    pub gyro_counts_per_dps: f64,
}

impl ScaleFactors {
    pub fn for_gyro_range(range: GyroRange) -> Self {
        Self {
            accel_counts_per_g: ACCEL_COUNTS_PER_G,
            gyro_counts_per_dps: range.counts_per_dps(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("accel_counts_per_g", self.accel_counts_per_g),
            ("gyro_counts_per_dps", self.gyro_counts_per_dps),
        ] {
            if !value.is_finite() || value <= 0.0 {
                return Err(ImuError::InvalidParameter(format!(
                    "{name} must be positive and finite (got {value})"
                )));
            }
        }
        Ok(())
    }
}

impl Default for ScaleFactors {
    fn default() -> Self {
        Self::for_gyro_range(GyroRange::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_axes_subtraction() {
        let raw = Axes::new(100, -50, 16500);
        let offset = Axes::new(20, -10, 116);
        assert_eq!(raw - offset, Axes::new(80, -40, 16384));
    }

    #[test]
    fn test_axes_subtraction_saturates() {
        let raw = Axes::new(5, -5, 0);
        let offset = Axes::new(i32::MIN, i32::MAX, 0);
        assert_eq!(raw - offset, Axes::new(i32::MAX, i32::MIN, 0));
    }

    #[test]
    fn test_sample_scaling() {
        let sample = RawSample {
            accel: Axes::new(0, 8192, 16384),
            gyro: Axes::new(131, -262, 0),
        };
        let scales = ScaleFactors::default();
        assert_eq!(sample.accel_g(&scales), [0.0, 0.5, 1.0]);
        assert_eq!(sample.gyro_dps(&scales), [1.0, -2.0, 0.0]);
    }

    #[test]
    fn test_scale_validation() {
        assert!(ScaleFactors::default().validate().is_ok());

        let bad = ScaleFactors {
            accel_counts_per_g: 0.0,
            gyro_counts_per_dps: 131.0,
        };
        assert!(matches!(bad.validate(), Err(ImuError::InvalidParameter(_))));

        let nan = ScaleFactors {
            accel_counts_per_g: 16384.0,
            gyro_counts_per_dps: f64::NAN,
        };
        assert!(nan.validate().is_err());
    }
}
