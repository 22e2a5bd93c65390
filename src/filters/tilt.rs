use log::debug;
use serde::{Deserialize, Serialize};

use crate::types::{AttitudeOutput, Axes};

/// Instantaneous tilt from the gravity vector.
///
/// An axis is `None` when its denominator is zero (acceleration entirely in
/// the horizontal plane). The caller substitutes its previous filtered angle
/// so a singular reading never injects a jump into the fused estimate.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AccelTilt {
    pub roll_deg: Option<f64>,
    pub pitch_deg: Option<f64>,
}

impl AccelTilt {
    /// Tilt from raw counts and the accelerometer sensitivity (counts per g)
    pub fn from_counts(accel: Axes, counts_per_g: f64) -> Self {
        let [ax, ay, az] = accel.scaled(counts_per_g);
        Self::from_g(ax, ay, az)
    }

    pub fn from_g(ax: f64, ay: f64, az: f64) -> Self {
        let roll_deg = if az != 0.0 {
            Some(ay.atan2(az).to_degrees())
        } else {
            None
        };

        let horizontal = (ay * ay + az * az).sqrt();
        let pitch_deg = if horizontal != 0.0 {
            Some((-ax).atan2(horizontal).to_degrees())
        } else {
            None
        };

        Self {
            roll_deg,
            pitch_deg,
        }
    }

    pub fn is_degenerate(&self) -> bool {
        self.roll_deg.is_none() || self.pitch_deg.is_none()
    }

    /// Resolve missing axes from `previous`
    pub fn or(self, previous: AttitudeOutput) -> AttitudeOutput {
        if self.is_degenerate() {
            debug!(
                "Degenerate accelerometer geometry (roll {:?}, pitch {:?}); holding previous angle",
                self.roll_deg, self.pitch_deg
            );
        }
        AttitudeOutput {
            roll_deg: self.roll_deg.unwrap_or(previous.roll_deg),
            pitch_deg: self.pitch_deg.unwrap_or(previous.pitch_deg),
        }
    }
}

/// Accelerometer-only roll/pitch with `previous` as the degenerate-case fallback
pub fn estimate(accel: Axes, counts_per_g: f64, previous: AttitudeOutput) -> AttitudeOutput {
    AccelTilt::from_counts(accel, counts_per_g).or(previous)
}
