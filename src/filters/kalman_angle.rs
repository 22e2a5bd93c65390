use log::warn;
use serde::{Deserialize, Serialize};

use crate::error::{ImuError, Result};
use crate::types::{AngleCovariance, AngleGain};

/// Noise tuning for one angle filter
///
/// Larger `r_measure` trusts the gyro-integrated prediction more; larger
/// `q_angle` / `q_bias` trust the accelerometer measurement more.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct FilterParameters {
    pub q_angle: f64,
    pub q_bias: f64,
    pub r_measure: f64,
}

impl Default for FilterParameters {
    fn default() -> Self {
        Self {
            q_angle: 0.001,
            q_bias: 0.003,
            r_measure: 0.03,
        }
    }
}

impl FilterParameters {
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [("q_angle", self.q_angle), ("q_bias", self.q_bias)] {
            if !value.is_finite() || value < 0.0 {
                return Err(ImuError::InvalidParameter(format!(
                    "{name} must be finite and non-negative (got {value})"
                )));
            }
        }
        // Zero R with zero P00 would divide by zero in the gain
        if !self.r_measure.is_finite() || self.r_measure <= 0.0 {
            return Err(ImuError::InvalidParameter(format!(
                "r_measure must be positive and finite (got {})",
                self.r_measure
            )));
        }
        Ok(())
    }
}

/// Snapshot of one axis: angle (deg), gyro bias (deg/s), last unbiased rate
/// (deg/s) and the (angle, bias) error covariance.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct KalmanState {
    pub angle: f64,
    pub bias: f64,
    pub rate: f64,
    pub p: AngleCovariance,
}

impl Default for KalmanState {
    fn default() -> Self {
        Self {
            angle: 0.0,
            bias: 0.0,
            rate: 0.0,
            p: AngleCovariance::zeros(),
        }
    }
}

/// Two-state (angle, gyro bias) Kalman filter for a single tilt axis.
///
/// The angle is propagated by integrating the bias-corrected gyro rate and
/// corrected by the accelerometer-derived angle. The bias follows a random walk.
#[derive(Clone, Debug)]
pub struct AngleKalmanFilter {
    state: KalmanState,
    params: FilterParameters,
}

impl AngleKalmanFilter {
    pub fn new(params: FilterParameters) -> Self {
        Self {
            state: KalmanState::default(),
            params,
        }
    }

    /// Start from a known angle instead of ramping up from zero
    pub fn with_angle(params: FilterParameters, angle: f64) -> Self {
        let mut filter = Self::new(params);
        filter.set_angle(angle);
        filter
    }

    /// Fuse one measurement. Returns the filtered angle in degrees.
    ///
    /// A non-positive (or non-finite) `dt` skips the cycle and returns the
    /// previous angle with the state untouched.
    pub fn update(&mut self, measured_angle: f64, gyro_rate: f64, dt: f64) -> f64 {
        self.try_update(measured_angle, gyro_rate, dt)
            .unwrap_or(self.state.angle)
    }

    /// Like [`update`](Self::update) but returns `None` for a skipped cycle.
    pub fn try_update(&mut self, measured_angle: f64, gyro_rate: f64, dt: f64) -> Option<f64> {
        if !(dt.is_finite() && dt > 0.0) {
            warn!("Skipping filter step: non-positive dt {dt:.6}s");
            return None;
        }
        self.predict(gyro_rate, dt);
        self.correct(measured_angle);
        Some(self.state.angle)
    }

    fn predict(&mut self, gyro_rate: f64, dt: f64) {
        let s = &mut self.state;
        s.rate = gyro_rate - s.bias;
        s.angle += dt * s.rate;

        // P = F P F' + Q dt with F = [[1, -dt], [0, 1]]
        let p = s.p;
        s.p = AngleCovariance::new(
            p[(0, 0)] + dt * (dt * p[(1, 1)] - p[(0, 1)] - p[(1, 0)] + self.params.q_angle),
            p[(0, 1)] - dt * p[(1, 1)],
            p[(1, 0)] - dt * p[(1, 1)],
            p[(1, 1)] + self.params.q_bias * dt,
        );
    }

    fn correct(&mut self, measured_angle: f64) {
        let s = &mut self.state;
        let innovation = measured_angle - s.angle;
        let innovation_cov = s.p[(0, 0)] + self.params.r_measure;
        let k = AngleGain::new(s.p[(0, 0)] / innovation_cov, s.p[(1, 0)] / innovation_cov);

        s.angle += k[0] * innovation;
        s.bias += k[1] * innovation;

        // Every term below reads the pre-update covariance
        let p = s.p;
        s.p = AngleCovariance::new(
            p[(0, 0)] - k[0] * p[(0, 0)],
            p[(0, 1)] - k[0] * p[(0, 1)],
            p[(1, 0)] - k[1] * p[(0, 0)],
            p[(1, 1)] - k[1] * p[(0, 1)],
        );
    }

    pub fn angle(&self) -> f64 {
        self.state.angle
    }

    pub fn bias(&self) -> f64 {
        self.state.bias
    }

    /// Bias-corrected rate from the last accepted step
    pub fn rate(&self) -> f64 {
        self.state.rate
    }

    pub fn covariance(&self) -> AngleCovariance {
        self.state.p
    }

    pub fn state(&self) -> KalmanState {
        self.state
    }

    pub fn parameters(&self) -> FilterParameters {
        self.params
    }

    pub fn set_angle(&mut self, angle: f64) {
        self.state.angle = angle;
    }

    pub fn set_q_angle(&mut self, q_angle: f64) {
        self.params.q_angle = q_angle;
    }

    pub fn set_q_bias(&mut self, q_bias: f64) {
        self.params.q_bias = q_bias;
    }

    pub fn set_r_measure(&mut self, r_measure: f64) {
        self.params.r_measure = r_measure;
    }
}

impl Default for AngleKalmanFilter {
    fn default() -> Self {
        Self::new(FilterParameters::default())
    }
}
