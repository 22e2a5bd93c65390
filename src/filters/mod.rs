//! Tilt estimation filters
//!
//! `tilt` turns one accelerometer vector into an instantaneous roll/pitch;
//! `kalman_angle` fuses that measurement with the gyro rate per axis.

pub mod kalman_angle;
pub mod tilt;

pub use kalman_angle::{AngleKalmanFilter, FilterParameters, KalmanState};
pub use tilt::AccelTilt;
