//! Roll/pitch estimation for MPU-6050-family six-axis IMUs.
//!
//! [`AttitudeEstimator`] fuses accelerometer tilt with gyro rate through one
//! two-state Kalman filter per axis. [`CalibrationProcedure`] measures static
//! bias and [`OffsetStore`] persists it between runs.

pub mod bus;
pub mod calibration;
pub mod device;
pub mod error;
pub mod estimator;
pub mod filters;
pub mod offsets;
pub mod sensors;
pub mod sim;
pub mod types;

pub use bus::{I2cRegisterBus, RegisterBus};
pub use calibration::CalibrationProcedure;
pub use device::{DeviceConfig, GyroRange};
pub use error::{ImuError, Result};
pub use estimator::{AttitudeEstimator, EstimatorConfig};
pub use filters::{AccelTilt, AngleKalmanFilter, FilterParameters, KalmanState};
pub use offsets::{OffsetLoad, OffsetStore};
pub use sensors::RawSampleReader;
pub use sim::SimulatedBus;
pub use types::{AttitudeOutput, Axes, OffsetSet, RawSample, ScaleFactors};
