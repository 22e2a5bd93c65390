//! Linear algebra type aliases for the per-axis angle filter
//!
//! Fixed-size nalgebra types keep the 2-state dimensions checked at compile time.

use nalgebra::{SMatrix, SVector};

// ===== State Dimensions =====
pub const ANGLE_STATE_DIM: usize = 2; // (angle, gyro bias)

// ===== Angle Filter Types =====
pub type AngleCovariance = SMatrix<f64, ANGLE_STATE_DIM, ANGLE_STATE_DIM>;
pub type AngleGain = SVector<f64, ANGLE_STATE_DIM>;
