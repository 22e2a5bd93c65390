//! Register map and power-on configuration for the 6-axis IMU (MPU-6050 family)

use serde::{Deserialize, Serialize};

// ===== Configuration Registers =====
pub const SMPLRT_DIV: u8 = 0x19;
pub const CONFIG: u8 = 0x1A;
pub const GYRO_CONFIG: u8 = 0x1B;
pub const PWR_MGMT_1: u8 = 0x6B;

// ===== Data Registers (high byte; low byte follows at +1) =====
pub const ACCEL_XOUT_H: u8 = 0x3B;
pub const GYRO_XOUT_H: u8 = 0x43;

/// Counts per g at the power-on accelerometer range (±2 g)
pub const ACCEL_COUNTS_PER_G: f64 = 16384.0;

/// Gyroscope full-scale range (FS_SEL bits of GYRO_CONFIG)
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum GyroRange {
    #[default]
    Dps250,
    Dps500,
    Dps1000,
    Dps2000,
}

impl GyroRange {
    /// Range from its full-scale value in °/s
    pub const fn from_dps(dps: u16) -> Option<Self> {
        match dps {
            250 => Some(GyroRange::Dps250),
            500 => Some(GyroRange::Dps500),
            1000 => Some(GyroRange::Dps1000),
            2000 => Some(GyroRange::Dps2000),
            _ => None,
        }
    }

    /// GYRO_CONFIG register value (FS_SEL in bits 4:3)
    pub const fn register_value(self) -> u8 {
        match self {
            GyroRange::Dps250 => 0x00,
            GyroRange::Dps500 => 0x08,
            GyroRange::Dps1000 => 0x10,
            GyroRange::Dps2000 => 0x18,
        }
    }

    /// Sensitivity in counts per °/s
    pub const fn counts_per_dps(self) -> f64 {
        match self {
            GyroRange::Dps250 => 131.0,
            GyroRange::Dps500 => 65.5,
            GyroRange::Dps1000 => 32.8,
            GyroRange::Dps2000 => 16.4,
        }
    }
}

/// One-time configuration sequence written before any sample is read
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// PWR_MGMT_1: wake up, clock source = gyro X PLL
    pub power_management: u8,
    /// CONFIG: digital low-pass filter setting
    pub dlpf: u8,
    pub gyro_range: GyroRange,
    /// SMPLRT_DIV: sample rate = 1 kHz / (1 + divider) with the DLPF enabled
    pub sample_rate_divider: u8,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            power_management: 0x01,
            dlpf: 0x02,
            gyro_range: GyroRange::Dps250,
            sample_rate_divider: 0x04, // 200 Hz
        }
    }
}

impl DeviceConfig {
    /// Register writes in the order they must be issued
    pub fn write_sequence(&self) -> [(u8, u8); 4] {
        [
            (PWR_MGMT_1, self.power_management),
            (CONFIG, self.dlpf),
            (GYRO_CONFIG, self.gyro_range.register_value()),
            (SMPLRT_DIV, self.sample_rate_divider),
        ]
    }

    /// Output data rate in Hz, assuming the DLPF is enabled (1 kHz base)
    pub fn sample_rate_hz(&self) -> f64 {
        1000.0 / (1.0 + self.sample_rate_divider as f64)
    }
}
