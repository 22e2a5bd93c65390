use log::info;

use crate::bus::RegisterBus;
use crate::device::{DeviceConfig, ACCEL_XOUT_H, GYRO_XOUT_H};
use crate::error::{ImuError, Result};
use crate::types::{Axes, OffsetSet, RawSample};

/// Decode a big-endian register pair as a two's-complement 16-bit value
pub fn decode_word(high: u8, low: u8) -> i16 {
    let value = ((high as u16) << 8) | low as u16;
    value as i16
}

/// Reads six-axis samples from the device.
///
/// Owns the bus exclusively so the twelve register reads of one sample can't
/// be interleaved with another consumer's traffic.
pub struct RawSampleReader<B> {
    bus: B,
}

impl<B: RegisterBus> RawSampleReader<B> {
    /// Wrap a bus whose device has already been configured
    pub fn new(bus: B) -> Self {
        Self { bus }
    }

    /// Issue the configuration sequence, then return a reader
    pub fn initialize(bus: B, config: &DeviceConfig) -> Result<Self> {
        let mut reader = Self::new(bus);
        reader.configure(config)?;
        Ok(reader)
    }

    pub fn configure(&mut self, config: &DeviceConfig) -> Result<()> {
        for (register, value) in config.write_sequence() {
            self.bus
                .write_register(register, value)
                .map_err(|e| ImuError::bus(register, e))?;
        }
        info!(
            "IMU configured: gyro {:?}, DLPF 0x{:02X}, {:.0} Hz",
            config.gyro_range,
            config.dlpf,
            config.sample_rate_hz()
        );
        Ok(())
    }

    /// Read one sample and subtract `offsets`. A failed register read aborts
    /// the sample; nothing is retried.
    pub fn read(&mut self, offsets: &OffsetSet) -> Result<RawSample> {
        let accel = self.read_axes(ACCEL_XOUT_H)?;
        let gyro = self.read_axes(GYRO_XOUT_H)?;
        Ok(RawSample {
            accel: accel - offsets.accel_offset,
            gyro: gyro - offsets.gyro_offset,
        })
    }

    /// Read one uncorrected sample
    pub fn read_raw(&mut self) -> Result<RawSample> {
        self.read(&OffsetSet::zero())
    }

    pub fn bus_mut(&mut self) -> &mut B {
        &mut self.bus
    }

    /// Consume the reader and return the bus
    pub fn release(self) -> B {
        self.bus
    }

    fn read_axes(&mut self, base: u8) -> Result<Axes> {
        Ok(Axes::new(
            self.read_word(base)? as i32,
            self.read_word(base + 2)? as i32,
            self.read_word(base + 4)? as i32,
        ))
    }

    fn read_word(&mut self, register: u8) -> Result<i16> {
        let high = self
            .bus
            .read_register(register)
            .map_err(|e| ImuError::bus(register, e))?;
        let low = self
            .bus
            .read_register(register + 1)
            .map_err(|e| ImuError::bus(register + 1, e))?;
        Ok(decode_word(high, low))
    }
}
