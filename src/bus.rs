//! Register bus capability
//!
//! The estimator only needs single-byte register reads and writes against one
//! device. [`RegisterBus`] is that capability; [`I2cRegisterBus`] provides it
//! on top of any `embedded-hal` I2C implementation.

use embedded_hal::i2c::{ErrorKind, I2c};
use thiserror::Error;

/// Default 7-bit address (AD0 pin low)
pub const DEFAULT_ADDRESS: u8 = 0x68;

/// Alternative 7-bit address (AD0 pin high)
pub const ALTERNATIVE_ADDRESS: u8 = 0x69;

/// Synchronous, blocking single-register access.
///
/// Implementations perform exactly one transfer per call; nothing above this
/// trait retries.
pub trait RegisterBus {
    type Error: std::error::Error + Send + Sync + 'static;

    fn read_register(&mut self, register: u8) -> Result<u8, Self::Error>;

    fn write_register(&mut self, register: u8, value: u8) -> Result<(), Self::Error>;
}

impl<B: RegisterBus + ?Sized> RegisterBus for &mut B {
    type Error = B::Error;

    fn read_register(&mut self, register: u8) -> Result<u8, Self::Error> {
        (**self).read_register(register)
    }

    fn write_register(&mut self, register: u8, value: u8) -> Result<(), Self::Error> {
        (**self).write_register(register, value)
    }
}

/// Transport failure reported by an `embedded-hal` I2C peripheral.
///
/// HAL error types only guarantee `Debug`, so the detail is captured as text.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("I2C {kind:?} at address 0x{address:02X}: {detail}")]
pub struct I2cFault {
    pub address: u8,
    pub kind: ErrorKind,
    pub detail: String,
}

/// I2C-backed register bus for a device at a fixed 7-bit address
pub struct I2cRegisterBus<I2C> {
    i2c: I2C,
    address: u8,
}

impl<I2C> I2cRegisterBus<I2C> {
    /// Create a bus for a device at a custom address
    pub const fn new(i2c: I2C, address: u8) -> Self {
        Self { i2c, address }
    }

    /// Create a bus for a device at [`DEFAULT_ADDRESS`]
    pub const fn default_address(i2c: I2C) -> Self {
        Self::new(i2c, DEFAULT_ADDRESS)
    }

    pub fn address(&self) -> u8 {
        self.address
    }

    /// Consume the bus and return the I2C peripheral
    pub fn release(self) -> I2C {
        self.i2c
    }

    fn fault<E: embedded_hal::i2c::Error>(&self, err: E) -> I2cFault {
        I2cFault {
            address: self.address,
            kind: err.kind(),
            detail: format!("{err:?}"),
        }
    }
}

impl<I2C: I2c> RegisterBus for I2cRegisterBus<I2C> {
    type Error = I2cFault;

    fn read_register(&mut self, register: u8) -> Result<u8, Self::Error> {
        let mut buf = [0u8; 1];
        self.i2c
            .write_read(self.address, &[register], &mut buf)
            .map_err(|e| self.fault(e))?;
        Ok(buf[0])
    }

    fn write_register(&mut self, register: u8, value: u8) -> Result<(), Self::Error> {
        self.i2c
            .write(self.address, &[register, value])
            .map_err(|e| self.fault(e))
    }
}
