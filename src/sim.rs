//! In-memory register bus
//!
//! Stands in for the real device in tests and in the CLI's `--simulate` mode.
//! Clones share state, so a test can keep a handle while the reader owns the bus.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use thiserror::Error;

use crate::bus::RegisterBus;
use crate::device::{ACCEL_COUNTS_PER_G, ACCEL_XOUT_H, GYRO_XOUT_H};
use crate::types::{Axes, RawSample};

/// Records operations performed on the simulated bus
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BusOperation {
    Read { register: u8, value: u8 },
    Write { register: u8, value: u8 },
    FailedRead { register: u8 },
    FailedWrite { register: u8 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Read,
    Write,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("simulated {access:?} failure at register 0x{register:02X}")]
pub struct SimulatedFault {
    pub register: u8,
    pub access: Access,
}

#[derive(Debug, Default)]
struct SimState {
    registers: HashMap<u8, u8>,
    /// Only filled while `recording` is set
    operations: Vec<BusOperation>,
    recording: bool,
    /// One-shot read failures keyed by register
    fail_reads: HashSet<u8>,
    fail_next_write: bool,
    /// Samples loaded into the data registers each time ACCEL_XOUT_H is read
    sequence: Vec<RawSample>,
    sequence_idx: usize,
}

impl SimState {
    fn record(&mut self, op: BusOperation) {
        if self.recording {
            self.operations.push(op);
        }
    }

    fn store_axes(&mut self, base: u8, axes: Axes) {
        for (i, value) in [axes.x, axes.y, axes.z].into_iter().enumerate() {
            let clamped = value.clamp(i16::MIN as i32, i16::MAX as i32) as i16;
            let [high, low] = clamped.to_be_bytes();
            let register = base + 2 * i as u8;
            self.registers.insert(register, high);
            self.registers.insert(register + 1, low);
        }
    }

    fn advance_sequence(&mut self) {
        if self.sequence.is_empty() {
            return;
        }
        let sample = self.sequence[self.sequence_idx];
        self.store_axes(ACCEL_XOUT_H, sample.accel);
        self.store_axes(GYRO_XOUT_H, sample.gyro);
        self.sequence_idx = (self.sequence_idx + 1) % self.sequence.len();
    }
}

#[derive(Debug, Clone, Default)]
pub struct SimulatedBus {
    state: Rc<RefCell<SimState>>,
}

impl SimulatedBus {
    /// All registers read as zero
    pub fn new() -> Self {
        Self::default()
    }

    /// A stationary sensor lying level: 1 g on Z, no rotation
    pub fn level() -> Self {
        let bus = Self::new();
        bus.set_accel(Axes::new(0, 0, ACCEL_COUNTS_PER_G as i32));
        bus
    }

    pub fn set_accel(&self, accel: Axes) {
        self.state.borrow_mut().store_axes(ACCEL_XOUT_H, accel);
    }

    pub fn set_gyro(&self, gyro: Axes) {
        self.state.borrow_mut().store_axes(GYRO_XOUT_H, gyro);
    }

    pub fn set_register(&self, register: u8, value: u8) {
        self.state.borrow_mut().registers.insert(register, value);
    }

    pub fn register(&self, register: u8) -> u8 {
        self.state
            .borrow()
            .registers
            .get(&register)
            .copied()
            .unwrap_or(0)
    }

    /// Replay `samples` cyclically, one per sample read
    pub fn set_sequence(&self, samples: Vec<RawSample>) {
        let mut state = self.state.borrow_mut();
        state.sequence = samples;
        state.sequence_idx = 0;
    }

    /// Fail the next read of `register`
    pub fn fail_read_at(&self, register: u8) {
        self.state.borrow_mut().fail_reads.insert(register);
    }

    pub fn fail_next_write(&self) {
        self.state.borrow_mut().fail_next_write = true;
    }

    /// All registers zero, with every access logged to [`operations`](Self::operations)
    pub fn recording() -> Self {
        let bus = Self::new();
        bus.record_operations(true);
        bus
    }

    /// Start or stop logging accesses. Off by default so long-running
    /// simulations stay bounded.
    pub fn record_operations(&self, enabled: bool) {
        self.state.borrow_mut().recording = enabled;
    }

    pub fn operations(&self) -> Vec<BusOperation> {
        self.state.borrow().operations.clone()
    }

    pub fn clear_operations(&self) {
        self.state.borrow_mut().operations.clear();
    }
}

impl RegisterBus for SimulatedBus {
    type Error = SimulatedFault;

    fn read_register(&mut self, register: u8) -> Result<u8, Self::Error> {
        let mut state = self.state.borrow_mut();
        if state.fail_reads.remove(&register) {
            state.record(BusOperation::FailedRead { register });
            return Err(SimulatedFault {
                register,
                access: Access::Read,
            });
        }
        if register == ACCEL_XOUT_H {
            state.advance_sequence();
        }
        let value = state.registers.get(&register).copied().unwrap_or(0);
        state.record(BusOperation::Read { register, value });
        Ok(value)
    }

    fn write_register(&mut self, register: u8, value: u8) -> Result<(), Self::Error> {
        let mut state = self.state.borrow_mut();
        if state.fail_next_write {
            state.fail_next_write = false;
            state.record(BusOperation::FailedWrite { register });
            return Err(SimulatedFault {
                register,
                access: Access::Write,
            });
        }
        state.registers.insert(register, value);
        state.record(BusOperation::Write { register, value });
        Ok(())
    }
}
