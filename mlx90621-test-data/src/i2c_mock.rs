// SPDX-License-Identifier: Apache-2.0
// Copyright © 2021 Will Ross
use std::cell::{Ref, RefCell};
use std::collections::VecDeque;
use std::fmt;
use std::rc::Rc;

use embedded_hal::blocking::i2c;

use crate::eeprom_data::EEPROM_LENGTH;

/// The sensor has 256 16-bit words of RAM, addressed 0x00 through 0xFF.
pub const RAM_WORDS: usize = 0x100;

const NUM_PIXELS: usize = 64;

const READ_COMMAND: u8 = 0x02;
const WRITE_CONFIG_COMMAND: u8 = 0x03;
const WRITE_TRIM_COMMAND: u8 = 0x04;

const PTAT_ADDRESS: usize = 0x40;
const COMPENSATION_PIXEL_ADDRESS: usize = 0x41;
const CONFIG_ADDRESS: usize = 0x92;
const TRIM_ADDRESS: usize = 0x93;

const CONFIG_CHECK_OFFSET: u8 = 0x55;
const TRIM_CHECK_OFFSET: u8 = 0xAA;

/// The POR flag, in the upper byte of the configuration register.
const POR_FLAG: u16 = 0x0400;

/// The configuration register just after power on: 1Hz, 18-bit resolution, and the POR flag
/// cleared.
const POWER_ON_CONFIG: u16 = 0x423E;

const RECENT_OPERATIONS_QUEUE_LENGTH: usize = 32;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum MockError {
    /// An unknown I2C address was given.
    UnknownI2cAddress(u8),

    /// The check bytes in a write don't match the data.
    BadChecksum([u8; 5]),

    /// Something was asked to read past the end of memory.
    IllegalAccess(usize),

    /// The IR read was set up to fail.
    IrReadFailure,

    /// A single write-read was set up to fail.
    InjectedFailure,

    /// The requested operation is not allowed.
    ///
    /// This covers things like:
    /// * Writes that aren't exactly a command and two byte pairs.
    /// * Reads with a command other than the read command.
    /// * Reads where the buffer size doesn't match the number of words requested.
    IllegalOperation,
}

impl fmt::Display for MockError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

impl std::error::Error for MockError {}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum I2cOperation {
    /// A write-read. `command` is the write portion, padded with zeros.
    Read {
        i2c_address: u8,
        command: [u8; 4],
        length: usize,
    },
    Write {
        i2c_address: u8,
        payload: [u8; 5],
    },
}

#[derive(Debug)]
struct SensorState {
    eeprom: [u8; EEPROM_LENGTH],
    ram: [u16; RAM_WORDS],
    fail_ir_reads: bool,
    persistent_brown_out: bool,
    eeprom_reads: usize,
    ptat_reads: usize,
    /// A PTAT value to switch to once the EEPROM has been read this many times.
    pending_ptat: Option<(usize, u16)>,
    /// How many more write-reads succeed before one fails.
    write_reads_until_failure: Option<usize>,
}

/// A fake MLX90621, with both the EEPROM and the sensor on the same bus.
///
/// Clones share the same state, so a test can keep a clone to inspect and poke at the sensor after
/// handing the bus off to a driver.
#[derive(Clone, Debug)]
pub struct MockSensorBus {
    eeprom_address: u8,
    device_address: u8,
    state: Rc<RefCell<SensorState>>,
    recent_operations: Rc<RefCell<VecDeque<I2cOperation>>>,
}

impl MockSensorBus {
    pub fn new(eeprom_address: u8, device_address: u8, eeprom: &[u8; EEPROM_LENGTH]) -> Self {
        let mut ram = [0u16; RAM_WORDS];
        ram[CONFIG_ADDRESS] = POWER_ON_CONFIG;
        Self {
            eeprom_address,
            device_address,
            state: Rc::new(RefCell::new(SensorState {
                eeprom: *eeprom,
                ram,
                fail_ir_reads: false,
                persistent_brown_out: false,
                eeprom_reads: 0,
                ptat_reads: 0,
                pending_ptat: None,
                write_reads_until_failure: None,
            })),
            recent_operations: Rc::new(RefCell::new(VecDeque::new())),
        }
    }

    pub fn set_ptat(&mut self, ptat: u16) {
        self.state.borrow_mut().ram[PTAT_ADDRESS] = ptat;
    }

    /// Change the PTAT value once the EEPROM has been read `eeprom_reads` times in total.
    ///
    /// This simulates a bad start up that a reinitialization fixes.
    pub fn set_ptat_after_eeprom_reads(&mut self, eeprom_reads: usize, ptat: u16) {
        self.state.borrow_mut().pending_ptat = Some((eeprom_reads, ptat));
    }

    pub fn set_compensation_pixel(&mut self, compensation_pixel: i16) {
        self.state.borrow_mut().ram[COMPENSATION_PIXEL_ADDRESS] = compensation_pixel as u16;
    }

    pub fn set_ir_data(&mut self, ir_data: &[i16; NUM_PIXELS]) {
        let mut state = self.state.borrow_mut();
        state.ram[..NUM_PIXELS]
            .iter_mut()
            .zip(ir_data.iter())
            .for_each(|(word, pixel)| *word = *pixel as u16);
    }

    /// Make every IR frame read fail (or stop failing).
    pub fn fail_ir_reads(&mut self, fail: bool) {
        self.state.borrow_mut().fail_ir_reads = fail;
    }

    /// Let `successes` more write-reads through, then fail the next one (only that one).
    pub fn fail_write_read_after(&mut self, successes: usize) {
        self.state.borrow_mut().write_reads_until_failure = Some(successes);
    }

    /// Clear the POR flag, as the sensor does when it resets.
    pub fn simulate_brown_out(&mut self) {
        self.state.borrow_mut().ram[CONFIG_ADDRESS] &= !POR_FLAG;
    }

    /// Simulate a sensor that keeps resetting: the POR flag is cleared now, and writes to the
    /// configuration register can't set it.
    pub fn set_persistent_brown_out(&mut self, persistent: bool) {
        let mut state = self.state.borrow_mut();
        state.persistent_brown_out = persistent;
        if persistent {
            state.ram[CONFIG_ADDRESS] &= !POR_FLAG;
        }
    }

    /// The configuration register, low byte first.
    pub fn config_bytes(&self) -> [u8; 2] {
        self.state.borrow().ram[CONFIG_ADDRESS].to_le_bytes()
    }

    pub fn trim_byte(&self) -> u8 {
        self.state.borrow().ram[TRIM_ADDRESS].to_le_bytes()[0]
    }

    /// How many times the full EEPROM has been read.
    pub fn eeprom_reads(&self) -> usize {
        self.state.borrow().eeprom_reads
    }

    pub fn ptat_reads(&self) -> usize {
        self.state.borrow().ptat_reads
    }

    fn add_operation(&self, operation: I2cOperation) {
        let mut recent_ops = self.recent_operations.borrow_mut();
        recent_ops.push_front(operation);
        recent_ops.truncate(RECENT_OPERATIONS_QUEUE_LENGTH);
    }

    /// The most recent operations on this bus, most recent first.
    pub fn recent_operations(&self) -> Ref<VecDeque<I2cOperation>> {
        self.recent_operations.borrow()
    }

    pub fn clear_recent_operations(&self) {
        self.recent_operations.borrow_mut().clear()
    }

    fn read_eeprom(&self, command: &[u8], out_buffer: &mut [u8]) -> Result<(), MockError> {
        if command.len() != 1 || command[0] != 0x00 {
            return Err(MockError::IllegalOperation);
        }
        if out_buffer.len() > EEPROM_LENGTH {
            return Err(MockError::IllegalAccess(out_buffer.len()));
        }
        let mut state = self.state.borrow_mut();
        out_buffer.copy_from_slice(&state.eeprom[..out_buffer.len()]);
        state.eeprom_reads += 1;
        if let Some((threshold, ptat)) = state.pending_ptat {
            if state.eeprom_reads >= threshold {
                state.ram[PTAT_ADDRESS] = ptat;
                state.pending_ptat = None;
            }
        }
        Ok(())
    }

    fn read_ram(&self, command: &[u8], out_buffer: &mut [u8]) -> Result<(), MockError> {
        if command.len() != 4 || command[0] != READ_COMMAND {
            return Err(MockError::IllegalOperation);
        }
        let start = command[1] as usize;
        let step = command[2] as usize;
        let count = command[3] as usize;
        if count == 0 || out_buffer.len() != count * 2 {
            return Err(MockError::IllegalOperation);
        }
        let last = start + step * (count - 1);
        if last >= RAM_WORDS {
            return Err(MockError::IllegalAccess(last));
        }
        let mut state = self.state.borrow_mut();
        if start < NUM_PIXELS && count > 1 && state.fail_ir_reads {
            return Err(MockError::IrReadFailure);
        }
        if start == PTAT_ADDRESS && count == 1 {
            state.ptat_reads += 1;
        }
        out_buffer
            .chunks_exact_mut(2)
            .enumerate()
            .for_each(|(index, chunk)| {
                let word = state.ram[start + step * index];
                chunk.copy_from_slice(&word.to_le_bytes());
            });
        Ok(())
    }
}

impl i2c::Write for MockSensorBus {
    type Error = MockError;

    fn write(&mut self, i2c_address: u8, bytes: &[u8]) -> Result<(), Self::Error> {
        if i2c_address != self.device_address {
            return Err(MockError::UnknownI2cAddress(i2c_address));
        }
        if bytes.len() != 5 {
            return Err(MockError::IllegalOperation);
        }
        let mut payload = [0u8; 5];
        payload.copy_from_slice(bytes);
        let (address, offset) = match payload[0] {
            WRITE_CONFIG_COMMAND => (CONFIG_ADDRESS, CONFIG_CHECK_OFFSET),
            WRITE_TRIM_COMMAND => (TRIM_ADDRESS, TRIM_CHECK_OFFSET),
            _ => return Err(MockError::IllegalOperation),
        };
        if payload[1] != payload[2].wrapping_sub(offset)
            || payload[3] != payload[4].wrapping_sub(offset)
        {
            return Err(MockError::BadChecksum(payload));
        }
        let mut word = u16::from_le_bytes([payload[2], payload[4]]);
        {
            let mut state = self.state.borrow_mut();
            if address == CONFIG_ADDRESS && state.persistent_brown_out {
                word &= !POR_FLAG;
            }
            state.ram[address] = word;
        }
        self.add_operation(I2cOperation::Write {
            i2c_address,
            payload,
        });
        Ok(())
    }
}

impl i2c::WriteRead for MockSensorBus {
    type Error = MockError;

    fn write_read(
        &mut self,
        i2c_address: u8,
        write_buffer: &[u8],
        out_buffer: &mut [u8],
    ) -> Result<(), Self::Error> {
        if i2c_address != self.eeprom_address && i2c_address != self.device_address {
            return Err(MockError::UnknownI2cAddress(i2c_address));
        }
        if write_buffer.len() > 4 || out_buffer.is_empty() {
            return Err(MockError::IllegalOperation);
        }
        {
            let mut state = self.state.borrow_mut();
            match state.write_reads_until_failure {
                Some(0) => {
                    state.write_reads_until_failure = None;
                    return Err(MockError::InjectedFailure);
                }
                Some(remaining) => state.write_reads_until_failure = Some(remaining - 1),
                None => (),
            }
        }
        let mut command = [0u8; 4];
        command[..write_buffer.len()].copy_from_slice(write_buffer);
        self.add_operation(I2cOperation::Read {
            i2c_address,
            command,
            length: out_buffer.len(),
        });
        if i2c_address == self.eeprom_address {
            self.read_eeprom(write_buffer, out_buffer)
        } else {
            self.read_ram(write_buffer, out_buffer)
        }
    }
}
