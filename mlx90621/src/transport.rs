// SPDX-License-Identifier: Apache-2.0
// Copyright © 2021 Will Ross
//! Bus transactions with the MLX90621.
//!
//! Every function here performs exactly one I²C transaction (a plain write or a combined
//! write-then-read) and maps a failure into [`Error`]. None of them retry; that is left to the
//! caller.
use embedded_hal::blocking::i2c;

use crate::address::{Command, RamAddress, EEPROM_LENGTH, NUM_PIXELS};
use crate::error::Error;
use crate::frame::RawIrFrame;
use crate::register::Register;
use crate::util::WORD_SIZE;

/// The number of bytes of IR data in a frame.
pub const IR_FRAME_LENGTH: usize = NUM_PIXELS * WORD_SIZE;

/// Read the entire calibration EEPROM.
pub fn read_eeprom<I2C>(bus: &mut I2C, address: u8) -> Result<[u8; EEPROM_LENGTH], Error<I2C>>
where
    I2C: i2c::WriteRead + i2c::Write,
{
    let mut eeprom = [0u8; EEPROM_LENGTH];
    bus.write_read(address, &[Command::ReadEeprom.into()], &mut eeprom)
        .map_err(Error::I2cWriteReadError)?;
    Ok(eeprom)
}

/// Build a read command for `count` words starting at `start`, advancing by `step` each word.
pub(crate) fn read_command(start: RamAddress, step: u8, count: u8) -> [u8; 4] {
    [Command::Read.into(), start.into(), step, count]
}

/// Read `buffer.len() / 2` words from the sensor, starting at `start`.
fn read_words<I2C>(
    bus: &mut I2C,
    address: u8,
    start: RamAddress,
    step: u8,
    buffer: &mut [u8],
) -> Result<(), Error<I2C>>
where
    I2C: i2c::WriteRead + i2c::Write,
{
    let count = (buffer.len() / WORD_SIZE) as u8;
    let command = read_command(start, step, count);
    bus.write_read(address, &command, buffer)
        .map_err(Error::I2cWriteReadError)
}

pub fn read_register<R, I2C>(bus: &mut I2C, address: u8) -> Result<R, Error<I2C>>
where
    I2C: i2c::WriteRead + i2c::Write,
    R: Register,
{
    let mut register_bytes = [0u8; WORD_SIZE];
    read_words(bus, address, R::address(), 0, &mut register_bytes)?;
    Ok(R::from(&register_bytes[..]))
}

/// Frame a register value for writing: `[command, check(lsb), lsb, check(msb), msb]`.
///
/// The sensor silently ignores writes where a check byte doesn't match.
pub fn checked_payload<R: Register>(register: R) -> [u8; 5] {
    let [lsb, msb]: [u8; 2] = register.into();
    let offset = R::check_offset();
    [
        R::write_command().into(),
        lsb.wrapping_sub(offset),
        lsb,
        msb.wrapping_sub(offset),
        msb,
    ]
}

pub fn write_register<R, I2C>(bus: &mut I2C, address: u8, register: R) -> Result<(), Error<I2C>>
where
    I2C: i2c::WriteRead + i2c::Write,
    R: Register,
{
    let payload = checked_payload(register);
    bus.write(address, &payload).map_err(Error::I2cWriteError)
}

/// Read the raw PTAT (Proportional To Absolute Temperature) value.
pub fn read_ptat<I2C>(bus: &mut I2C, address: u8) -> Result<u16, Error<I2C>>
where
    I2C: i2c::WriteRead + i2c::Write,
{
    let mut buf = [0u8; WORD_SIZE];
    read_words(bus, address, RamAddress::Ptat, 0, &mut buf)?;
    Ok(u16::from_le_bytes(buf))
}

/// Read the raw compensation pixel value.
pub fn read_compensation_pixel<I2C>(bus: &mut I2C, address: u8) -> Result<i16, Error<I2C>>
where
    I2C: i2c::WriteRead + i2c::Write,
{
    let mut buf = [0u8; WORD_SIZE];
    read_words(bus, address, RamAddress::CompensationPixel, 0, &mut buf)?;
    Ok(i16::from_le_bytes(buf))
}

/// Read all 64 raw IR pixel values in one transaction.
pub fn read_ir_frame<I2C>(bus: &mut I2C, address: u8) -> Result<RawIrFrame, Error<I2C>>
where
    I2C: i2c::WriteRead + i2c::Write,
{
    let mut buf = [0u8; IR_FRAME_LENGTH];
    read_words(bus, address, RamAddress::IrBase, 1, &mut buf)?;
    Ok(RawIrFrame::from_bytes(&buf))
}
