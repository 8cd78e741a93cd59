// SPDX-License-Identifier: Apache-2.0
// Copyright © 2021 Will Ross
#[cfg(feature = "std")]
extern crate std;

use core::fmt;

use embedded_hal::blocking::i2c;

/// Problems with values handed to (or decoded by) this library, as opposed to bus failures.
#[derive(Clone, Debug, PartialEq)]
pub enum LibraryError {
    /// A calibration dump that isn't the full 256 bytes of the EEPROM.
    EepromLength(usize),

    /// A refresh rate (in Hz) the sensor doesn't have a setting for.
    UnsupportedRefreshRate(f32),

    /// An ADC resolution (in bits) outside of 15 through 18.
    UnsupportedResolution(u8),
}

impl fmt::Display for LibraryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LibraryError::EepromLength(length) => {
                write!(f, "expected 256 bytes of EEPROM data, got {}", length)
            }
            LibraryError::UnsupportedRefreshRate(rate) => {
                write!(f, "{}Hz is not a refresh rate the MLX90621 supports", rate)
            }
            LibraryError::UnsupportedResolution(bits) => {
                write!(f, "{}-bit is not an ADC resolution the MLX90621 supports", bits)
            }
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for LibraryError {}

/// Errors from a single bus transaction (or from interpreting its result).
///
/// The I²C variants are what the sensor reports as a non-acknowledge (or whatever the bus
/// implementation does on a timeout). There is no retrying at this level.
pub enum Error<I2C>
where
    I2C: i2c::WriteRead + i2c::Write,
{
    /// Errors originating from a write-only I²C transaction (the configuration and trim writes).
    I2cWriteError(<I2C as i2c::Write>::Error),

    /// Errors originating from a combined write-then-read I²C transaction.
    I2cWriteReadError(<I2C as i2c::WriteRead>::Error),

    /// Errors originating from within this library.
    LibraryError(LibraryError),
}

// The bus type itself is rarely Clone or PartialEq, only its error types need to be.
impl<I2C> Clone for Error<I2C>
where
    I2C: i2c::WriteRead + i2c::Write,
    <I2C as i2c::Write>::Error: Clone,
    <I2C as i2c::WriteRead>::Error: Clone,
{
    fn clone(&self) -> Self {
        match self {
            Error::I2cWriteError(err) => Error::I2cWriteError(err.clone()),
            Error::I2cWriteReadError(err) => Error::I2cWriteReadError(err.clone()),
            Error::LibraryError(err) => Error::LibraryError(err.clone()),
        }
    }
}

impl<I2C> PartialEq for Error<I2C>
where
    I2C: i2c::WriteRead + i2c::Write,
    <I2C as i2c::Write>::Error: PartialEq,
    <I2C as i2c::WriteRead>::Error: PartialEq,
{
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Error::I2cWriteError(lhs), Error::I2cWriteError(rhs)) => lhs == rhs,
            (Error::I2cWriteReadError(lhs), Error::I2cWriteReadError(rhs)) => lhs == rhs,
            (Error::LibraryError(lhs), Error::LibraryError(rhs)) => lhs == rhs,
            _ => false,
        }
    }
}

// I2cdev from linux-embedded-hal isn't Debug, so derive(Debug) would be too restrictive.
impl<I2C> fmt::Debug for Error<I2C>
where
    I2C: i2c::WriteRead + i2c::Write,
    <I2C as i2c::Write>::Error: fmt::Debug,
    <I2C as i2c::WriteRead>::Error: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::I2cWriteError(err) => f.debug_tuple("Error::I2cWriteError").field(err).finish(),
            Error::I2cWriteReadError(err) => f
                .debug_tuple("Error::I2cWriteReadError")
                .field(err)
                .finish(),
            Error::LibraryError(err) => f.debug_tuple("Error::LibraryError").field(err).finish(),
        }
    }
}

impl<I2C> fmt::Display for Error<I2C>
where
    I2C: i2c::WriteRead + i2c::Write,
    <I2C as i2c::Write>::Error: fmt::Debug,
    <I2C as i2c::WriteRead>::Error: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::I2cWriteError(err) => write!(f, "register write not acknowledged: {:?}", err),
            Error::I2cWriteReadError(err) => write!(f, "register read failed: {:?}", err),
            Error::LibraryError(err) => err.fmt(f),
        }
    }
}

#[cfg(feature = "std")]
impl<I2C> std::error::Error for Error<I2C>
where
    I2C: i2c::WriteRead + i2c::Write,
    <I2C as i2c::Write>::Error: std::error::Error + 'static,
    <I2C as i2c::WriteRead>::Error: std::error::Error + 'static,
{
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::I2cWriteError(err) => Some(err),
            Error::I2cWriteReadError(err) => Some(err),
            Error::LibraryError(err) => Some(err),
        }
    }
}

impl<I2C> From<LibraryError> for Error<I2C>
where
    I2C: i2c::WriteRead + i2c::Write,
{
    fn from(lib_err: LibraryError) -> Self {
        Self::LibraryError(lib_err)
    }
}
