// SPDX-License-Identifier: Apache-2.0
// Copyright © 2021 Will Ross
//! Bus addresses, command bytes and memory offsets for the MLX90621.
use num_enum::{IntoPrimitive, TryFromPrimitive};

/// The default I²C address of the calibration EEPROM.
pub const DEFAULT_EEPROM_ADDRESS: u8 = 0x50;

/// The default I²C address of the sensor itself (configuration, trim, and RAM).
pub const DEFAULT_DEVICE_ADDRESS: u8 = 0x60;

/// The pair of I²C addresses an MLX90621 answers on.
///
/// The calibration EEPROM is a separate chip inside the package with its own address, so two
/// addresses are always involved.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct BusAddresses {
    /// Address of the 256-byte calibration memory.
    pub eeprom: u8,

    /// Address of the configuration and trim registers, and of the sensor RAM (PTAT, compensation
    /// pixel, IR data).
    pub device: u8,
}

impl BusAddresses {
    pub const fn new(eeprom: u8, device: u8) -> Self {
        Self { eeprom, device }
    }
}

impl Default for BusAddresses {
    fn default() -> Self {
        Self::new(DEFAULT_EEPROM_ADDRESS, DEFAULT_DEVICE_ADDRESS)
    }
}

/// The first byte of every transaction with the sensor.
#[derive(Clone, Copy, Debug, Eq, PartialEq, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum Command {
    /// Dump the EEPROM, starting at the given offset. Sent to the EEPROM address.
    ReadEeprom = 0x00,

    /// Read `count` words of RAM or registers: `[0x02, start, step, count]`.
    Read = 0x02,

    /// Write the configuration register, with check bytes.
    WriteConfiguration = 0x03,

    /// Write the oscillator trim register, with check bytes.
    WriteTrim = 0x04,
}

/// Significant RAM (and register) addresses on the sensor.
///
/// These are word addresses, as used in the `start` byte of a [read command][Command::Read].
#[derive(Clone, Copy, Debug, Eq, PartialEq, PartialOrd, Ord, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum RamAddress {
    /// The start of the IR data. There are 64 pixels, stored column by column.
    IrBase = 0x00,

    /// Proportional To Absolute Temperature, the raw ambient temperature sensor value.
    Ptat = 0x40,

    /// The compensation pixel, a blind pixel used to correct for thermal gradients.
    CompensationPixel = 0x41,

    /// The configuration register.
    Configuration = 0x92,

    /// The oscillator trim register.
    OscillatorTrim = 0x93,
}

/// Byte offsets of the calibration values in the EEPROM dump.
#[derive(Clone, Copy, Debug, Eq, PartialEq, PartialOrd, Ord, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub(crate) enum EepromAddress {
    /// 64 unsigned bytes, the per-pixel offset delta from the common offset.
    PixelOffsetDeltaStart = 0x00,

    /// 64 signed bytes, the per-pixel offset slope against ambient temperature.
    PixelOffsetSlopeStart = 0x40,

    /// 64 unsigned bytes, the per-pixel sensitivity delta from the common sensitivity.
    PixelSensitivityDeltaStart = 0x80,

    /// The start of the values shared by every pixel, packed together through 0xE5.
    ///
    /// In order: A<sub>common</sub>, the K<sub>T</sub> scales, the compensation pixel constants,
    /// the TGC, the offset scales, V<sub>th</sub>, K<sub>T1</sub>, K<sub>T2</sub>, α<sub>0</sub>
    /// and its scales, then emissivity.
    CommonOffset = 0xD0,

    /// The factory configuration register value, least significant byte first.
    Configuration = 0xF5,

    OscillatorTrim = 0xF7,
}

/// The number of bytes in the EEPROM.
pub const EEPROM_LENGTH: usize = 256;

/// The number of pixels on the sensor.
pub const NUM_PIXELS: usize = HEIGHT * WIDTH;

/// Number of pixel rows.
pub const HEIGHT: usize = 4;

/// Number of pixel columns.
pub const WIDTH: usize = 16;

#[cfg(test)]
mod test {
    use core::convert::TryFrom;

    use super::*;

    #[test]
    fn default_addresses() {
        let addresses = BusAddresses::default();
        assert_eq!(addresses.eeprom, 0x50);
        assert_eq!(addresses.device, 0x60);
    }

    #[test]
    fn command_bytes() {
        assert_eq!(u8::from(Command::ReadEeprom), 0x00);
        assert_eq!(u8::from(Command::Read), 0x02);
        assert_eq!(u8::from(Command::WriteConfiguration), 0x03);
        assert_eq!(u8::from(Command::WriteTrim), 0x04);
        assert!(Command::try_from(0x01u8).is_err());
    }

    #[test]
    fn calibration_offsets_fit() {
        // The per-pixel blocks butt up against each other and stop before the common values.
        let offset: u8 = EepromAddress::PixelOffsetSlopeStart.into();
        assert_eq!(offset as usize, NUM_PIXELS);
        let sensitivity: u8 = EepromAddress::PixelSensitivityDeltaStart.into();
        assert_eq!(sensitivity as usize, NUM_PIXELS * 2);
        assert!((sensitivity as usize + NUM_PIXELS) <= EepromAddress::CommonOffset as usize);
    }
}
