// SPDX-License-Identifier: Apache-2.0
// Copyright © 2021 Will Ross
use core::convert::TryFrom;

use crate::address::{Command, RamAddress};
use crate::error::LibraryError;
use crate::util::is_bit_set;

/// Trait for common register functionality.
///
/// Both writable registers on the MLX90621 are 16 bits wide and are written with a "negative
/// checksum": each data byte is preceded by that byte minus a register-specific constant.
pub trait Register: Into<[u8; 2]> + for<'a> From<&'a [u8]> {
    /// The address of this register, for use in a read command.
    fn address() -> RamAddress;

    /// The command byte that starts a write to this register.
    fn write_command() -> Command;

    /// The constant subtracted (wrapping) from each data byte to make its check byte.
    fn check_offset() -> u8;
}

/// The configuration register (0x92).
#[derive(Clone, Copy, Debug, Eq, PartialEq, PartialOrd, Ord)]
// rustfmt would drop the blank lines around the bit-position comments.
#[rustfmt::skip]
pub struct DeviceConfig {
    // Fields are laid out in the order of the bits they occupy, least significant first.

    /// How often the sensor takes a new measurement.
    pub(crate) refresh_rate: RefreshRate,

    // `refresh_rate` takes up four bits.

    /// The resolution of the ADC.
    pub(crate) resolution: Resolution,

    // `resolution` takes up two bits.

    /// Measure once when triggered instead of continuously.
    pub(crate) step_mode: bool,

    /// Whether the sensor is in its low power sleep mode.
    pub(crate) sleep: bool,

    /// The power-on-reset flag.
    ///
    /// This flag is set by the controller when it configures the sensor, and is cleared by the
    /// sensor when it resets (including from a brown-out). If it is clear, the sensor has lost its
    /// configuration and trim values and must be set up again.
    pub(crate) por_flag: bool,

    /// All of the other bits, kept so that modifying one field writes them back untouched.
    pub(crate) other_bits: u16,
}

impl DeviceConfig {
    const REFRESH_RATE_MASK: u16 = 0x000F;
    const RESOLUTION_MASK: u16 = 0x0030;
    const STEP_MODE_BIT: usize = 6;
    const SLEEP_BIT: usize = 7;
    const POR_BIT: usize = 10;
    const KNOWN_MASK: u16 = Self::REFRESH_RATE_MASK
        | Self::RESOLUTION_MASK
        | (1 << Self::STEP_MODE_BIT)
        | (1 << Self::SLEEP_BIT)
        | (1 << Self::POR_BIT);

    /// Create a configuration from the raw (least significant byte first) register bytes.
    pub fn from_bytes(lsb: u8, msb: u8) -> Self {
        Self::from(&[lsb, msb][..])
    }

    pub fn refresh_rate(&self) -> RefreshRate {
        self.refresh_rate
    }

    pub fn set_refresh_rate(&mut self, refresh_rate: RefreshRate) {
        self.refresh_rate = refresh_rate;
    }

    pub fn resolution(&self) -> Resolution {
        self.resolution
    }

    pub fn set_resolution(&mut self, resolution: Resolution) {
        self.resolution = resolution;
    }

    pub fn step_mode(&self) -> bool {
        self.step_mode
    }

    pub fn sleep(&self) -> bool {
        self.sleep
    }

    pub fn por_flag(&self) -> bool {
        self.por_flag
    }

    pub fn set_por_flag(&mut self, por_flag: bool) {
        self.por_flag = por_flag;
    }

    /// Check if the sensor has reset since it was last configured.
    pub fn brown_out_detected(&self) -> bool {
        !self.por_flag
    }
}

impl Register for DeviceConfig {
    fn address() -> RamAddress {
        RamAddress::Configuration
    }

    fn write_command() -> Command {
        Command::WriteConfiguration
    }

    fn check_offset() -> u8 {
        0x55
    }
}

impl<'a> From<&'a [u8]> for DeviceConfig {
    /// Create a `DeviceConfig` from the bytes read from the sensor.
    ///
    /// This method will `panic` if there aren't at least two bytes in the slice.
    fn from(buf: &'a [u8]) -> Self {
        let raw = u16::from_le_bytes([buf[0], buf[1]]);
        // Every 4-bit value is a valid refresh rate, and every 2-bit value a valid resolution.
        let refresh_rate = RefreshRate::from_raw(raw & Self::REFRESH_RATE_MASK);
        let resolution = Resolution::from_raw((raw & Self::RESOLUTION_MASK) >> 4);
        Self {
            refresh_rate,
            resolution,
            step_mode: is_bit_set(raw, Self::STEP_MODE_BIT),
            sleep: is_bit_set(raw, Self::SLEEP_BIT),
            por_flag: is_bit_set(raw, Self::POR_BIT),
            other_bits: raw & !Self::KNOWN_MASK,
        }
    }
}

impl From<DeviceConfig> for [u8; 2] {
    fn from(register: DeviceConfig) -> Self {
        let mut raw = register.other_bits & !DeviceConfig::KNOWN_MASK;
        raw |= register.refresh_rate.as_raw();
        raw |= register.resolution.as_raw() << 4;
        raw |= (register.step_mode as u16) << DeviceConfig::STEP_MODE_BIT;
        raw |= (register.sleep as u16) << DeviceConfig::SLEEP_BIT;
        raw |= (register.por_flag as u16) << DeviceConfig::POR_BIT;
        raw.to_le_bytes()
    }
}

/// The oscillator trim register (0x93).
///
/// Only the low byte is meaningful; the factory value is stored in the EEPROM.
#[derive(Clone, Copy, Debug, Eq, PartialEq, PartialOrd, Ord)]
pub struct OscillatorTrim(pub u8);

impl OscillatorTrim {
    pub fn value(&self) -> u8 {
        self.0
    }
}

impl Register for OscillatorTrim {
    fn address() -> RamAddress {
        RamAddress::OscillatorTrim
    }

    fn write_command() -> Command {
        Command::WriteTrim
    }

    fn check_offset() -> u8 {
        0xAA
    }
}

impl<'a> From<&'a [u8]> for OscillatorTrim {
    fn from(buf: &'a [u8]) -> Self {
        Self(buf[0])
    }
}

impl From<OscillatorTrim> for [u8; 2] {
    fn from(trim: OscillatorTrim) -> Self {
        [trim.0, 0x00]
    }
}

/// The measurement rates the MLX90621 supports.
///
/// Faster rates need a faster bus: a full frame is 128 bytes of IR data plus the two single-word
/// reads, so at 100kHz anything past [16Hz][RefreshRate::Sixteen] will not keep up.
#[derive(Clone, Copy, Debug, Eq, PartialEq, PartialOrd, Ord)]
pub enum RefreshRate {
    /// 0.5 Hz, one frame every two seconds.
    Half,

    /// 1Hz, the power-on default.
    One,

    // 2Hz.
    Two,

    // 4Hz.
    Four,

    // 8Hz.
    Eight,

    // 16Hz.
    Sixteen,

    // 32Hz.
    ThirtyTwo,

    // 64Hz.
    SixtyFour,

    // 128Hz.
    OneTwentyEight,

    // 256Hz.
    TwoFiftySix,

    /// 512Hz. Six different raw values all map to this rate.
    FiveTwelve,
}

impl RefreshRate {
    /// Create a `RefreshRate` from the lowest four bits of the configuration register.
    pub(crate) fn from_raw(raw_value: u16) -> Self {
        match raw_value & 0x000F {
            0x0F => Self::Half,
            0x0E => Self::One,
            0x0D => Self::Two,
            0x0C => Self::Four,
            0x0B => Self::Eight,
            0x0A => Self::Sixteen,
            0x09 => Self::ThirtyTwo,
            0x08 => Self::SixtyFour,
            0x07 => Self::OneTwentyEight,
            0x06 => Self::TwoFiftySix,
            _ => Self::FiveTwelve,
        }
    }

    /// Map a refresh rate into the representation used by the sensor.
    pub(crate) fn as_raw(&self) -> u16 {
        match self {
            Self::Half => 0x0F,
            Self::One => 0x0E,
            Self::Two => 0x0D,
            Self::Four => 0x0C,
            Self::Eight => 0x0B,
            Self::Sixteen => 0x0A,
            Self::ThirtyTwo => 0x09,
            Self::SixtyFour => 0x08,
            Self::OneTwentyEight => 0x07,
            Self::TwoFiftySix => 0x06,
            Self::FiveTwelve => 0x00,
        }
    }
}

impl Default for RefreshRate {
    fn default() -> Self {
        Self::One
    }
}

impl TryFrom<f32> for RefreshRate {
    type Error = LibraryError;

    /// Attempt to create a `RefreshRate` from a number of hertz.
    ///
    /// This will only work if the source number *exactly* matches one of the supported rates.
    /// ```
    /// # use core::convert::TryFrom;
    /// # use mlx90621::RefreshRate;
    /// assert_eq!(RefreshRate::try_from(4.0), Ok(RefreshRate::Four));
    /// assert!(RefreshRate::try_from(3.0).is_err());
    /// ```
    #[allow(clippy::float_cmp)]
    fn try_from(value: f32) -> Result<Self, Self::Error> {
        if value == 0.5 {
            Ok(Self::Half)
        } else if value == 1.0 {
            Ok(Self::One)
        } else if value == 2.0 {
            Ok(Self::Two)
        } else if value == 4.0 {
            Ok(Self::Four)
        } else if value == 8.0 {
            Ok(Self::Eight)
        } else if value == 16.0 {
            Ok(Self::Sixteen)
        } else if value == 32.0 {
            Ok(Self::ThirtyTwo)
        } else if value == 64.0 {
            Ok(Self::SixtyFour)
        } else if value == 128.0 {
            Ok(Self::OneTwentyEight)
        } else if value == 256.0 {
            Ok(Self::TwoFiftySix)
        } else if value == 512.0 {
            Ok(Self::FiveTwelve)
        } else {
            Err(LibraryError::UnsupportedRefreshRate(value))
        }
    }
}

impl From<RefreshRate> for f32 {
    fn from(refresh_rate: RefreshRate) -> Self {
        match refresh_rate {
            RefreshRate::Half => 0.5,
            RefreshRate::One => 1f32,
            RefreshRate::Two => 2f32,
            RefreshRate::Four => 4f32,
            RefreshRate::Eight => 8f32,
            RefreshRate::Sixteen => 16f32,
            RefreshRate::ThirtyTwo => 32f32,
            RefreshRate::SixtyFour => 64f32,
            RefreshRate::OneTwentyEight => 128f32,
            RefreshRate::TwoFiftySix => 256f32,
            RefreshRate::FiveTwelve => 512f32,
        }
    }
}

/// The resolution of the internal [ADC][adc].
///
/// Several calibration values are stored relative to the highest resolution, and are divided by
/// `(3 - raw_resolution)²` when used at another one. See [`Resolution::correction`].
///
/// [adc]: https://en.wikipedia.org/wiki/Analog-to-digital_converter
#[derive(Clone, Copy, Debug, Eq, PartialEq, PartialOrd, Ord)]
#[repr(u8)]
pub enum Resolution {
    /// 15-bit.
    Fifteen,

    /// 16-bit.
    Sixteen,

    /// 17-bit.
    Seventeen,

    /// 18-bit, the power-on default.
    Eighteen,
}

impl Resolution {
    /// Create a `Resolution` from the two bit field in the configuration register.
    pub(crate) fn from_raw(raw_value: u16) -> Self {
        match raw_value & 0x0003 {
            0 => Self::Fifteen,
            1 => Self::Sixteen,
            2 => Self::Seventeen,
            _ => Self::Eighteen,
        }
    }

    /// Map a resolution into the representation used by the sensor.
    pub(crate) fn as_raw(&self) -> u16 {
        match self {
            Self::Fifteen => 0,
            Self::Sixteen => 1,
            Self::Seventeen => 2,
            Self::Eighteen => 3,
        }
    }

    /// The divisor applied to resolution dependent calibration values, `(3 - raw)²`.
    ///
    /// Note that this is zero for [18 bits][Resolution::Eighteen], which makes every value
    /// computed with it non-finite.
    pub fn correction(&self) -> f32 {
        let exponent = 3 - self.as_raw() as i16;
        f32::from(exponent * exponent)
    }
}

impl TryFrom<u8> for Resolution {
    type Error = LibraryError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            15 => Ok(Self::Fifteen),
            16 => Ok(Self::Sixteen),
            17 => Ok(Self::Seventeen),
            18 => Ok(Self::Eighteen),
            bits => Err(LibraryError::UnsupportedResolution(bits)),
        }
    }
}

impl From<Resolution> for u8 {
    fn from(resolution: Resolution) -> Self {
        match resolution {
            Resolution::Fifteen => 15,
            Resolution::Sixteen => 16,
            Resolution::Seventeen => 17,
            Resolution::Eighteen => 18,
        }
    }
}

impl Default for Resolution {
    fn default() -> Self {
        Self::Eighteen
    }
}
