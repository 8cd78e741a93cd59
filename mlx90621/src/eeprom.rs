// SPDX-License-Identifier: Apache-2.0
// Copyright © 2021 Will Ross

//! Decoding the factory calibration data stored in the MLX90621 EEPROM.

use core::convert::TryInto;

use embedded_hal::blocking::i2c;

// Various floating point operations are not implemented in core, so we use libm to provide them as
// needed.
#[cfg_attr(feature = "std", allow(unused_imports))]
use num_traits::Float;

use crate::address::{EepromAddress, EEPROM_LENGTH, NUM_PIXELS};
use crate::error::{Error, LibraryError};
use crate::expose_member;
use crate::register::DeviceConfig;
use crate::transport::read_eeprom;
use crate::util::{nibbles, Buffer};

/// Types that can be created using data retrieved over I²C.
pub trait FromI2C<I2C> {
    type Error;
    type Ok;

    /// Create an instance of a type using data retrieved over I²C.
    fn from_i2c(bus: &mut I2C, i2c_address: u8) -> Result<Self::Ok, Self::Error>;
}

/// The calibration constants for a specific MLX90621, decoded from its EEPROM.
///
/// All of the values are independent of the ADC resolution. Several of them need to be divided by
/// [`Resolution::correction`][crate::Resolution::correction] before use, which the temperature
/// calculations do once per call.
///
/// The naming follows the variables in the datasheet formulas where there is one: `a` is an
/// offset, `b` is the slope of that offset against ambient temperature, and `alpha` is a
/// sensitivity.
#[derive(Clone, Debug, PartialEq)]
pub struct CalibrationTable {
    /// The bytes everything else was decoded from.
    raw: [u8; EEPROM_LENGTH],

    /// A<sub>i</sub>, `A_common + ΔA_i · ai_scale²`.
    pixel_offsets: [f32; NUM_PIXELS],

    /// B<sub>i</sub>, `B_i / bi_scale²`.
    pixel_offset_slopes: [f32; NUM_PIXELS],

    /// α<sub>i</sub>, `α_0 / α_0_scale² + Δα_i / Δα_scale²`.
    pixel_sensitivities: [f32; NUM_PIXELS],

    /// A<sub>common</sub>.
    common_offset: i16,

    /// The high nibble of 0xD9.
    offset_scale: u8,

    /// The low nibble of 0xD9.
    offset_slope_scale: u8,

    /// α<sub>0</sub>, before scaling.
    common_sensitivity: u16,

    common_sensitivity_scale: u8,

    sensitivity_delta_scale: u8,

    /// A<sub>CP</sub>.
    compensation_pixel_offset: f32,

    /// B<sub>CP</sub>, scaled by the same exponent as the pixel offset slopes.
    compensation_pixel_offset_slope: f32,

    /// α<sub>CP</sub>, scaled by the same exponent as α<sub>0</sub>.
    compensation_pixel_sensitivity: f32,

    /// The thermal gradient coefficient, stored as a signed byte scaled by 2<sup>5</sup>.
    thermal_gradient_coefficient: f32,

    /// V<sub>th</sub>, the PTAT value at 25℃.
    v_th: f32,

    /// K<sub>T1</sub>, the linear term of the PTAT/ambient relation.
    k_t1: f32,

    /// K<sub>T2</sub>, the quadratic term of the PTAT/ambient relation.
    k_t2: f32,

    emissivity: f32,

    /// The configuration the factory wants the sensor started with.
    configuration: DeviceConfig,

    oscillator_trim: u8,
}

impl CalibrationTable {
    /// Decode the calibration data from a full EEPROM dump.
    pub fn from_data(data: &[u8; EEPROM_LENGTH]) -> Self {
        // The shared values are all packed together, so they can just be read in order.
        let mut buf = &data[EepromAddress::CommonOffset as usize..];
        let common_offset = buf.get_i16_le();
        let (k_t1_scale, k_t2_scale) = nibbles(buf.get_u8());
        let compensation_pixel_offset = f32::from(buf.get_i16_le());
        let raw_cp_offset_slope = buf.get_i8();
        let raw_cp_sensitivity = buf.get_u16_le();
        let thermal_gradient_coefficient = f32::from(buf.get_i8()) / 32f32;
        let (offset_scale, offset_slope_scale) = nibbles(buf.get_u8());
        let v_th = f32::from(buf.get_i16_le());
        let raw_k_t1 = buf.get_i16_le();
        let raw_k_t2 = buf.get_i16_le();
        let common_sensitivity = buf.get_u16_le();
        let common_sensitivity_scale = buf.get_u8();
        let sensitivity_delta_scale = buf.get_u8();
        let emissivity = f32::from(buf.get_u16_le()) / 32768f32;

        let k_t1 = f32::from(raw_k_t1) / f32::from(k_t1_scale).powi(2);
        // The K_T2 scale is stored minus 10.
        let k_t2 = f32::from(raw_k_t2) / (f32::from(k_t2_scale) + 10f32).powi(2);

        let slope_divisor = f32::from(offset_slope_scale).powi(2);
        let compensation_pixel_offset_slope = f32::from(raw_cp_offset_slope) / slope_divisor;
        let alpha_0_divisor = f32::from(common_sensitivity_scale).powi(2);
        let compensation_pixel_sensitivity = f32::from(raw_cp_sensitivity) / alpha_0_divisor;

        let pixel_offsets = Self::get_pixel_offsets(data, common_offset, offset_scale);
        let pixel_offset_slopes = Self::get_pixel_offset_slopes(data, slope_divisor);
        let pixel_sensitivities = Self::get_pixel_sensitivities(
            data,
            f32::from(common_sensitivity) / alpha_0_divisor,
            f32::from(sensitivity_delta_scale).powi(2),
        );

        let config_start = EepromAddress::Configuration as usize;
        let configuration = DeviceConfig::from(&data[config_start..(config_start + 2)]);
        let oscillator_trim = data[EepromAddress::OscillatorTrim as usize];
        Self {
            raw: *data,
            pixel_offsets,
            pixel_offset_slopes,
            pixel_sensitivities,
            common_offset,
            offset_scale,
            offset_slope_scale,
            common_sensitivity,
            common_sensitivity_scale,
            sensitivity_delta_scale,
            compensation_pixel_offset,
            compensation_pixel_offset_slope,
            compensation_pixel_sensitivity,
            thermal_gradient_coefficient,
            v_th,
            k_t1,
            k_t2,
            emissivity,
            configuration,
            oscillator_trim,
        }
    }

    /// Decode the calibration data from a slice, checking that it is a full EEPROM dump.
    pub fn from_slice(data: &[u8]) -> Result<Self, LibraryError> {
        let data: &[u8; EEPROM_LENGTH] = data
            .try_into()
            .map_err(|_| LibraryError::EepromLength(data.len()))?;
        Ok(Self::from_data(data))
    }

    fn get_pixel_offsets(
        data: &[u8; EEPROM_LENGTH],
        common_offset: i16,
        offset_scale: u8,
    ) -> [f32; NUM_PIXELS] {
        let mut pixel_offsets = [0f32; NUM_PIXELS];
        let scale = f32::from(offset_scale).powi(2);
        let start = EepromAddress::PixelOffsetDeltaStart as usize;
        pixel_offsets
            .iter_mut()
            .zip(&data[start..(start + NUM_PIXELS)])
            .for_each(|(offset, delta)| {
                *offset = f32::from(common_offset) + f32::from(*delta) * scale
            });
        pixel_offsets
    }

    fn get_pixel_offset_slopes(data: &[u8; EEPROM_LENGTH], divisor: f32) -> [f32; NUM_PIXELS] {
        let mut slopes = [0f32; NUM_PIXELS];
        let mut buf = &data[EepromAddress::PixelOffsetSlopeStart as usize..];
        for slope in slopes.iter_mut() {
            *slope = f32::from(buf.get_i8()) / divisor;
        }
        slopes
    }

    fn get_pixel_sensitivities(
        data: &[u8; EEPROM_LENGTH],
        common_sensitivity: f32,
        delta_divisor: f32,
    ) -> [f32; NUM_PIXELS] {
        let mut sensitivities = [0f32; NUM_PIXELS];
        let start = EepromAddress::PixelSensitivityDeltaStart as usize;
        sensitivities
            .iter_mut()
            .zip(&data[start..(start + NUM_PIXELS)])
            .for_each(|(alpha, delta)| {
                *alpha = common_sensitivity + f32::from(*delta) / delta_divisor
            });
        sensitivities
    }

    expose_member!(&raw, [u8; EEPROM_LENGTH]);
    expose_member!(&pixel_offsets, [f32; NUM_PIXELS]);
    expose_member!(&pixel_offset_slopes, [f32; NUM_PIXELS]);
    expose_member!(&pixel_sensitivities, [f32; NUM_PIXELS]);
    expose_member!(common_offset, i16);
    expose_member!(offset_scale, u8);
    expose_member!(offset_slope_scale, u8);
    expose_member!(common_sensitivity, u16);
    expose_member!(common_sensitivity_scale, u8);
    expose_member!(sensitivity_delta_scale, u8);
    expose_member!(compensation_pixel_offset, f32);
    expose_member!(compensation_pixel_offset_slope, f32);
    expose_member!(compensation_pixel_sensitivity, f32);
    expose_member!(thermal_gradient_coefficient, f32);
    expose_member!(v_th, f32);
    expose_member!(k_t1, f32);
    expose_member!(k_t2, f32);
    expose_member!(emissivity, f32);
    expose_member!(configuration, DeviceConfig);
    expose_member!(oscillator_trim, u8);
}

impl<I2C> FromI2C<I2C> for CalibrationTable
where
    I2C: i2c::WriteRead + i2c::Write,
{
    type Error = Error<I2C>;
    type Ok = Self;

    fn from_i2c(bus: &mut I2C, i2c_address: u8) -> Result<Self, Error<I2C>> {
        let eeprom = read_eeprom(bus, i2c_address)?;
        Ok(Self::from_data(&eeprom))
    }
}
