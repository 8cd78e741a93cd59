// SPDX-License-Identifier: Apache-2.0
// Copyright © 2021 Will Ross

/// The size of the MLX90621 EEPROM in bytes.
pub const EEPROM_LENGTH: usize = 256;

/// The number of pixels on the sensor.
const NUM_PIXELS: usize = 64;

/// The shared calibration data, from 0xD0 through 0xFF.
// Each line is 16 bytes. 0xD0 is the common offset, followed by the K_T scales, the compensation
// pixel parameters, the TGC, the offset scales, V_th, K_T1, K_T2, the common sensitivity and its
// scales, then the emissivity. The configuration register and oscillator trim are at 0xF5-0xF7.
const FIXTURE_CALIBRATION: &[u8] = b"\
    \xd8\xff\x5b\xe2\xff\xfd\x01\x00\x08\x27\x2c\x1a\x4c\x02\xf6\xff\
    \x02\x00\xc8\xfa\x99\x79\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\
    \x00\x00\x00\x00\x00\x1e\x46\x54\x00\x00\x00\x00\x00\x00\x00\x00";

/// A made up, but realistic, EEPROM image.
///
/// The per-pixel values follow short repeating patterns so that neighbouring pixels differ:
/// * ΔA<sub>i</sub> is `10 + (i mod 7)`
/// * B<sub>i</sub> is `(i mod 5) - 2`
/// * Δα<sub>i</sub> is `i mod 4`
pub fn fixture_eeprom() -> [u8; EEPROM_LENGTH] {
    let mut eeprom_data = [0u8; EEPROM_LENGTH];
    eeprom_data[..NUM_PIXELS]
        .iter_mut()
        .zip((10u8..17).cycle())
        .for_each(|(eeprom_byte, offset)| *eeprom_byte = offset);
    eeprom_data[NUM_PIXELS..(2 * NUM_PIXELS)]
        .iter_mut()
        .zip([-2i8, -1, 0, 1, 2].iter().copied().cycle())
        .for_each(|(eeprom_byte, slope)| *eeprom_byte = slope as u8);
    eeprom_data[(2 * NUM_PIXELS)..(3 * NUM_PIXELS)]
        .iter_mut()
        .zip((0u8..4).cycle())
        .for_each(|(eeprom_byte, sensitivity)| *eeprom_byte = sensitivity);
    eeprom_data[0xD0..].copy_from_slice(FIXTURE_CALIBRATION);
    eeprom_data
}

/// A PTAT reading giving a normal room temperature with the fixture EEPROM at 16-bit resolution.
pub const FIXTURE_PTAT: u16 = 1687;

/// The ambient temperature for [`FIXTURE_PTAT`], in ℃.
pub const FIXTURE_AMBIENT: f32 = 27.044847;

/// A PTAT reading that makes the ambient temperature calculation fail (negative discriminant).
pub const FIXTURE_IMPLAUSIBLE_PTAT: u16 = 40000;

pub const FIXTURE_COMPENSATION_PIXEL: i16 = -25;

/// Raw IR readings for the fixture: a ramp, from -3000 up to 6450.
pub fn fixture_ir_data() -> [i16; NUM_PIXELS] {
    let mut ir_data = [0i16; NUM_PIXELS];
    ir_data
        .iter_mut()
        .enumerate()
        .for_each(|(index, value)| *value = (index as i16 - 20) * 150);
    ir_data
}

/// The object temperatures (in ℃) for [`fixture_ir_data`], using [`FIXTURE_AMBIENT`],
/// [`FIXTURE_COMPENSATION_PIXEL`] and 16-bit resolution. Each line is one column.
#[rustfmt::skip]
pub const FIXTURE_TEMPERATURES: [f32; NUM_PIXELS] = [
    24.3443, 25.1736, 25.6494, 25.9581,
    24.8875, 25.5683, 25.9594, 26.2163,
    25.4340, 25.9660, 26.2721, 26.4708,
    25.9713, 26.3576, 26.5837, 26.7277,
    26.5119, 26.7523, 26.8908, 26.9809,
    27.0434, 27.1453, 27.2006, 27.2365,
    27.5783, 27.5323, 27.5058, 27.4885,
    28.1103, 27.9223, 27.8136, 27.7428,
    28.6334, 28.3064, 28.1170, 27.9964,
    29.1600, 28.6934, 28.4230, 28.2464,
    29.6777, 29.0745, 28.7280, 28.4988,
    30.1987, 29.4586, 29.0286, 28.7476,
    30.7112, 29.8412, 29.3319, 28.9988,
    31.2270, 30.2180, 29.6307, 29.2464,
    31.7402, 30.5978, 29.9321, 29.4962,
    32.2449, 30.9718, 30.2292, 29.7455,
];
