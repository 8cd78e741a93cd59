// SPDX-License-Identifier: Apache-2.0
// Copyright © 2021 Will Ross
//! Per-frame data: the raw IR readings in, and the temperatures out.

// Various floating point operations are not implemented in core, so we use libm to provide them as
// needed.
#[cfg_attr(feature = "std", allow(unused_imports))]
use num_traits::Float;

use crate::address::{HEIGHT, NUM_PIXELS, WIDTH};
use crate::calculations::KELVINS_TO_CELSIUS;
use crate::util::{Buffer, WORD_SIZE};

/// The number of bytes in an encoded [`TemperatureFrame`].
pub const FRAME_LENGTH: usize = NUM_PIXELS * WORD_SIZE;

/// The 64 raw IR values as read from the sensor.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RawIrFrame {
    pixels: [i16; NUM_PIXELS],
}

impl RawIrFrame {
    pub fn new(pixels: [i16; NUM_PIXELS]) -> Self {
        Self { pixels }
    }

    /// Decode the IR frame from the bytes read off of the sensor (low byte first for each pixel).
    pub fn from_bytes(bytes: &[u8; FRAME_LENGTH]) -> Self {
        let mut pixels = [0i16; NUM_PIXELS];
        let mut buf = &bytes[..];
        for pixel in pixels.iter_mut() {
            *pixel = buf.get_i16_le();
        }
        Self { pixels }
    }

    pub fn pixels(&self) -> &[i16; NUM_PIXELS] {
        &self.pixels
    }
}

/// Convert a temperature to the fixed point representation used on the wire, tenths of a Kelvin.
///
/// Values that don't fit (including non-finite ones) saturate to the edges of `u16`, with NaN
/// mapping to 0.
pub fn quantize(celsius: f32) -> u16 {
    ((celsius + KELVINS_TO_CELSIUS) * 10f32).round() as u16
}

/// The inverse of [`quantize`].
pub fn dequantize(quantized: u16) -> f32 {
    f32::from(quantized) / 10f32 - KELVINS_TO_CELSIUS
}

/// A full frame of object temperatures.
///
/// The pixels are kept in the order the sensor delivers them: column by column, so pixel `i` is at
/// row `i % 4` and column `i / 4`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TemperatureFrame {
    celsius: [f32; NUM_PIXELS],
    quantized: [u16; NUM_PIXELS],
}

/// A quick summary of a frame, mostly for logging.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FrameSummary {
    pub min: f32,
    pub max: f32,
    pub mean: f32,
}

impl TemperatureFrame {
    /// Build a frame from temperatures in degrees Celsius, computing the quantized values.
    pub fn from_celsius(celsius: [f32; NUM_PIXELS]) -> Self {
        let mut quantized = [0u16; NUM_PIXELS];
        quantized
            .iter_mut()
            .zip(celsius.iter())
            .for_each(|(output, temperature)| *output = quantize(*temperature));
        Self { celsius, quantized }
    }

    /// Decode a frame from its 128 byte wire representation.
    ///
    /// The Celsius values are reconstructed from the quantized values, so they are only accurate
    /// to 0.05°C.
    pub fn from_bytes(bytes: &[u8; FRAME_LENGTH]) -> Self {
        let mut quantized = [0u16; NUM_PIXELS];
        let mut buf = &bytes[..];
        for value in quantized.iter_mut() {
            *value = buf.get_u16_le();
        }
        let mut celsius = [0f32; NUM_PIXELS];
        celsius
            .iter_mut()
            .zip(quantized.iter())
            .for_each(|(output, value)| *output = dequantize(*value));
        Self { celsius, quantized }
    }

    /// Encode the frame as 64 little-endian `u16`s, the format consumers of the daemon read.
    pub fn to_bytes(&self) -> [u8; FRAME_LENGTH] {
        let mut bytes = [0u8; FRAME_LENGTH];
        bytes
            .chunks_exact_mut(WORD_SIZE)
            .zip(self.quantized.iter())
            .for_each(|(chunk, value)| chunk.copy_from_slice(&value.to_le_bytes()));
        bytes
    }

    pub fn celsius(&self) -> &[f32; NUM_PIXELS] {
        &self.celsius
    }

    pub fn quantized(&self) -> &[u16; NUM_PIXELS] {
        &self.quantized
    }

    /// The temperature at a given row and column, if both are in range.
    pub fn get(&self, row: usize, column: usize) -> Option<f32> {
        if row < HEIGHT && column < WIDTH {
            Some(self.celsius[column * HEIGHT + row])
        } else {
            None
        }
    }

    /// One row of 16 pixels, left to right.
    ///
    /// Panics if `row` is 4 or more.
    pub fn row(&self, row: usize) -> [f32; WIDTH] {
        assert!(row < HEIGHT, "There are only {} rows", HEIGHT);
        let mut output = [0f32; WIDTH];
        self.celsius
            .iter()
            .skip(row)
            .step_by(HEIGHT)
            .zip(output.iter_mut())
            .for_each(|(temperature, out)| *out = *temperature);
        output
    }

    /// One column of 4 pixels, top to bottom.
    ///
    /// Panics if `column` is 16 or more.
    pub fn column(&self, column: usize) -> [f32; HEIGHT] {
        assert!(column < WIDTH, "There are only {} columns", WIDTH);
        let mut output = [0f32; HEIGHT];
        let start = column * HEIGHT;
        output.copy_from_slice(&self.celsius[start..(start + HEIGHT)]);
        output
    }

    pub fn summary(&self) -> FrameSummary {
        let (min, max, sum) = self.celsius.iter().fold(
            (f32::INFINITY, f32::NEG_INFINITY, 0f32),
            |(min, max, sum), temperature| {
                (min.min(*temperature), max.max(*temperature), sum + temperature)
            },
        );
        FrameSummary {
            min,
            max,
            mean: sum / NUM_PIXELS as f32,
        }
    }
}

#[cfg(test)]
mod test {
    use float_cmp::assert_approx_eq;

    use super::*;

    fn sample_frame() -> TemperatureFrame {
        let mut celsius = [0f32; NUM_PIXELS];
        celsius
            .iter_mut()
            .enumerate()
            .for_each(|(index, value)| *value = 20.0 + index as f32 * 0.37);
        TemperatureFrame::from_celsius(celsius)
    }

    #[test]
    fn raw_frame_little_endian() {
        let mut bytes = [0u8; FRAME_LENGTH];
        bytes[0] = 0x78;
        bytes[1] = 0x00;
        bytes[2] = 0xff;
        bytes[3] = 0xff;
        bytes[126] = 0x00;
        bytes[127] = 0x80;
        let frame = RawIrFrame::from_bytes(&bytes);
        assert_eq!(frame.pixels()[0], 120);
        assert_eq!(frame.pixels()[1], -1);
        assert_eq!(frame.pixels()[63], i16::MIN);
    }

    #[test]
    fn quantize_values() {
        assert_eq!(quantize(26.85), 3000);
        assert_eq!(quantize(-273.15), 0);
        assert_eq!(quantize(26.89), 3000);
        // Rounded, not truncated.
        assert_eq!(quantize(26.91), 3001);
        // Out of range values saturate.
        assert_eq!(quantize(-300.0), 0);
        assert_eq!(quantize(f32::INFINITY), u16::MAX);
        assert_eq!(quantize(f32::NAN), 0);
    }

    #[test]
    fn bytes_round_trip_within_tenth() {
        let frame = sample_frame();
        let decoded = TemperatureFrame::from_bytes(&frame.to_bytes());
        assert_eq!(decoded.quantized(), frame.quantized());
        for (original, recovered) in frame.celsius().iter().zip(decoded.celsius().iter()) {
            assert!(
                (original - recovered).abs() < 0.1,
                "{} decoded as {}",
                original,
                recovered
            );
        }
    }

    #[test]
    fn wire_format() {
        let frame = sample_frame();
        let bytes = frame.to_bytes();
        let first = u16::from_le_bytes([bytes[0], bytes[1]]);
        assert_eq!(first, frame.quantized()[0]);
        let last = u16::from_le_bytes([bytes[126], bytes[127]]);
        assert_eq!(last, quantize(frame.celsius()[63]));
    }

    #[test]
    fn layout() {
        let frame = sample_frame();
        // Pixel 5 is the second pixel of the second column.
        assert_eq!(frame.get(1, 1), Some(frame.celsius()[5]));
        assert_eq!(frame.get(4, 0), None);
        assert_eq!(frame.get(0, 16), None);
        let row = frame.row(2);
        assert_eq!(row[0], frame.celsius()[2]);
        assert_eq!(row[15], frame.celsius()[62]);
        let column = frame.column(15);
        assert_eq!(column[..], frame.celsius()[60..]);
    }

    #[test]
    fn summary() {
        let summary = sample_frame().summary();
        assert_approx_eq!(f32, summary.min, 20.0);
        assert_approx_eq!(f32, summary.max, 20.0 + 63.0 * 0.37, epsilon = 1e-4);
        assert_approx_eq!(f32, summary.mean, 20.0 + 31.5 * 0.37, epsilon = 1e-4);
    }
}
