// SPDX-License-Identifier: Apache-2.0
// Copyright © 2021 Will Ross
//! Ambient temperature estimation and per-pixel temperature compensation.

// Various floating point operations are not implemented in core, so we use libm to provide them as
// needed.
#[cfg_attr(feature = "std", allow(unused_imports))]
use num_traits::Float;

use crate::address::NUM_PIXELS;
use crate::eeprom::CalibrationTable;
use crate::frame::{RawIrFrame, TemperatureFrame};
use crate::register::Resolution;

/// Constant needed a few times for the final pixel temperature calculations.
pub const KELVINS_TO_CELSIUS: f32 = 273.15;

/// Estimate the temperature of the sensor itself from the raw PTAT value.
///
/// This solves the quadratic `K_T2·(Ta - 25)² + K_T1·(Ta - 25) = PTAT - V_th` for the positive
/// root, with V<sub>th</sub>, K<sub>T1</sub> and K<sub>T2</sub> each divided by the resolution
/// correction first. If the discriminant is negative (or the correction is zero) the result is not
/// finite, and callers need to check for that with [`is_plausible_ambient`] or similar.
pub fn estimate(ptat: u16, table: &CalibrationTable, resolution: Resolution) -> f32 {
    let correction = resolution.correction();
    let v_th = table.v_th() / correction;
    let k_t1 = table.k_t1() / correction;
    let k_t2 = table.k_t2() / correction;
    let discriminant = k_t1.powi(2) - 4f32 * k_t2 * (v_th - f32::from(ptat));
    (-k_t1 + discriminant.sqrt()) / (2f32 * k_t2) + 25f32
}

/// Check an ambient temperature against an upper limit (in ℃).
///
/// Anything non-finite is implausible, as is anything over the limit. Values that high come from a
/// bad calibration read, not the environment.
pub fn is_plausible_ambient(ambient: f32, limit: f32) -> bool {
    ambient.is_finite() && ambient <= limit
}

/// The values shared by every pixel in a frame.
#[derive(Clone, Copy, Debug, PartialEq)]
struct CommonPixelData {
    /// `Ta - 25`.
    ambient_delta: f32,

    /// The offset compensated compensation pixel, already multiplied by the TGC.
    compensation_pixel: f32,

    /// α<sub>CP</sub> multiplied by the TGC.
    compensation_sensitivity: f32,

    /// `(Ta + 273.15)⁴`.
    ambient_kelvin_4: f32,

    emissivity: f32,
}

impl CommonPixelData {
    fn new(
        compensation_pixel: i16,
        ambient: f32,
        table: &CalibrationTable,
        resolution: Resolution,
        emissivity: f32,
    ) -> Self {
        let correction = resolution.correction();
        let ambient_delta = ambient - 25f32;
        let tgc = table.thermal_gradient_coefficient();
        let a_cp = table.compensation_pixel_offset() / correction;
        let b_cp = table.compensation_pixel_offset_slope() / correction;
        let alpha_cp = table.compensation_pixel_sensitivity() / correction;
        let v_cp_offset = f32::from(compensation_pixel) - (a_cp + b_cp * ambient_delta);
        Self {
            ambient_delta,
            compensation_pixel: tgc * v_cp_offset,
            compensation_sensitivity: tgc * alpha_cp,
            ambient_kelvin_4: (ambient + KELVINS_TO_CELSIUS).powi(4),
            emissivity,
        }
    }
}

/// Divide a set of per-pixel constants by the resolution correction.
fn resolution_corrected(values: &[f32; NUM_PIXELS], correction: f32) -> [f32; NUM_PIXELS] {
    let mut corrected = *values;
    corrected.iter_mut().for_each(|value| *value /= correction);
    corrected
}

/// The per-pixel calculations to go from a raw measurement to a temperature.
///
/// The pixel constants have already been divided by the resolution correction.
fn per_pixel_temperature(
    ir: i16,
    offset: f32,
    offset_slope: f32,
    sensitivity: f32,
    common: &CommonPixelData,
) -> f32 {
    let v_offset = f32::from(ir) - (offset + offset_slope * common.ambient_delta);
    let v_tgc = v_offset - common.compensation_pixel;
    let v_normalized = v_tgc / (sensitivity - common.compensation_sensitivity);
    let v_compensated = v_normalized / common.emissivity;
    (v_compensated + common.ambient_kelvin_4).powf(0.25) - KELVINS_TO_CELSIUS
}

/// Compute the object temperature for every pixel using the emissivity from the calibration data.
pub fn compensate(
    ir: &RawIrFrame,
    compensation_pixel: i16,
    ambient: f32,
    table: &CalibrationTable,
    resolution: Resolution,
) -> TemperatureFrame {
    compensate_with_emissivity(
        ir,
        compensation_pixel,
        ambient,
        table,
        resolution,
        table.emissivity(),
    )
}

/// Compute the object temperature for every pixel.
///
/// Every pixel gets a value, even if it isn't finite. Nothing is clamped or interpolated.
pub fn compensate_with_emissivity(
    ir: &RawIrFrame,
    compensation_pixel: i16,
    ambient: f32,
    table: &CalibrationTable,
    resolution: Resolution,
    emissivity: f32,
) -> TemperatureFrame {
    let common = CommonPixelData::new(compensation_pixel, ambient, table, resolution, emissivity);
    let correction = resolution.correction();
    let offsets = resolution_corrected(table.pixel_offsets(), correction);
    let offset_slopes = resolution_corrected(table.pixel_offset_slopes(), correction);
    let sensitivities = resolution_corrected(table.pixel_sensitivities(), correction);
    let mut temperatures = [0f32; NUM_PIXELS];
    temperatures
        .iter_mut()
        .zip(ir.pixels().iter())
        .zip(offsets.iter())
        .zip(offset_slopes.iter())
        .zip(sensitivities.iter())
        .for_each(|((((output, ir), offset), slope), sensitivity)| {
            *output = per_pixel_temperature(*ir, *offset, *slope, *sensitivity, &common);
        });
    TemperatureFrame::from_celsius(temperatures)
}

#[cfg(test)]
mod test {
    use float_cmp::{approx_eq, assert_approx_eq};

    use mlx90621_test_data::*;

    use crate::eeprom::CalibrationTable;
    use crate::frame::{quantize, RawIrFrame};
    use crate::register::Resolution;

    use super::*;

    fn fixture_table() -> CalibrationTable {
        CalibrationTable::from_data(&fixture_eeprom())
    }

    /// A calibration where everything is either zero or one, so the only thing left is the
    /// radiative law.
    fn identity_table() -> CalibrationTable {
        let mut eeprom = [0u8; 256];
        // B_i and B_CP are divided by this scale, so it can't be 0.
        eeprom[0xD9] = 0x11;
        // Both K_T scales, to keep estimate() finite.
        eeprom[0xD2] = 0x10;
        // α_0 = 1, α_0 scale = 1, Δα scale = 1
        eeprom[0xE0] = 0x01;
        eeprom[0xE2] = 0x01;
        eeprom[0xE3] = 0x01;
        // Emissivity of 1
        eeprom[0xE5] = 0x80;
        CalibrationTable::from_data(&eeprom)
    }

    #[test]
    fn ambient_temperature() {
        let table = fixture_table();
        let t_a = estimate(FIXTURE_PTAT, &table, Resolution::Sixteen);
        assert_approx_eq!(f32, t_a, FIXTURE_AMBIENT, epsilon = 1e-3);
    }

    #[test]
    fn ambient_at_v_th() {
        // When PTAT is exactly V_th, the ambient temperature is exactly 25℃.
        let table = fixture_table();
        let t_a = estimate(6700 / 4, &table, Resolution::Sixteen);
        assert_approx_eq!(f32, t_a, 25.0, epsilon = 1e-4);
        let t_a = estimate(6700, &table, Resolution::Seventeen);
        assert_approx_eq!(f32, t_a, 25.0, epsilon = 1e-4);
    }

    #[test]
    fn ambient_negative_discriminant() {
        let table = fixture_table();
        let t_a = estimate(FIXTURE_IMPLAUSIBLE_PTAT, &table, Resolution::Sixteen);
        assert!(t_a.is_nan());
        assert!(!is_plausible_ambient(t_a, 350.0));
    }

    #[test]
    fn ambient_eighteen_bit_not_finite() {
        let table = fixture_table();
        let t_a = estimate(FIXTURE_PTAT, &table, Resolution::Eighteen);
        assert!(!t_a.is_finite());
    }

    #[test]
    fn plausibility() {
        assert!(is_plausible_ambient(25.0, 350.0));
        assert!(is_plausible_ambient(350.0, 350.0));
        assert!(!is_plausible_ambient(350.5, 350.0));
        assert!(!is_plausible_ambient(f32::INFINITY, 350.0));
        assert!(!is_plausible_ambient(f32::NAN, 350.0));
    }

    #[test]
    fn fixture_temperatures() {
        let table = fixture_table();
        let ir = RawIrFrame::new(fixture_ir_data());
        let frame = compensate(
            &ir,
            FIXTURE_COMPENSATION_PIXEL,
            FIXTURE_AMBIENT,
            &table,
            Resolution::Sixteen,
        );
        for (index, (actual, expected)) in frame
            .celsius()
            .iter()
            .zip(FIXTURE_TEMPERATURES.iter())
            .enumerate()
        {
            assert!(
                approx_eq!(f32, *actual, *expected, epsilon = 1e-2),
                "Pixel {}: expected {}, got {}",
                index,
                expected,
                actual
            );
        }
        for (celsius, quantized) in frame.celsius().iter().zip(frame.quantized().iter()) {
            assert_eq!(*quantized, ((celsius + 273.15) * 10.0).round() as u16);
        }
    }

    #[test]
    fn emissivity_override() {
        let table = fixture_table();
        let ir = RawIrFrame::new(fixture_ir_data());
        let default = compensate(
            &ir,
            FIXTURE_COMPENSATION_PIXEL,
            FIXTURE_AMBIENT,
            &table,
            Resolution::Sixteen,
        );
        let explicit = compensate_with_emissivity(
            &ir,
            FIXTURE_COMPENSATION_PIXEL,
            FIXTURE_AMBIENT,
            &table,
            Resolution::Sixteen,
            table.emissivity(),
        );
        assert_eq!(default, explicit);
        let lower = compensate_with_emissivity(
            &ir,
            FIXTURE_COMPENSATION_PIXEL,
            FIXTURE_AMBIENT,
            &table,
            Resolution::Sixteen,
            0.5,
        );
        // Lower emissivity pushes everything further from ambient. The last pixel is well above
        // ambient in the fixture.
        assert!(lower.celsius()[63] > default.celsius()[63]);
    }

    #[test]
    fn golden_identity() {
        let table = identity_table();
        let ir = RawIrFrame::new([120; NUM_PIXELS]);
        let frame = compensate(&ir, 0, 25.0, &table, Resolution::Seventeen);
        let expected = (120f64 + (25f64 + 273.15).powi(4)).powf(0.25) - 273.15;
        for temperature in frame.celsius() {
            assert_approx_eq!(f32, *temperature, expected as f32, epsilon = 1e-3);
        }
        for (celsius, quantized) in frame.celsius().iter().zip(frame.quantized().iter()) {
            assert_eq!(*quantized, quantize(*celsius));
        }
    }

    #[test]
    fn resolution_changes_scaling() {
        // Lowering the resolution (higher correction) has to change the result, as the stored
        // table does not bake the resolution in.
        let table = fixture_table();
        let ir = RawIrFrame::new(fixture_ir_data());
        let sixteen = compensate(&ir, -25, FIXTURE_AMBIENT, &table, Resolution::Sixteen);
        let fifteen = compensate(&ir, -25, FIXTURE_AMBIENT, &table, Resolution::Fifteen);
        assert_ne!(sixteen.celsius(), fifteen.celsius());
    }

    #[test]
    fn pixel_constants_corrected() {
        let table = fixture_table();
        let correction = Resolution::Sixteen.correction();
        let offsets = resolution_corrected(table.pixel_offsets(), correction);
        for (corrected, raw) in offsets.iter().zip(table.pixel_offsets().iter()) {
            assert_approx_eq!(f32, *corrected * 4.0, *raw);
        }
        // The table itself is left as decoded.
        assert_eq!(table, fixture_table());
    }

    #[test]
    fn degenerate_denominator() {
        // Zero sensitivity means dividing by zero, but a full frame still comes out.
        let mut eeprom = fixture_eeprom();
        eeprom[0xE0] = 0;
        eeprom[0xE1] = 0;
        eeprom[0x80..0xC0].iter_mut().for_each(|b| *b = 0);
        eeprom[0xD8] = 0;
        let table = CalibrationTable::from_data(&eeprom);
        let ir = RawIrFrame::new(fixture_ir_data());
        let frame = compensate(&ir, -25, FIXTURE_AMBIENT, &table, Resolution::Sixteen);
        assert_eq!(frame.celsius().len(), NUM_PIXELS);
        assert!(frame.celsius().iter().any(|t| !t.is_finite()));
    }
}
