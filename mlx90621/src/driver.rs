// SPDX-License-Identifier: Apache-2.0
// Copyright © 2021 Will Ross

use embedded_hal::blocking::i2c;
use log::{debug, info};
use paste::paste;

use crate::address::BusAddresses;
use crate::calculations::{compensate_with_emissivity, estimate};
use crate::eeprom::{CalibrationTable, FromI2C};
use crate::error::Error;
use crate::frame::{RawIrFrame, TemperatureFrame};
use crate::register::*;
use crate::transport;

/// DRY macro for the set_* methods in `Mlx90621` that modify a configuration register field.
macro_rules! set_register_field {
    { $register_access:ident, $field:ident, $typ:ty, $doc:literal } => {
    paste! {
        #[doc = $doc]
        pub fn [< set_ $field >](&mut self, new_value: $typ) -> Result<(), Error<I2C>> {
            let mut current = self.$register_access()?;
            if current.$field() != new_value {
                current.[< set_ $field >](new_value);
                self.[< set_ $register_access >](current)
            } else {
                Ok(())
            }
        }
    }};
}

/// Driver for the MLX90621 16x4 thermopile array.
///
/// Creating the driver runs the full start up sequence: the calibration EEPROM is read, the
/// oscillator trim and configuration from it are written to the sensor, and the requested refresh
/// rate is set. The same sequence is needed again whenever the sensor resets (see
/// [`brown_out_detected`][Mlx90621::brown_out_detected]), which
/// [`reinitialize`][Mlx90621::reinitialize] takes care of.
#[derive(Clone, Debug)]
pub struct Mlx90621<I2C> {
    /// The I²C bus this sensor is accessible on.
    bus: I2C,

    /// The I²C addresses of the EEPROM and the sensor.
    addresses: BusAddresses,

    /// The factory calibration data, replaced as a whole on every reinitialization.
    calibration: CalibrationTable,

    /// The most recently read (or written) configuration register.
    config: DeviceConfig,

    /// The refresh rate to restore when reinitializing.
    refresh_rate: RefreshRate,

    /// The most recent ambient temperature calculation.
    ambient_temperature: Option<f32>,

    /// An emissivity to use instead of the one in the calibration data.
    emissivity_override: Option<f32>,
}

impl<I2C> Mlx90621<I2C>
where
    I2C: i2c::WriteRead + i2c::Write,
{
    /// Create a new driver, initializing the sensor at the given addresses.
    pub fn new(
        bus: I2C,
        addresses: BusAddresses,
        refresh_rate: RefreshRate,
    ) -> Result<Self, Error<I2C>> {
        let mut bus = bus;
        let calibration = CalibrationTable::from_i2c(&mut bus, addresses.eeprom)?;
        let mut driver = Self {
            bus,
            addresses,
            config: calibration.configuration(),
            calibration,
            refresh_rate,
            ambient_temperature: None,
            emissivity_override: None,
        };
        driver.configure()?;
        Ok(driver)
    }

    /// Write the trim and configuration values from the current calibration data to the sensor.
    fn configure(&mut self) -> Result<(), Error<I2C>> {
        // Writing the factory configuration resets the refresh rate, so save the one wanted.
        let refresh_rate = self.refresh_rate;
        let trim = OscillatorTrim(self.calibration.oscillator_trim());
        transport::write_register(&mut self.bus, self.addresses.device, trim)?;
        let mut config = self.calibration.configuration();
        // Setting the POR flag is how a later reset is detected.
        config.set_por_flag(true);
        self.write_config(config)?;
        // The remembered rate is only changed by callers, so a failure partway through leaves it
        // intact for the next attempt.
        let mut config = self.config()?;
        if config.refresh_rate() != refresh_rate {
            config.set_refresh_rate(refresh_rate);
            self.write_config(config)?;
        }
        let config = self.config()?;
        info!(
            "MLX90621 configured: {:?} at {}Hz, {} bit ADC, trim {:#04x}",
            self.addresses,
            f32::from(config.refresh_rate()),
            u8::from(config.resolution()),
            trim.value()
        );
        Ok(())
    }

    /// Reload the calibration data and run the start up sequence again.
    ///
    /// The cached ambient temperature is cleared, as it was computed from the old calibration.
    pub fn reinitialize(&mut self) -> Result<(), Error<I2C>> {
        self.calibration = CalibrationTable::from_i2c(&mut self.bus, self.addresses.eeprom)?;
        self.ambient_temperature = None;
        self.configure()
    }

    /// Read the configuration register.
    pub fn config(&mut self) -> Result<DeviceConfig, Error<I2C>> {
        let register: DeviceConfig =
            transport::read_register(&mut self.bus, self.addresses.device)?;
        self.config = register;
        Ok(register)
    }

    /// Write the configuration register.
    ///
    /// The refresh rate written here is the one restored by [`reinitialize`][Self::reinitialize].
    pub fn set_config(&mut self, register: DeviceConfig) -> Result<(), Error<I2C>> {
        self.write_config(register)?;
        self.refresh_rate = register.refresh_rate();
        Ok(())
    }

    fn write_config(&mut self, register: DeviceConfig) -> Result<(), Error<I2C>> {
        debug!("Writing configuration {:?}", register);
        transport::write_register(&mut self.bus, self.addresses.device, register)?;
        self.config = register;
        Ok(())
    }

    /// The configuration register as of the last read or write, without touching the bus.
    pub fn cached_config(&self) -> DeviceConfig {
        self.config
    }

    pub fn refresh_rate(&mut self) -> Result<RefreshRate, Error<I2C>> {
        Ok(self.config()?.refresh_rate())
    }

    pub fn resolution(&mut self) -> Result<Resolution, Error<I2C>> {
        Ok(self.config()?.resolution())
    }

    set_register_field! {
        config,
        refresh_rate,
        RefreshRate,
        "Set how often the sensor takes a measurement. Other configuration bits are untouched."
    }

    set_register_field! {
        config,
        resolution,
        Resolution,
        "Set the ADC resolution. Other configuration bits are untouched."
    }

    /// Check if the sensor has reset since it was last configured.
    pub fn brown_out_detected(&mut self) -> Result<bool, Error<I2C>> {
        Ok(self.config()?.brown_out_detected())
    }

    /// Read back the oscillator trim value from the sensor.
    pub fn trim(&mut self) -> Result<u8, Error<I2C>> {
        let trim: OscillatorTrim = transport::read_register(&mut self.bus, self.addresses.device)?;
        Ok(trim.value())
    }

    /// The calibration data in use.
    pub fn calibration(&self) -> &CalibrationTable {
        &self.calibration
    }

    pub fn addresses(&self) -> BusAddresses {
        self.addresses
    }

    /// Read PTAT and calculate the ambient temperature from it.
    ///
    /// The result is cached (see [`ambient_temperature`][Mlx90621::ambient_temperature]) even
    /// when it isn't plausible, as the caller decides what to do with implausible values.
    pub fn measure_ambient(&mut self) -> Result<f32, Error<I2C>> {
        let resolution = self.config()?.resolution();
        let ptat = transport::read_ptat(&mut self.bus, self.addresses.device)?;
        let ambient = estimate(ptat, &self.calibration, resolution);
        debug!("PTAT {} gives an ambient temperature of {}℃", ptat, ambient);
        self.ambient_temperature = Some(ambient);
        Ok(ambient)
    }

    /// Get the most recent ambient temperature calculation.
    ///
    /// This is `None` until [`measure_ambient`][Mlx90621::measure_ambient] has been called (and
    /// again after a reinitialization).
    pub fn ambient_temperature(&self) -> Option<f32> {
        self.ambient_temperature
    }

    /// Get the emissivity value that is being used for calculations currently.
    ///
    /// The default comes from the calibration data, but can be
    /// [overridden][Mlx90621::override_emissivity]. The override is not stored on the sensor.
    pub fn effective_emissivity(&self) -> f32 {
        self.emissivity_override
            .unwrap_or_else(|| self.calibration.emissivity())
    }

    /// Override the emissivity value used in temperature calculations.
    pub fn override_emissivity(&mut self, new_value: f32) {
        self.emissivity_override = Some(new_value);
    }

    /// Go back to using the emissivity from the calibration data.
    pub fn use_default_emissivity(&mut self) {
        self.emissivity_override = None;
    }

    pub fn read_compensation_pixel(&mut self) -> Result<i16, Error<I2C>> {
        transport::read_compensation_pixel(&mut self.bus, self.addresses.device)
    }

    pub fn read_ir_frame(&mut self) -> Result<RawIrFrame, Error<I2C>> {
        transport::read_ir_frame(&mut self.bus, self.addresses.device)
    }

    /// Turn raw readings into temperatures, using the cached configuration's resolution.
    pub fn compensate(
        &self,
        ir: &RawIrFrame,
        compensation_pixel: i16,
        ambient: f32,
    ) -> TemperatureFrame {
        compensate_with_emissivity(
            ir,
            compensation_pixel,
            ambient,
            &self.calibration,
            self.config.resolution(),
            self.effective_emissivity(),
        )
    }

    /// Read a full frame from the sensor and calculate the temperatures.
    ///
    /// The configuration is read first, so a resolution change made elsewhere is picked up.
    pub fn generate_frame(&mut self, ambient: f32) -> Result<TemperatureFrame, Error<I2C>> {
        self.config()?;
        let compensation_pixel = self.read_compensation_pixel()?;
        let ir = self.read_ir_frame()?;
        Ok(self.compensate(&ir, compensation_pixel, ambient))
    }

    /// Give the bus back.
    pub fn release(self) -> I2C {
        self.bus
    }
}
