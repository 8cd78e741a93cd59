// SPDX-License-Identifier: Apache-2.0
// Copyright © 2021 Will Ross
//! Sequencing the sensor: start up, ambient temperature, and one frame per tick.
//!
//! [`AcquisitionLoop`] owns the sensor for its whole lifetime and walks it through
//! [`AcquisitionState`]. It handles the two ways the MLX90621 is known to misbehave: an implausible
//! ambient temperature right after start up (usually a bad EEPROM read), and resets from a
//! brown-out, which wipe the configuration.
#[cfg(feature = "std")]
extern crate std;

use core::convert::Infallible;
use core::fmt;
use core::sync::atomic::{AtomicBool, Ordering};

use embedded_hal::blocking::delay::DelayMs;
use embedded_hal::blocking::i2c;
use log::{debug, info, warn};

use crate::address::BusAddresses;
use crate::calculations::is_plausible_ambient;
use crate::driver::Mlx90621;
use crate::error::Error;
use crate::frame::TemperatureFrame;
use crate::register::RefreshRate;

/// Where an [`AcquisitionLoop`] is in its life.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum AcquisitionState {
    /// Created, but nothing has been sent to the sensor yet.
    Uninitialized,

    /// Running the start up sequence.
    Initializing,

    /// Configured, with an ambient temperature, and waiting for the next tick.
    Ready,

    /// Reading a frame.
    Acquiring,

    /// Something failed that can't be recovered from. No more frames will be read.
    Faulted,
}

/// What to do when the ambient temperature is still implausible after every retry.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum AmbientFallback {
    /// Carry on with the last value computed, even though it's implausible.
    UseLastComputed,

    /// Carry on with the last plausible value from an earlier estimate, failing if there never
    /// was one.
    KeepLastGood,

    /// Fail with [`AcquisitionError::AmbientOutOfRange`].
    Refuse,
}

impl Default for AmbientFallback {
    fn default() -> Self {
        Self::UseLastComputed
    }
}

/// Tuning for an [`AcquisitionLoop`]. All durations are in milliseconds.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AcquisitionSettings {
    /// The refresh rate to configure the sensor with.
    pub refresh_rate: RefreshRate,

    /// Pause before talking to the sensor for the first time.
    pub startup_delay: u32,

    /// Ambient temperatures above this (in ℃) are treated as a calibration failure.
    pub ambient_limit: f32,

    /// How many times to reinitialize and try again when the ambient temperature is implausible.
    pub ambient_retries: u32,

    /// Pause before each of those retries.
    pub ambient_retry_pause: u32,

    pub ambient_fallback: AmbientFallback,

    /// Pause between reinitialization attempts while the sensor reports a brown-out.
    pub brown_out_pause: u32,

    /// Give up after this many reinitialization attempts. `None` waits forever (or until
    /// cancelled).
    pub brown_out_max_attempts: Option<u32>,

    /// Pause after delivering each frame.
    pub frame_interval: u32,
}

impl Default for AcquisitionSettings {
    fn default() -> Self {
        Self {
            refresh_rate: RefreshRate::Four,
            startup_delay: 5,
            ambient_limit: 350.0,
            ambient_retries: 2,
            ambient_retry_pause: 10,
            ambient_fallback: AmbientFallback::default(),
            brown_out_pause: 1000,
            brown_out_max_attempts: None,
            frame_interval: 100,
        }
    }
}

/// Somewhere for finished frames to go.
pub trait FrameSink {
    type Error;

    /// Hand off a frame. The frame should be delivered whole or not at all.
    fn deliver(&mut self, frame: &TemperatureFrame) -> Result<(), Self::Error>;
}

/// Errors from an [`AcquisitionLoop`].
///
/// `S` is the error type of the [`FrameSink`], for errors from [`AcquisitionLoop::run`].
pub enum AcquisitionError<I2C, S = Infallible>
where
    I2C: i2c::WriteRead + i2c::Write,
{
    /// The start up sequence failed.
    Initialization(Error<I2C>),

    /// A bus transaction other than the IR frame read failed.
    Bus(Error<I2C>),

    /// Reading the IR frame failed. This is not retried.
    IrRead(Error<I2C>),

    /// The ambient temperature (in ℃) was still implausible after every retry, and the fallback
    /// policy didn't allow carrying on.
    AmbientOutOfRange(f32),

    /// The sensor still reported a brown-out after this many reinitialization attempts.
    BrownOutPersisted(u32),

    /// The loop is in the [faulted][AcquisitionState::Faulted] state.
    Faulted,

    /// The cancellation flag was set while waiting on the sensor.
    Cancelled,

    /// The frame sink failed.
    Delivery(S),
}

impl<I2C, S> AcquisitionError<I2C, S>
where
    I2C: i2c::WriteRead + i2c::Write,
{
    /// Check if this error should stop the process with a failure status.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::Cancelled)
    }
}

impl<I2C> AcquisitionError<I2C, Infallible>
where
    I2C: i2c::WriteRead + i2c::Write,
{
    /// Change the sink error type, which is possible as there can't be a delivery error yet.
    fn with_sink<S>(self) -> AcquisitionError<I2C, S> {
        match self {
            Self::Initialization(err) => AcquisitionError::Initialization(err),
            Self::Bus(err) => AcquisitionError::Bus(err),
            Self::IrRead(err) => AcquisitionError::IrRead(err),
            Self::AmbientOutOfRange(ambient) => AcquisitionError::AmbientOutOfRange(ambient),
            Self::BrownOutPersisted(attempts) => AcquisitionError::BrownOutPersisted(attempts),
            Self::Faulted => AcquisitionError::Faulted,
            Self::Cancelled => AcquisitionError::Cancelled,
            Self::Delivery(never) => match never {},
        }
    }
}

// Custom Debug implementation so that I2C doesn't need to implement Debug.
impl<I2C, S> fmt::Debug for AcquisitionError<I2C, S>
where
    I2C: i2c::WriteRead + i2c::Write,
    <I2C as i2c::Write>::Error: fmt::Debug,
    <I2C as i2c::WriteRead>::Error: fmt::Debug,
    S: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Initialization(err) => f.debug_tuple("Initialization").field(err).finish(),
            Self::Bus(err) => f.debug_tuple("Bus").field(err).finish(),
            Self::IrRead(err) => f.debug_tuple("IrRead").field(err).finish(),
            Self::AmbientOutOfRange(ambient) => {
                f.debug_tuple("AmbientOutOfRange").field(ambient).finish()
            }
            Self::BrownOutPersisted(attempts) => {
                f.debug_tuple("BrownOutPersisted").field(attempts).finish()
            }
            Self::Faulted => f.write_str("Faulted"),
            Self::Cancelled => f.write_str("Cancelled"),
            Self::Delivery(err) => f.debug_tuple("Delivery").field(err).finish(),
        }
    }
}

impl<I2C, S> fmt::Display for AcquisitionError<I2C, S>
where
    I2C: i2c::WriteRead + i2c::Write,
    <I2C as i2c::Write>::Error: fmt::Debug,
    <I2C as i2c::WriteRead>::Error: fmt::Debug,
    S: fmt::Display,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Initialization(err) => write!(f, "sensor initialization failed: {}", err),
            Self::Bus(err) => write!(f, "sensor communication failed: {}", err),
            Self::IrRead(err) => write!(f, "could not read IR values: {}", err),
            Self::AmbientOutOfRange(ambient) => {
                write!(f, "ambient temperature out of range: {}℃", ambient)
            }
            Self::BrownOutPersisted(attempts) => write!(
                f,
                "sensor still browned out after {} reinitialization attempts",
                attempts
            ),
            Self::Faulted => f.write_str("acquisition has faulted"),
            Self::Cancelled => f.write_str("acquisition cancelled"),
            Self::Delivery(err) => write!(f, "frame delivery failed: {}", err),
        }
    }
}

#[cfg(feature = "std")]
impl<I2C, S> std::error::Error for AcquisitionError<I2C, S>
where
    I2C: i2c::WriteRead + i2c::Write + 'static,
    <I2C as i2c::Write>::Error: std::error::Error + 'static,
    <I2C as i2c::WriteRead>::Error: std::error::Error + 'static,
    S: std::error::Error + 'static,
{
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Initialization(err) | Self::Bus(err) | Self::IrRead(err) => Some(err),
            Self::Delivery(err) => Some(err),
            _ => None,
        }
    }
}

/// The sensor, before and after the driver has been set up.
#[derive(Debug)]
enum Sensor<I2C> {
    Unconfigured(I2C),
    Configured(Mlx90621<I2C>),
    /// The driver failed to come up, and took the bus with it.
    Lost,
}

/// Runs the MLX90621 from start up to a steady stream of frames.
///
/// One frame is read per call to [`acquire`][AcquisitionLoop::acquire], or continuously with
/// [`run`][AcquisitionLoop::run]. Everything is sequential and blocking; `D` provides the pauses.
#[derive(Debug)]
pub struct AcquisitionLoop<I2C, D> {
    sensor: Sensor<I2C>,
    addresses: BusAddresses,
    delay: D,
    settings: AcquisitionSettings,
    state: AcquisitionState,

    /// The ambient temperature frames are compensated with.
    ambient: Option<f32>,

    /// The most recent plausible ambient temperature.
    last_good_ambient: Option<f32>,

    /// How many retries the last ambient estimate needed.
    ambient_retries: u32,
}

impl<I2C, D> AcquisitionLoop<I2C, D>
where
    I2C: i2c::WriteRead + i2c::Write,
    D: DelayMs<u32>,
{
    pub fn new(bus: I2C, addresses: BusAddresses, delay: D, settings: AcquisitionSettings) -> Self {
        Self {
            sensor: Sensor::Unconfigured(bus),
            addresses,
            delay,
            settings,
            state: AcquisitionState::Uninitialized,
            ambient: None,
            last_good_ambient: None,
            ambient_retries: 0,
        }
    }

    /// Create a loop and run the start up sequence straight away.
    pub fn start(
        bus: I2C,
        addresses: BusAddresses,
        delay: D,
        settings: AcquisitionSettings,
    ) -> Result<Self, AcquisitionError<I2C>> {
        let mut acquisition = Self::new(bus, addresses, delay, settings);
        acquisition.initialize()?;
        Ok(acquisition)
    }

    pub fn state(&self) -> AcquisitionState {
        self.state
    }

    pub fn settings(&self) -> &AcquisitionSettings {
        &self.settings
    }

    /// The ambient temperature being used for compensation.
    pub fn ambient_temperature(&self) -> Option<f32> {
        self.ambient
    }

    /// How many reinitialize-and-retry rounds the most recent ambient estimate took.
    pub fn ambient_retries(&self) -> u32 {
        self.ambient_retries
    }

    /// The sensor driver, once it has been set up.
    pub fn driver(&self) -> Option<&Mlx90621<I2C>> {
        match &self.sensor {
            Sensor::Configured(driver) => Some(driver),
            _ => None,
        }
    }

    pub fn driver_mut(&mut self) -> Option<&mut Mlx90621<I2C>> {
        match &mut self.sensor {
            Sensor::Configured(driver) => Some(driver),
            _ => None,
        }
    }

    /// Run the start up sequence, then establish the ambient temperature.
    ///
    /// This can also be used to start over from a faulted state, as long as the driver was
    /// created.
    pub fn initialize(&mut self) -> Result<(), AcquisitionError<I2C>> {
        self.state = AcquisitionState::Initializing;
        let result = self.configure_sensor().and_then(|_| self.establish_ambient());
        self.state = match result {
            Ok(_) => AcquisitionState::Ready,
            Err(_) => AcquisitionState::Faulted,
        };
        result.map(|ambient| info!("Sensor ready, ambient temperature {:.2}℃", ambient))
    }

    fn configure_sensor(&mut self) -> Result<(), AcquisitionError<I2C>> {
        self.delay.delay_ms(self.settings.startup_delay);
        let sensor = core::mem::replace(&mut self.sensor, Sensor::Lost);
        let (sensor, result) = match sensor {
            Sensor::Unconfigured(bus) => {
                match Mlx90621::new(bus, self.addresses, self.settings.refresh_rate) {
                    Ok(driver) => (Sensor::Configured(driver), Ok(())),
                    Err(err) => (Sensor::Lost, Err(AcquisitionError::Initialization(err))),
                }
            }
            Sensor::Configured(mut driver) => {
                let result = driver
                    .reinitialize()
                    .map_err(AcquisitionError::Initialization);
                (Sensor::Configured(driver), result)
            }
            Sensor::Lost => (Sensor::Lost, Err(AcquisitionError::Faulted)),
        };
        self.sensor = sensor;
        result
    }

    /// Estimate the ambient temperature, retrying (with a reinitialization) if it's implausible.
    fn establish_ambient(&mut self) -> Result<f32, AcquisitionError<I2C>> {
        let settings = self.settings;
        let driver = match &mut self.sensor {
            Sensor::Configured(driver) => driver,
            _ => return Err(AcquisitionError::Faulted),
        };
        let mut ambient = driver.measure_ambient().map_err(AcquisitionError::Bus)?;
        let mut retries = 0;
        while !is_plausible_ambient(ambient, settings.ambient_limit)
            && retries < settings.ambient_retries
        {
            warn!(
                "Ambient temperature out of bounds (max {}℃): {}℃, reinitializing",
                settings.ambient_limit, ambient
            );
            self.delay.delay_ms(settings.ambient_retry_pause);
            driver
                .reinitialize()
                .map_err(AcquisitionError::Initialization)?;
            ambient = driver.measure_ambient().map_err(AcquisitionError::Bus)?;
            retries += 1;
        }
        self.ambient_retries = retries;
        if is_plausible_ambient(ambient, settings.ambient_limit) {
            self.last_good_ambient = Some(ambient);
            self.ambient = Some(ambient);
            return Ok(ambient);
        }
        let fallback = match settings.ambient_fallback {
            AmbientFallback::UseLastComputed => Some(ambient),
            AmbientFallback::KeepLastGood => self.last_good_ambient,
            AmbientFallback::Refuse => None,
        };
        match fallback {
            Some(value) => {
                warn!(
                    "Ambient temperature still implausible ({}℃) after {} retries, using {}℃",
                    ambient, retries, value
                );
                self.ambient = Some(value);
                Ok(value)
            }
            None => Err(AcquisitionError::AmbientOutOfRange(ambient)),
        }
    }

    /// Wait for the sensor to come back from a brown-out, reinitializing it each time.
    fn recover_from_brown_out(&mut self, cancel: &AtomicBool) -> Result<(), AcquisitionError<I2C>> {
        let settings = self.settings;
        let driver = match &mut self.sensor {
            Sensor::Configured(driver) => driver,
            _ => return Err(AcquisitionError::Faulted),
        };
        if !driver.brown_out_detected().map_err(AcquisitionError::Bus)? {
            return Ok(());
        }
        let mut attempts = 0;
        loop {
            if cancel.load(Ordering::SeqCst) {
                return Err(AcquisitionError::Cancelled);
            }
            if let Some(max_attempts) = settings.brown_out_max_attempts {
                if attempts >= max_attempts {
                    return Err(AcquisitionError::BrownOutPersisted(attempts));
                }
            }
            warn!("Brown-out detected, reinitializing (attempt {})", attempts + 1);
            self.delay.delay_ms(settings.brown_out_pause);
            attempts += 1;
            // The sensor may not answer at all while it's coming back up, which just counts as
            // another attempt.
            match driver.reinitialize() {
                Ok(_) => {
                    if !driver.brown_out_detected().map_err(AcquisitionError::Bus)? {
                        break;
                    }
                }
                Err(_) => debug!("Sensor did not respond to reinitialization"),
            }
        }
        info!("Recovered from brown-out after {} attempts", attempts);
        // The calibration was reloaded, so the ambient temperature is stale.
        self.establish_ambient().map(|_| ())
    }

    /// Read one frame.
    ///
    /// An uninitialized loop is initialized first. A faulted loop returns
    /// [`AcquisitionError::Faulted`] without touching the bus.
    pub fn acquire(&mut self, cancel: &AtomicBool) -> Result<TemperatureFrame, AcquisitionError<I2C>> {
        match self.state {
            AcquisitionState::Faulted => return Err(AcquisitionError::Faulted),
            AcquisitionState::Uninitialized => self.initialize()?,
            _ => (),
        }
        self.state = AcquisitionState::Acquiring;
        let result = self.read_frame(cancel);
        self.state = match &result {
            Ok(_) | Err(AcquisitionError::Cancelled) => AcquisitionState::Ready,
            Err(_) => AcquisitionState::Faulted,
        };
        result
    }

    fn read_frame(&mut self, cancel: &AtomicBool) -> Result<TemperatureFrame, AcquisitionError<I2C>> {
        self.recover_from_brown_out(cancel)?;
        let ambient = self.ambient.ok_or(AcquisitionError::Faulted)?;
        let driver = match &mut self.sensor {
            Sensor::Configured(driver) => driver,
            _ => return Err(AcquisitionError::Faulted),
        };
        let compensation_pixel = driver
            .read_compensation_pixel()
            .map_err(AcquisitionError::Bus)?;
        let ir = driver.read_ir_frame().map_err(AcquisitionError::IrRead)?;
        let frame = driver.compensate(&ir, compensation_pixel, ambient);
        let summary = frame.summary();
        debug!(
            "Frame: min {:.2}℃, max {:.2}℃, mean {:.2}℃ (ambient {:.2}℃)",
            summary.min, summary.max, summary.mean, ambient
        );
        Ok(frame)
    }

    /// Read frames and hand them to `sink` until `cancel` is set or something fails.
    ///
    /// Cancellation is not an error here; `Ok(())` means the loop was asked to stop.
    pub fn run<S>(
        &mut self,
        sink: &mut S,
        cancel: &AtomicBool,
    ) -> Result<(), AcquisitionError<I2C, S::Error>>
    where
        S: FrameSink,
    {
        while !cancel.load(Ordering::SeqCst) {
            let frame = match self.acquire(cancel) {
                Ok(frame) => frame,
                Err(AcquisitionError::Cancelled) => break,
                Err(err) => return Err(err.with_sink()),
            };
            sink.deliver(&frame).map_err(AcquisitionError::Delivery)?;
            self.delay.delay_ms(self.settings.frame_interval);
        }
        info!("Acquisition stopped");
        Ok(())
    }

    /// Give back the bus (if it survived) and the delay.
    pub fn into_inner(self) -> (Option<I2C>, D) {
        let bus = match self.sensor {
            Sensor::Unconfigured(bus) => Some(bus),
            Sensor::Configured(driver) => Some(driver.release()),
            Sensor::Lost => None,
        };
        (bus, self.delay)
    }
}

#[cfg(test)]
mod test {
    extern crate std;

    use core::convert::Infallible;
    use core::sync::atomic::AtomicBool;
    use std::vec::Vec;

    use float_cmp::assert_approx_eq;

    use mlx90621_test_data::*;

    use super::*;

    #[derive(Default)]
    struct CollectingSink {
        frames: Vec<TemperatureFrame>,
        stop_after: usize,
        cancel: Option<&'static AtomicBool>,
    }

    impl FrameSink for CollectingSink {
        type Error = Infallible;

        fn deliver(&mut self, frame: &TemperatureFrame) -> Result<(), Self::Error> {
            self.frames.push(*frame);
            if self.frames.len() >= self.stop_after {
                if let Some(cancel) = self.cancel {
                    cancel.store(true, Ordering::SeqCst);
                }
            }
            Ok(())
        }
    }

    fn fixture_bus() -> MockSensorBus {
        let addresses = BusAddresses::default();
        let mut bus = MockSensorBus::new(addresses.eeprom, addresses.device, &fixture_eeprom());
        bus.set_ptat(FIXTURE_PTAT);
        bus.set_compensation_pixel(FIXTURE_COMPENSATION_PIXEL);
        bus.set_ir_data(&fixture_ir_data());
        bus
    }

    fn create(
        bus: &MockSensorBus,
        settings: AcquisitionSettings,
    ) -> AcquisitionLoop<MockSensorBus, MockDelay> {
        AcquisitionLoop::new(
            bus.clone(),
            BusAddresses::default(),
            MockDelay::new(),
            settings,
        )
    }

    #[test]
    fn states() {
        let bus = fixture_bus();
        let mut acquisition = create(&bus, AcquisitionSettings::default());
        assert_eq!(acquisition.state(), AcquisitionState::Uninitialized);
        acquisition.initialize().unwrap();
        assert_eq!(acquisition.state(), AcquisitionState::Ready);
        assert_approx_eq!(
            f32,
            acquisition.ambient_temperature().unwrap(),
            FIXTURE_AMBIENT,
            epsilon = 1e-3
        );
        let cancel = AtomicBool::new(false);
        let frame = acquisition.acquire(&cancel).unwrap();
        assert_eq!(acquisition.state(), AcquisitionState::Ready);
        for (actual, expected) in frame.celsius().iter().zip(FIXTURE_TEMPERATURES.iter()) {
            assert_approx_eq!(f32, *actual, *expected, epsilon = 1e-2);
        }
    }

    #[test]
    fn acquire_initializes() {
        let bus = fixture_bus();
        let mut acquisition = create(&bus, AcquisitionSettings::default());
        let cancel = AtomicBool::new(false);
        acquisition.acquire(&cancel).unwrap();
        assert_eq!(acquisition.state(), AcquisitionState::Ready);
        assert_eq!(bus.eeprom_reads(), 1);
    }

    #[test]
    fn ambient_computed_once() {
        let mut bus = fixture_bus();
        let mut acquisition = create(&bus, AcquisitionSettings::default());
        acquisition.initialize().unwrap();
        let ambient = acquisition.ambient_temperature();
        // A later PTAT change isn't picked up by steady state acquisition.
        bus.set_ptat(FIXTURE_PTAT + 100);
        let cancel = AtomicBool::new(false);
        acquisition.acquire(&cancel).unwrap();
        acquisition.acquire(&cancel).unwrap();
        assert_eq!(acquisition.ambient_temperature(), ambient);
        assert_eq!(bus.ptat_reads(), 1);
    }

    #[test]
    fn initialization_failure_faults() {
        // Nothing answers at the EEPROM address.
        let bus = MockSensorBus::new(0x51, 0x60, &fixture_eeprom());
        let mut acquisition = create(&bus, AcquisitionSettings::default());
        let result = acquisition.initialize();
        assert!(matches!(result, Err(AcquisitionError::Initialization(_))));
        assert_eq!(acquisition.state(), AcquisitionState::Faulted);
        let cancel = AtomicBool::new(false);
        assert!(matches!(
            acquisition.acquire(&cancel),
            Err(AcquisitionError::Faulted)
        ));
        let (bus, _delay) = acquisition.into_inner();
        assert!(bus.is_none());
    }

    #[test]
    fn ambient_retry_bound() {
        let mut bus = fixture_bus();
        bus.set_ptat(FIXTURE_IMPLAUSIBLE_PTAT);
        let mut acquisition = create(&bus, AcquisitionSettings::default());
        // The default policy carries on regardless.
        acquisition.initialize().unwrap();
        assert_eq!(acquisition.state(), AcquisitionState::Ready);
        assert_eq!(acquisition.ambient_retries(), 2);
        // The first initialization, then two retries.
        assert_eq!(bus.eeprom_reads(), 3);
        assert!(acquisition.ambient_temperature().unwrap().is_nan());
        let (_bus, delay) = acquisition.into_inner();
        // Start up delay, then one pause per retry.
        assert_eq!(delay.delays(), std::vec![5, 10, 10]);
    }

    #[test]
    fn ambient_retry_recovers() {
        let mut bus = fixture_bus();
        bus.set_ptat(FIXTURE_IMPLAUSIBLE_PTAT);
        // The first reinitialization fixes things.
        bus.set_ptat_after_eeprom_reads(2, FIXTURE_PTAT);
        let mut acquisition = create(&bus, AcquisitionSettings::default());
        acquisition.initialize().unwrap();
        assert_eq!(acquisition.ambient_retries(), 1);
        assert_eq!(bus.eeprom_reads(), 2);
        assert_approx_eq!(
            f32,
            acquisition.ambient_temperature().unwrap(),
            FIXTURE_AMBIENT,
            epsilon = 1e-3
        );
    }

    #[test]
    fn ambient_refuse() {
        let mut bus = fixture_bus();
        bus.set_ptat(FIXTURE_IMPLAUSIBLE_PTAT);
        let settings = AcquisitionSettings {
            ambient_fallback: AmbientFallback::Refuse,
            ..Default::default()
        };
        let mut acquisition = create(&bus, settings);
        assert!(matches!(
            acquisition.initialize(),
            Err(AcquisitionError::AmbientOutOfRange(_))
        ));
        assert_eq!(acquisition.state(), AcquisitionState::Faulted);
    }

    #[test]
    fn ambient_keep_last_good_without_history() {
        let mut bus = fixture_bus();
        bus.set_ptat(FIXTURE_IMPLAUSIBLE_PTAT);
        let settings = AcquisitionSettings {
            ambient_fallback: AmbientFallback::KeepLastGood,
            ..Default::default()
        };
        let mut acquisition = create(&bus, settings);
        assert!(matches!(
            acquisition.initialize(),
            Err(AcquisitionError::AmbientOutOfRange(_))
        ));
    }

    #[test]
    fn ambient_keep_last_good_after_brown_out() {
        let mut bus = fixture_bus();
        let settings = AcquisitionSettings {
            ambient_fallback: AmbientFallback::KeepLastGood,
            ..Default::default()
        };
        let mut acquisition = create(&bus, settings);
        acquisition.initialize().unwrap();
        let good = acquisition.ambient_temperature();
        // The sensor resets, and comes back with a bad PTAT.
        bus.simulate_brown_out();
        bus.set_ptat(FIXTURE_IMPLAUSIBLE_PTAT);
        let cancel = AtomicBool::new(false);
        acquisition.acquire(&cancel).unwrap();
        assert_eq!(acquisition.ambient_temperature(), good);
        assert_eq!(acquisition.state(), AcquisitionState::Ready);
    }

    #[test]
    fn brown_out_recovery() {
        let mut bus = fixture_bus();
        let mut acquisition = create(&bus, AcquisitionSettings::default());
        acquisition.initialize().unwrap();
        bus.simulate_brown_out();
        // A new ambient temperature after the reset.
        bus.set_ptat(FIXTURE_PTAT + 4);
        let cancel = AtomicBool::new(false);
        acquisition.acquire(&cancel).unwrap();
        assert_eq!(bus.eeprom_reads(), 2);
        assert_eq!(bus.ptat_reads(), 2);
        assert!(acquisition.ambient_temperature().unwrap() > FIXTURE_AMBIENT);
        assert_eq!(bus.config_bytes(), [0x1C, 0x46]);
        let (_bus, delay) = acquisition.into_inner();
        assert_eq!(delay.delays(), std::vec![5, 1000]);
    }

    #[test]
    fn brown_out_attempt_cap() {
        let mut bus = fixture_bus();
        let settings = AcquisitionSettings {
            brown_out_max_attempts: Some(3),
            ..Default::default()
        };
        let mut acquisition = create(&bus, settings);
        acquisition.initialize().unwrap();
        bus.set_persistent_brown_out(true);
        let cancel = AtomicBool::new(false);
        assert!(matches!(
            acquisition.acquire(&cancel),
            Err(AcquisitionError::BrownOutPersisted(3))
        ));
        assert_eq!(acquisition.state(), AcquisitionState::Faulted);
        // One at start up, three attempts.
        assert_eq!(bus.eeprom_reads(), 4);
    }

    #[test]
    fn brown_out_cancelled() {
        let mut bus = fixture_bus();
        let mut acquisition = create(&bus, AcquisitionSettings::default());
        acquisition.initialize().unwrap();
        bus.set_persistent_brown_out(true);
        let cancel = AtomicBool::new(true);
        let result = acquisition.acquire(&cancel);
        assert!(matches!(result, Err(AcquisitionError::Cancelled)));
        assert!(!result.unwrap_err().is_fatal());
        assert_eq!(acquisition.state(), AcquisitionState::Ready);
    }

    #[test]
    fn ir_read_failure_is_fatal() {
        let mut bus = fixture_bus();
        let mut acquisition = create(&bus, AcquisitionSettings::default());
        acquisition.initialize().unwrap();
        bus.fail_ir_reads(true);
        let cancel = AtomicBool::new(false);
        let result = acquisition.acquire(&cancel);
        assert!(matches!(result, Err(AcquisitionError::IrRead(_))));
        assert_eq!(acquisition.state(), AcquisitionState::Faulted);
        // Even once the bus works again, nothing more is read.
        bus.fail_ir_reads(false);
        bus.clear_recent_operations();
        assert!(matches!(
            acquisition.acquire(&cancel),
            Err(AcquisitionError::Faulted)
        ));
        assert_eq!(bus.recent_operations().len(), 0);
    }

    #[cfg(feature = "std")]
    #[test]
    fn ir_failure_source_chain() {
        use std::error::Error as _;

        let mut bus = fixture_bus();
        let mut acquisition = create(&bus, AcquisitionSettings::default());
        acquisition.initialize().unwrap();
        bus.fail_ir_reads(true);
        let err = acquisition.acquire(&AtomicBool::new(false)).unwrap_err();
        let bus_error = err
            .source()
            .and_then(|driver_error| driver_error.source())
            .and_then(|bus_error| bus_error.downcast_ref::<MockError>());
        assert_eq!(bus_error, Some(&MockError::IrReadFailure));
    }

    #[test]
    fn run_until_cancelled() {
        static CANCEL: AtomicBool = AtomicBool::new(false);
        let bus = fixture_bus();
        let mut acquisition = create(&bus, AcquisitionSettings::default());
        let mut sink = CollectingSink {
            stop_after: 3,
            cancel: Some(&CANCEL),
            ..Default::default()
        };
        acquisition.run(&mut sink, &CANCEL).unwrap();
        assert_eq!(sink.frames.len(), 3);
        assert_eq!(sink.frames[0], sink.frames[2]);
        let (_bus, delay) = acquisition.into_inner();
        assert_eq!(delay.delays(), std::vec![5, 100, 100, 100]);
    }

    #[test]
    fn run_reports_ir_failure() {
        let mut bus = fixture_bus();
        bus.fail_ir_reads(true);
        let mut acquisition = create(&bus, AcquisitionSettings::default());
        let mut sink = CollectingSink::default();
        let cancel = AtomicBool::new(false);
        let result = acquisition.run(&mut sink, &cancel);
        assert!(matches!(result, Err(AcquisitionError::IrRead(_))));
        assert!(result.unwrap_err().is_fatal());
        assert!(sink.frames.is_empty());
    }
}
