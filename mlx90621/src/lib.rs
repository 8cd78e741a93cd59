// SPDX-License-Identifier: Apache-2.0
// Copyright © 2021 Will Ross
//! A pure-Rust library for reading the Melexis MLX90621 16x4 thermopile array over I²C.
//!
//! The MLX90621 is two devices on one bus: a 256 byte EEPROM holding the factory calibration
//! (usually at 0x50), and the sensor itself (usually at 0x60). The raw readings from the sensor are
//! useless without the calibration, so this crate decodes the EEPROM into a [`CalibrationTable`]
//! and runs the compensation math to turn a raw frame into 64 object temperatures.
//!
//! This library uses the [`embedded-hal`][embedded-hal] I²C and delay traits, so it should work on
//! any platform with an `embedded-hal` implementation. It is also `no_std` compatible, with the
//! `libm` feature providing the floating point functions `core` lacks.
//!
//! [embedded-hal]: https://docs.rs/embedded-hal/0.2/embedded_hal/blocking/i2c/index.html
//!
//! # Driver API
//! ```no_run
//! use mlx90621::{BusAddresses, Mlx90621, RefreshRate};
//! use linux_embedded_hal::I2cdev;
//!
//! let i2c_bus = I2cdev::new("/dev/i2c-1").expect("/dev/i2c-1 needs to be an I2C controller");
//! let mut sensor = Mlx90621::new(i2c_bus, BusAddresses::default(), RefreshRate::Four)?;
//! let ambient = sensor.measure_ambient()?;
//! let frame = sensor.generate_frame(ambient)?;
//! println!("Hottest pixel: {}℃", frame.summary().max);
//! # Ok::<(), mlx90621::Error<I2cdev>>(())
//! ```
//! [`Mlx90621`] handles the start up sequence (loading the calibration, writing the oscillator
//! trim and configuration), and exposes the configuration fields that are safe to change.
//!
//! # Acquisition
//! The sensor has a couple of quirks that need handling when it runs for a long time. It can come
//! up with a garbage ambient temperature, and a brown-out resets it to its power on state.
//! [`AcquisitionLoop`] wraps the driver with the retry and recovery logic for both, and delivers
//! frames to a [`FrameSink`] at a fixed interval.
//!
//! # Low-Level API
//! The pieces the driver is built from are public as well. [`transport`] has the bus transactions
//! (including the check bytes the sensor requires on writes), [`eeprom`] the calibration decoding,
//! and [`calculations`] the ambient and object temperature math, all usable without a driver.

#![no_std]
#![allow(clippy::float_cmp)]

#[cfg(not(any(feature = "std", feature = "libm")))]
compile_error!("Either the 'std' or 'libm' feature must be enabled.");

pub mod acquisition;
pub mod address;
pub mod calculations;
#[doc(hidden)]
pub mod driver;
pub mod eeprom;
#[doc(hidden)]
pub mod error;
pub mod frame;
pub mod register;
pub mod transport;
mod util;

#[doc(inline)]
pub use acquisition::{
    AcquisitionError, AcquisitionLoop, AcquisitionSettings, AcquisitionState, AmbientFallback,
    FrameSink,
};
pub use address::{BusAddresses, NUM_PIXELS};
#[doc(inline)]
pub use driver::Mlx90621;
pub use eeprom::CalibrationTable;
#[doc(inline)]
pub use error::{Error, LibraryError};
pub use frame::{RawIrFrame, TemperatureFrame, FRAME_LENGTH};
pub use register::*;
