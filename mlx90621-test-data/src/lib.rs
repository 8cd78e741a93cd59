// SPDX-License-Identifier: Apache-2.0
// Copyright © 2021 Will Ross
mod delay_mock;
mod eeprom_data;
mod i2c_mock;

pub use delay_mock::MockDelay;
pub use eeprom_data::{
    fixture_eeprom, fixture_ir_data, EEPROM_LENGTH, FIXTURE_AMBIENT, FIXTURE_COMPENSATION_PIXEL,
    FIXTURE_IMPLAUSIBLE_PTAT, FIXTURE_PTAT, FIXTURE_TEMPERATURES,
};
pub use i2c_mock::{I2cOperation, MockError, MockSensorBus, RAM_WORDS};
